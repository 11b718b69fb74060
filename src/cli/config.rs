use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use uuid::Uuid;

use crate::models::Session;

/// Sign-up whose profile write failed, kept so `auth complete-signup` can resume it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingSignup {
    pub user_id: Uuid,
    pub email: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionFile {
    pub session: Option<Session>,
    pub saved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pending_signup: Option<PendingSignup>,
}

pub fn get_config_dir() -> anyhow::Result<PathBuf> {
    let config_dir = if let Ok(custom_dir) = std::env::var("FISIO_CLI_CONFIG_DIR") {
        PathBuf::from(custom_dir)
    } else {
        let home = std::env::var("HOME").map_err(|_| anyhow::anyhow!("HOME environment variable not set"))?;
        PathBuf::from(home).join(".config").join("fisiosmart").join("cli")
    };

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

pub fn load_session_file() -> anyhow::Result<SessionFile> {
    let session_file = get_config_dir()?.join("session.json");

    if !session_file.exists() {
        return Ok(SessionFile::default());
    }

    let content = fs::read_to_string(session_file)?;
    let file: SessionFile = serde_json::from_str(&content)?;
    Ok(file)
}

pub fn save_session_file(file: &SessionFile) -> anyhow::Result<()> {
    let session_file = get_config_dir()?.join("session.json");

    let content = serde_json::to_string_pretty(file)?;
    fs::write(&session_file, content)?;

    // Tokens grant account access; keep the file private
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&session_file, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

/// Replace the stored session, keeping any pending sign-up
pub fn store_session(session: Option<Session>) -> anyhow::Result<()> {
    let mut file = load_session_file()?;
    file.session = session;
    file.saved_at = Some(Utc::now());
    save_session_file(&file)
}

pub fn store_pending_signup(pending: Option<PendingSignup>) -> anyhow::Result<()> {
    let mut file = load_session_file()?;
    file.pending_signup = pending;
    save_session_file(&file)
}
