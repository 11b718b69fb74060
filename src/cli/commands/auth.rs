use chrono::Utc;
use clap::Subcommand;
use serde_json::json;

use crate::cli::config::{self, PendingSignup};
use crate::cli::utils::{output_success, resolve_password};
use crate::cli::OutputFormat;
use crate::clinic::Clinic;
use crate::error::AuthError;
use crate::session::SessionSnapshot;

#[derive(Subcommand)]
pub enum AuthCommands {
    #[command(about = "Sign in with email and password")]
    Login {
        #[arg(help = "Email")]
        email: String,
        #[arg(long, help = "Password (read from stdin if not provided)")]
        password: Option<String>,
    },

    #[command(about = "Sign out")]
    Logout,

    #[command(about = "Show current authentication status")]
    Status,

    #[command(about = "Register a new account")]
    Signup {
        #[arg(help = "Email")]
        email: String,
        #[arg(help = "Display name")]
        display_name: String,
        #[arg(long, help = "Password (read from stdin if not provided)")]
        password: Option<String>,
    },

    #[command(about = "Finish a sign-up whose profile setup failed")]
    CompleteSignup,
}

fn status_json(snapshot: &SessionSnapshot) -> serde_json::Value {
    let identity = snapshot.identity();
    json!({
        "phase": snapshot.phase,
        "user_id": identity.map(|u| u.id),
        "email": identity.and_then(|u| u.email.clone()),
        "role": snapshot.role,
        "subscription": snapshot.subscription.as_ref().map(|s| json!({
            "plan": s.plan,
            "status": s.status,
            "expires_at": s.expires_at,
        })),
        "active_subscription": snapshot.has_active_subscription_at(Utc::now()),
    })
}

pub async fn handle(cmd: AuthCommands, clinic: &Clinic, output_format: &OutputFormat) -> anyhow::Result<()> {
    match cmd {
        AuthCommands::Login { email, password } => {
            let password = resolve_password(password)?;
            let snapshot = clinic.session.login(&email, &password).await?;
            output_success(output_format, &format!("Signed in as {}", email), Some(status_json(&snapshot)))
        }
        AuthCommands::Logout => {
            clinic.session.logout().await?;
            output_success(output_format, "Signed out", None)
        }
        AuthCommands::Status => {
            let snapshot = clinic.session.snapshot();
            match output_format {
                OutputFormat::Json => output_success(output_format, "Session status", Some(status_json(&snapshot))),
                OutputFormat::Text => {
                    match snapshot.identity() {
                        Some(user) => {
                            println!("Signed in as {}", user.email.as_deref().unwrap_or("<no email>"));
                            if let Some(role) = snapshot.role {
                                println!("Role: {}", role);
                            }
                            match &snapshot.subscription {
                                Some(sub) => println!("Subscription: {} ({:?})", sub.plan, sub.status),
                                None => println!("Subscription: none"),
                            }
                            println!("Access: {}", if snapshot.has_active_subscription_at(Utc::now()) { "active" } else { "inactive" });
                        }
                        None => println!("Not signed in"),
                    }
                    Ok(())
                }
            }
        }
        AuthCommands::Signup { email, display_name, password } => {
            let password = resolve_password(password)?;
            match clinic.session.signup(&email, &password, &display_name).await {
                Ok(snapshot) => {
                    config::store_pending_signup(None)?;
                    let message = if snapshot.has_identity() {
                        format!("Account created and signed in as {}", email)
                    } else {
                        format!("Account created; confirm {} before signing in", email)
                    };
                    output_success(output_format, &message, Some(status_json(&snapshot)))
                }
                Err(AuthError::PartialSignup { user_id, message }) => {
                    config::store_pending_signup(Some(PendingSignup { user_id, email, display_name }))?;
                    Err(AuthError::PartialSignup { user_id, message }.into())
                }
                Err(err) => Err(err.into()),
            }
        }
        AuthCommands::CompleteSignup => {
            let pending = config::load_session_file()?
                .pending_signup
                .ok_or_else(|| anyhow::anyhow!("No incomplete sign-up to resume"))?;
            clinic
                .session
                .complete_signup(pending.user_id, &pending.email, &pending.display_name)
                .await?;
            config::store_pending_signup(None)?;
            output_success(
                output_format,
                &format!("Profile created for {}", pending.email),
                Some(json!({ "user_id": pending.user_id })),
            )
        }
    }
}
