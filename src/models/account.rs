use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Authenticated user as reported by the auth service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default, alias = "last_sign_in_at")]
    pub authenticated_at: Option<DateTime<Utc>>,
}

/// A signed-in session. Tokens are redacted from `Debug` output.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    pub user: Identity,
}

impl Session {
    /// True when the access token is expired, or will be within `margin`.
    /// Sessions without a known expiry never expire client-side.
    pub fn is_expired_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        self.expires_at.map(|exp| exp <= now + margin).unwrap_or(false)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Therapist,
    Receptionist,
    #[serde(other)]
    Unknown,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Therapist => "therapist",
            Role::Receptionist => "receptionist",
            Role::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "therapist" => Ok(Role::Therapist),
            "receptionist" => Ok(Role::Receptionist),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// Row of the `profiles` table, keyed by the auth identity id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewProfile {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    #[serde(alias = "canceled")]
    Cancelled,
    Expired,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan: String,
    pub status: SubscriptionStatus,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Subscription {
    /// Active status with an expiry in the future, or no expiry recorded
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active && self.expires_at.map(|exp| exp > now).unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identity_reads_auth_user_payload() {
        let identity: Identity = serde_json::from_value(json!({
            "id": "0b8f5c8e-6d0b-4a43-9a52-3f4f0c1d2e3f",
            "aud": "authenticated",
            "email": "marco@example.com",
            "last_sign_in_at": "2025-04-19T08:00:00Z"
        }))
        .unwrap();
        assert_eq!(identity.email.as_deref(), Some("marco@example.com"));
        assert!(identity.authenticated_at.is_some());
    }

    #[test]
    fn unknown_roles_deserialize_as_unknown() {
        let role: Role = serde_json::from_value(json!("physio_intern")).unwrap();
        assert_eq!(role, Role::Unknown);
        assert_eq!("ADMIN".parse::<Role>(), Ok(Role::Admin));
    }

    #[test]
    fn session_debug_redacts_tokens() {
        let session = Session {
            access_token: "secret-access".into(),
            refresh_token: Some("secret-refresh".into()),
            expires_at: None,
            user: Identity { id: Uuid::new_v4(), email: None, authenticated_at: None },
        };
        let printed = format!("{:?}", session);
        assert!(!printed.contains("secret"));
    }

    #[test]
    fn subscription_activity_respects_expiry() {
        let now = Utc::now();
        let mut sub = Subscription {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            plan: "premium".into(),
            status: SubscriptionStatus::Active,
            expires_at: Some(now + Duration::days(30)),
        };
        assert!(sub.is_active_at(now));
        sub.expires_at = Some(now - Duration::seconds(1));
        assert!(!sub.is_active_at(now));
        sub.expires_at = None;
        assert!(sub.is_active_at(now));
        sub.status = SubscriptionStatus::Cancelled;
        assert!(!sub.is_active_at(now));
    }
}
