// Error taxonomy shared by the session store and the entity repositories
use serde_json::{json, Value};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

use crate::filter::FilterError;

/// Failure talking to the remote data service. Always retryable from the
/// caller's point of view; the core never retries on its own.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RemoteError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("{message}")]
    Rejected {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// The access token was rejected and could not be refreshed
    #[error("{0}")]
    SessionExpired(String),

    #[error("Malformed response: {0}")]
    Decode(String),

    #[error("Invalid query: {0}")]
    Query(#[from] FilterError),
}

impl RemoteError {
    pub fn rejected(status: u16, code: Option<&str>, message: impl Into<String>) -> Self {
        RemoteError::Rejected {
            status,
            code: code.map(str::to_string),
            message: message.into(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            RemoteError::Rejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            RemoteError::Rejected { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RemoteError::Timeout(err.to_string())
        } else if err.is_decode() {
            RemoteError::Decode(err.to_string())
        } else {
            RemoteError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for RemoteError {
    fn from(err: serde_json::Error) -> Self {
        RemoteError::Decode(err.to_string())
    }
}

/// Authentication failures. Display text is the message shown to the user.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AuthError {
    #[error("{0}")]
    InvalidCredentials(String),

    #[error("Session expired, please sign in again")]
    SessionExpired,

    #[error("{0}")]
    SignupConflict(String),

    /// The auth identity exists but its profile row could not be written.
    /// Resume with `SessionStore::complete_signup`.
    #[error("Account created but profile setup failed: {message}")]
    PartialSignup { user_id: Uuid, message: String },

    #[error("Could not load account permissions: {0}")]
    Entitlements(String),

    #[error("{0}")]
    Remote(RemoteError),
}

impl From<RemoteError> for AuthError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::SessionExpired(_) => AuthError::SessionExpired,
            err => AuthError::Remote(err),
        }
    }
}

impl AuthError {
    /// Classify a rejected auth request (400/401/422) by the platform's message
    pub fn from_rejection(err: RemoteError) -> Self {
        match &err {
            RemoteError::Rejected { status: 400 | 401, message, .. } => AuthError::InvalidCredentials(message.clone()),
            RemoteError::Rejected { status: 409 | 422, message, .. } => AuthError::SignupConflict(message.clone()),
            _ => AuthError::from(err),
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::InvalidCredentials(_) => "INVALID_CREDENTIALS",
            AuthError::SessionExpired => "SESSION_EXPIRED",
            AuthError::SignupConflict(_) => "SIGNUP_CONFLICT",
            AuthError::PartialSignup { .. } => "PARTIAL_SIGNUP",
            AuthError::Entitlements(_) => "ENTITLEMENTS_UNAVAILABLE",
            AuthError::Remote(_) => "REMOTE_ERROR",
        }
    }
}

/// Entity access failures
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DataError {
    #[error("{0}")]
    NotFound(String),

    #[error("{message}")]
    Validation {
        message: String,
        field_errors: Option<HashMap<String, String>>,
    },

    #[error("Session expired, please sign in again")]
    SessionExpired,

    #[error("{0}")]
    Remote(RemoteError),
}

impl DataError {
    pub fn not_found(message: impl Into<String>) -> Self {
        DataError::NotFound(message.into())
    }

    pub fn validation(message: impl Into<String>, field_errors: Option<HashMap<String, String>>) -> Self {
        DataError::Validation {
            message: message.into(),
            field_errors,
        }
    }

    /// Single required-field violation
    pub fn missing_field(field: &str) -> Self {
        let mut field_errors = HashMap::new();
        field_errors.insert(field.to_string(), "This field is required".to_string());
        DataError::validation("Missing required fields", Some(field_errors))
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            DataError::NotFound(_) => "NOT_FOUND",
            DataError::Validation { .. } => "VALIDATION_ERROR",
            DataError::SessionExpired => "SESSION_EXPIRED",
            DataError::Remote(_) => "REMOTE_ERROR",
        }
    }

    /// Whether the view should offer a retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, DataError::Remote(_))
    }

    /// Convert to a JSON body for machine-readable output
    pub fn to_json(&self) -> Value {
        let mut response = json!({
            "error": true,
            "message": self.to_string(),
            "code": self.error_code(),
            "retryable": self.is_retryable(),
        });
        if let DataError::Validation { field_errors: Some(field_errors), .. } = self {
            response["field_errors"] = json!(field_errors);
        }
        response
    }
}

impl From<RemoteError> for DataError {
    fn from(err: RemoteError) -> Self {
        match &err {
            RemoteError::Rejected { status, code, message } => match code.as_deref() {
                // zero rows where exactly one was expected
                Some("PGRST116") => DataError::NotFound(message.clone()),
                // not-null, check, malformed uuid/date/time
                Some("23502" | "23514" | "22P02" | "22007" | "22008") => DataError::validation(message.clone(), None),
                _ => {
                    tracing::error!("Remote query failed ({}): {}", status, message);
                    DataError::Remote(err)
                }
            },
            RemoteError::SessionExpired(_) => DataError::SessionExpired,
            _ => DataError::Remote(err),
        }
    }
}

impl From<FilterError> for DataError {
    fn from(err: FilterError) -> Self {
        DataError::validation(err.to_string(), None)
    }
}
