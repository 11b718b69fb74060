pub mod http;
pub mod token;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::RemoteError;
use crate::filter::Filter;
use crate::models::{Identity, Session};
use crate::types::Operation;

pub use http::HttpRemote;

/// Capacity of the auth-event channel; slower listeners resynchronise on lag
pub const AUTH_EVENT_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthEventKind {
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

/// Push notification from the auth subsystem. `session` is `None` after sign-out.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthEvent {
    pub kind: AuthEventKind,
    pub session: Option<Session>,
}

impl AuthEvent {
    pub fn signed_in(session: Session) -> Self {
        Self { kind: AuthEventKind::SignedIn, session: Some(session) }
    }

    pub fn signed_out() -> Self {
        Self { kind: AuthEventKind::SignedOut, session: None }
    }

    pub fn token_refreshed(session: Session) -> Self {
        Self { kind: AuthEventKind::TokenRefreshed, session: Some(session) }
    }
}

/// Result of registering a new identity. `session` is absent when the
/// platform requires email confirmation before the first sign-in.
#[derive(Debug, Clone, PartialEq)]
pub struct SignUp {
    pub user: Identity,
    pub session: Option<Session>,
}

/// One table request: the operation, its shape and, for writes, the JSON body
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub operation: Operation,
    pub filter: Filter,
    pub body: Option<Value>,
}

impl Query {
    pub fn select(filter: Filter) -> Self {
        Self { operation: Operation::Select, filter, body: None }
    }

    pub fn insert(filter: Filter, body: Value) -> Self {
        Self { operation: Operation::Create, filter, body: Some(body) }
    }

    /// Insert, or merge into the existing row with the same primary key
    pub fn upsert(filter: Filter, body: Value) -> Self {
        Self { operation: Operation::Upsert, filter, body: Some(body) }
    }

    pub fn update(filter: Filter, body: Value) -> Self {
        Self { operation: Operation::Update, filter, body: Some(body) }
    }

    pub fn delete(filter: Filter) -> Self {
        Self { operation: Operation::Delete, filter, body: None }
    }

    pub fn table(&self) -> &str {
        self.filter.table_name()
    }
}

/// Contract of the hosted data/auth platform.
///
/// Every call is a single round trip. Mutations return the affected rows as
/// stored by the platform, never an echo of the input.
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Current session, refreshed first if the access token has expired.
    /// A refresh the platform rejects clears the session and reports
    /// [`RemoteError::SessionExpired`].
    async fn get_session(&self) -> Result<Option<Session>, RemoteError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, RemoteError>;

    async fn sign_up(&self, email: &str, password: &str, display_name: &str) -> Result<SignUp, RemoteError>;

    async fn sign_out(&self) -> Result<(), RemoteError>;

    /// Receive every subsequent auth event
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;

    async fn execute(&self, query: Query) -> Result<Vec<Value>, RemoteError>;

    /// Number of rows matching `filter`, counted by the platform
    async fn count(&self, filter: Filter) -> Result<usize, RemoteError>;
}
