use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{AuthError, RemoteError};
use crate::filter::{Filter, SortDirection};
use crate::gate::GateInput;
use crate::models::{Identity, NewProfile, Profile, Role, Session, Subscription};
use crate::remote::{AuthEvent, AuthEventKind, Query, RemoteService};

pub const PROFILES_TABLE: &str = "profiles";
pub const SUBSCRIPTIONS_TABLE: &str = "subscriptions";

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Uninitialized,
    Loading,
    Anonymous,
    Authenticated,
}

/// Consistent view of the session: identity, role and subscription are
/// always published together.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub session: Option<Session>,
    pub role: Option<Role>,
    pub subscription: Option<Subscription>,
}

impl SessionSnapshot {
    fn empty(phase: SessionPhase) -> Self {
        Self { phase, session: None, role: None, subscription: None }
    }

    pub fn uninitialized() -> Self {
        Self::empty(SessionPhase::Uninitialized)
    }

    pub fn loading() -> Self {
        Self::empty(SessionPhase::Loading)
    }

    pub fn anonymous() -> Self {
        Self::empty(SessionPhase::Anonymous)
    }

    pub fn authenticated(session: Session, role: Role, subscription: Option<Subscription>) -> Self {
        Self {
            phase: SessionPhase::Authenticated,
            session: Some(session),
            role: Some(role),
            subscription,
        }
    }

    /// Nothing is known yet, before or during initialisation
    pub fn is_loading(&self) -> bool {
        matches!(self.phase, SessionPhase::Uninitialized | SessionPhase::Loading)
    }

    pub fn identity(&self) -> Option<&Identity> {
        match self.phase {
            SessionPhase::Authenticated => self.session.as_ref().map(|s| &s.user),
            _ => None,
        }
    }

    pub fn has_identity(&self) -> bool {
        self.identity().is_some()
    }

    /// Admins are always entitled; everyone else needs an active subscription
    pub fn has_active_subscription_at(&self, now: DateTime<Utc>) -> bool {
        if !self.has_identity() {
            return false;
        }
        if self.role == Some(Role::Admin) {
            return true;
        }
        self.subscription.as_ref().map(|s| s.is_active_at(now)).unwrap_or(false)
    }

    pub fn gate_input_at(&self, now: DateTime<Utc>) -> GateInput {
        GateInput {
            loading: self.is_loading(),
            has_identity: self.has_identity(),
            has_active_subscription: self.has_active_subscription_at(now),
        }
    }

    fn access_token(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.access_token.as_str())
    }
}

/// Owner of the process-wide authentication state.
///
/// All transitions go through the store's own operations and are serialized;
/// readers observe whole snapshots through [`SessionStore::subscribe`].
pub struct SessionStore {
    remote: Arc<dyn RemoteService>,
    default_role: Role,
    state: watch::Sender<SessionSnapshot>,
    transitions: Mutex<()>,
    listener: StdMutex<Option<JoinHandle<()>>>,
}

impl SessionStore {
    pub fn new(remote: Arc<dyn RemoteService>, default_role: Role) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::uninitialized());
        Self {
            remote,
            default_role,
            state,
            transitions: Mutex::new(()),
            listener: StdMutex::new(None),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    pub fn has_active_subscription(&self) -> bool {
        self.state.borrow().has_active_subscription_at(Utc::now())
    }

    pub fn gate_input(&self) -> GateInput {
        self.state.borrow().gate_input_at(Utc::now())
    }

    fn publish(&self, snapshot: SessionSnapshot) {
        self.state.send_replace(snapshot);
    }

    /// Load the existing session, if any, together with its entitlements
    pub async fn initialize(&self) -> SessionSnapshot {
        let _guard = self.transitions.lock().await;
        self.publish(SessionSnapshot::loading());

        let snapshot = match self.remote.get_session().await {
            Ok(Some(session)) => match self.resolve(session).await {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    warn!("Treating session as anonymous: {}", err);
                    SessionSnapshot::anonymous()
                }
            },
            Ok(None) => SessionSnapshot::anonymous(),
            Err(RemoteError::SessionExpired(reason)) => {
                info!("Stored session expired: {}", reason);
                SessionSnapshot::anonymous()
            }
            Err(err) => {
                warn!("Session lookup failed: {}", err);
                SessionSnapshot::anonymous()
            }
        };
        info!(phase = ?snapshot.phase, "Session initialized");
        self.publish(snapshot.clone());
        snapshot
    }

    /// Apply a pushed auth event. Events carrying the session already held
    /// are ignored, which covers both duplicates and the echo of this
    /// store's own login.
    pub async fn on_auth_event(&self, event: AuthEvent) -> SessionSnapshot {
        let _guard = self.transitions.lock().await;
        let current = self.snapshot();

        let Some(session) = event.session else {
            if current.phase != SessionPhase::Anonymous {
                info!(kind = ?event.kind, "Session cleared by auth event");
                self.publish(SessionSnapshot::anonymous());
            }
            return self.snapshot();
        };

        if current.access_token() == Some(session.access_token.as_str()) {
            debug!(kind = ?event.kind, "Ignoring auth event for current session");
            return current;
        }

        // Same user with a new token: entitlements are unchanged
        if event.kind == AuthEventKind::TokenRefreshed
            && current.identity().map(|u| u.id) == Some(session.user.id)
        {
            let refreshed = SessionSnapshot { session: Some(session), ..current };
            self.publish(refreshed.clone());
            return refreshed;
        }

        self.publish(SessionSnapshot::loading());
        let snapshot = match self.resolve(session).await {
            Ok(snapshot) => {
                info!(kind = ?event.kind, "Session updated by auth event");
                snapshot
            }
            Err(err) => {
                warn!("Treating session as anonymous: {}", err);
                SessionSnapshot::anonymous()
            }
        };
        self.publish(snapshot.clone());
        snapshot
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<SessionSnapshot, AuthError> {
        let _guard = self.transitions.lock().await;
        let session = self
            .remote
            .sign_in(email, password)
            .await
            .map_err(AuthError::from_rejection)?;
        self.establish(session).await
    }

    /// Register a new account and write its profile with the configured
    /// default role. If the identity is created but the profile is not, the
    /// result is [`AuthError::PartialSignup`]; retry with [`Self::complete_signup`].
    pub async fn signup(&self, email: &str, password: &str, display_name: &str) -> Result<SessionSnapshot, AuthError> {
        let _guard = self.transitions.lock().await;
        let created = self
            .remote
            .sign_up(email, password, display_name)
            .await
            .map_err(AuthError::from_rejection)?;
        info!(user_id = %created.user.id, "Account created");

        if let Err(err) = self.write_profile(created.user.id, email, display_name).await {
            warn!(user_id = %created.user.id, "Profile creation failed: {}", err);
            return Err(AuthError::PartialSignup { user_id: created.user.id, message: err.to_string() });
        }

        match created.session {
            Some(session) => self.establish(session).await,
            // Email confirmation pending; the user signs in later
            None => Ok(self.snapshot()),
        }
    }

    /// Finish a sign-up whose profile write failed. Safe to repeat.
    pub async fn complete_signup(&self, user_id: Uuid, email: &str, display_name: &str) -> Result<(), AuthError> {
        self.write_profile(user_id, email, display_name).await.map_err(|err| {
            AuthError::PartialSignup { user_id, message: err.to_string() }
        })
    }

    pub async fn logout(&self) -> Result<(), AuthError> {
        let _guard = self.transitions.lock().await;
        self.remote.sign_out().await?;
        info!("Signed out");
        self.publish(SessionSnapshot::anonymous());
        Ok(())
    }

    /// Consume the remote's auth events on a background task until
    /// [`Self::shutdown`] or until the store is dropped.
    pub fn start_listening(self: &Arc<Self>) {
        let mut events = self.remote.subscribe();
        let store = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            loop {
                let received = events.recv().await;
                let Some(store) = store.upgrade() else { break };
                match received {
                    Ok(event) => {
                        store.on_auth_event(event).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Auth events lagged; resynchronising");
                        store.resync().await;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        let mut listener = self.listener.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = listener.replace(handle) {
            previous.abort();
        }
    }

    pub fn shutdown(&self) {
        let mut listener = self.listener.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = listener.take() {
            handle.abort();
        }
    }

    async fn resync(&self) {
        let event = match self.remote.get_session().await {
            Ok(Some(session)) => AuthEvent::signed_in(session),
            Ok(None) | Err(RemoteError::SessionExpired(_)) => AuthEvent::signed_out(),
            Err(err) => {
                warn!("Resync failed: {}", err);
                return;
            }
        };
        self.on_auth_event(event).await;
    }

    /// Publish a freshly signed-in session, or fail closed
    async fn establish(&self, session: Session) -> Result<SessionSnapshot, AuthError> {
        self.publish(SessionSnapshot::loading());
        match self.resolve(session).await {
            Ok(snapshot) => {
                info!(user_id = ?snapshot.identity().map(|u| u.id), role = ?snapshot.role, "Signed in");
                self.publish(snapshot.clone());
                Ok(snapshot)
            }
            Err(err) => {
                warn!("Sign-in rejected, entitlements unavailable: {}", err);
                if let Err(sign_out) = self.remote.sign_out().await {
                    warn!("Sign-out after failed entitlement lookup failed: {}", sign_out);
                }
                self.publish(SessionSnapshot::anonymous());
                Err(err)
            }
        }
    }

    /// Fetch role and subscription for `session` concurrently
    async fn resolve(&self, session: Session) -> Result<SessionSnapshot, AuthError> {
        let user_id = session.user.id;
        let (profile, subscription) = futures::join!(self.fetch_profile(user_id), self.fetch_subscription(user_id));

        let profile = profile
            .map_err(|e| AuthError::Entitlements(e.to_string()))?
            .ok_or_else(|| AuthError::Entitlements(format!("no profile for account {}", user_id)))?;
        let subscription = subscription.map_err(|e| AuthError::Entitlements(e.to_string()))?;

        Ok(SessionSnapshot::authenticated(session, profile.role, subscription))
    }

    async fn fetch_profile(&self, user_id: Uuid) -> Result<Option<Profile>, RemoteError> {
        let filter = Filter::new(PROFILES_TABLE)?.eq("id", user_id.to_string())?.limit(1, None)?;
        let rows = self.remote.execute(Query::select(filter)).await?;
        rows.into_iter()
            .next()
            .map(serde_json::from_value)
            .transpose()
            .map_err(RemoteError::from)
    }

    /// The user's active subscription record, latest expiry first
    async fn fetch_subscription(&self, user_id: Uuid) -> Result<Option<Subscription>, RemoteError> {
        let filter = Filter::new(SUBSCRIPTIONS_TABLE)?
            .eq("user_id", user_id.to_string())?
            .eq("status", "active")?
            .order_by("expires_at", SortDirection::Desc)?
            .limit(1, None)?;
        let rows = self.remote.execute(Query::select(filter)).await?;
        rows.into_iter()
            .next()
            .map(serde_json::from_value)
            .transpose()
            .map_err(RemoteError::from)
    }

    async fn write_profile(&self, user_id: Uuid, email: &str, display_name: &str) -> Result<(), RemoteError> {
        let profile = NewProfile {
            id: user_id,
            email: email.to_string(),
            full_name: display_name.to_string(),
            role: self.default_role,
        };
        let filter = Filter::new(PROFILES_TABLE)?;
        self.remote
            .execute(Query::upsert(filter, json!(profile)))
            .await
            .map(|_| ())
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        self.shutdown();
    }
}
