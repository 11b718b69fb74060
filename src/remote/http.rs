use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};
use url::Url;

use super::{token, AuthEvent, Query, RemoteService, SignUp, AUTH_EVENT_CAPACITY};
use crate::config::ServiceConfig;
use crate::error::RemoteError;
use crate::filter::{Filter, FilterError};
use crate::models::{Identity, Session};
use crate::types::Operation;

/// REST binding of the hosted platform: `/auth/v1/*` for identities and
/// sessions, `/rest/v1/{table}` for table queries.
pub struct HttpRemote {
    client: Client,
    base_url: Url,
    key: String,
    refresh_margin: Duration,
    session: RwLock<Option<Session>>,
    events: broadcast::Sender<AuthEvent>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: Identity,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        let expires_at = self
            .expires_at
            .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
            .or_else(|| self.expires_in.map(|secs| Utc::now() + Duration::seconds(secs)))
            .or_else(|| token::expires_at(&self.access_token));
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user,
        }
    }
}

/// Error body of either subsystem; auth and table endpoints use different keys
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<Value>,
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

fn rejection(status: u16, body: &str) -> RemoteError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let code = match parsed.code {
        Some(Value::String(code)) => Some(code),
        _ => parsed.error_code,
    };
    let message = parsed
        .msg
        .or(parsed.message)
        .or(parsed.error_description)
        .or(parsed.error)
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                format!("Request failed with status {}", status)
            } else {
                body.trim().to_string()
            }
        });
    RemoteError::Rejected { status, code, message }
}

impl HttpRemote {
    pub fn new(config: &ServiceConfig) -> Result<Self, RemoteError> {
        let client = Client::builder().timeout(config.request_timeout()).build()?;
        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        Ok(Self {
            client,
            base_url: config.url.clone(),
            key: config.key.clone(),
            refresh_margin: Duration::seconds(config.refresh_margin_secs),
            session: RwLock::new(None),
            events,
        })
    }

    /// Adopt a previously persisted session without announcing it
    pub async fn restore_session(&self, session: Option<Session>) {
        *self.session.write().await = session;
    }

    /// Locally held session, as last stored or refreshed
    pub async fn current_session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, RemoteError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::Transport(format!("Service URL cannot be a base: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn bearer(&self) -> String {
        match self.session.read().await.as_ref() {
            Some(session) => session.access_token.clone(),
            None => self.key.clone(),
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Value, RemoteError> {
        let response = request.header("apikey", &self.key).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(rejection(status.as_u16(), &text));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn token_grant(&self, grant_type: &str, body: Value) -> Result<Session, RemoteError> {
        let url = self.endpoint(&["auth", "v1", "token"])?;
        let request = self
            .client
            .post(url)
            .query(&[("grant_type", grant_type)])
            .bearer_auth(&self.key)
            .json(&body);
        let value = self.send(request).await?;
        let response: TokenResponse = serde_json::from_value(value)?;
        Ok(response.into_session())
    }

    async fn store(&self, session: Option<Session>, event: AuthEvent) {
        *self.session.write().await = session;
        // No receivers is not an error
        let _ = self.events.send(event);
    }

    /// A table request refused because the bearer token expired ends the
    /// session locally, as a rejected refresh does
    async fn expire_on_jwt_rejection(&self, err: RemoteError) -> RemoteError {
        match err {
            RemoteError::Rejected { status: 401, code: Some(code), message } if code == JWT_EXPIRED => {
                warn!("Access token rejected by the platform: {}", message);
                if self.current_session().await.is_some() {
                    self.store(None, AuthEvent::signed_out()).await;
                }
                RemoteError::SessionExpired(message)
            }
            err => err,
        }
    }
}

/// PostgREST code for an expired bearer token
const JWT_EXPIRED: &str = "PGRST301";

/// Total from a `Content-Range` header: `0-24/573` or `*/0`
fn content_range_total(header: &str) -> Option<usize> {
    header.rsplit_once('/').and_then(|(_, total)| total.trim().parse().ok())
}

#[async_trait]
impl RemoteService for HttpRemote {
    async fn get_session(&self) -> Result<Option<Session>, RemoteError> {
        let Some(session) = self.current_session().await else {
            return Ok(None);
        };
        let now = Utc::now();
        if !session.is_expired_at(now, self.refresh_margin) {
            return Ok(Some(session));
        }

        let Some(refresh_token) = session.refresh_token.clone() else {
            info!("Session expired without refresh token; signing out locally");
            self.store(None, AuthEvent::signed_out()).await;
            return Err(RemoteError::SessionExpired("No refresh token for expired session".to_string()));
        };

        debug!("Refreshing access token");
        match self.token_grant("refresh_token", json!({ "refresh_token": refresh_token })).await {
            Ok(fresh) => {
                self.store(Some(fresh.clone()), AuthEvent::token_refreshed(fresh.clone())).await;
                Ok(Some(fresh))
            }
            Err(err @ RemoteError::Rejected { .. }) => {
                warn!("Refresh token rejected: {}", err);
                self.store(None, AuthEvent::signed_out()).await;
                Err(RemoteError::SessionExpired(err.to_string()))
            }
            // Still inside the refresh margin: keep using the current token
            Err(_) if !session.is_expired_at(now, Duration::zero()) => Ok(Some(session)),
            Err(err) => Err(err),
        }
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, RemoteError> {
        let session = self
            .token_grant("password", json!({ "email": email, "password": password }))
            .await?;
        self.store(Some(session.clone()), AuthEvent::signed_in(session.clone())).await;
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str, display_name: &str) -> Result<SignUp, RemoteError> {
        let url = self.endpoint(&["auth", "v1", "signup"])?;
        let request = self.client.post(url).bearer_auth(&self.key).json(&json!({
            "email": email,
            "password": password,
            "data": { "display_name": display_name },
        }));
        let value = self.send(request).await?;

        // A session comes back only when no email confirmation is pending
        if value.get("access_token").is_some() {
            let session = serde_json::from_value::<TokenResponse>(value)?.into_session();
            self.store(Some(session.clone()), AuthEvent::signed_in(session.clone())).await;
            return Ok(SignUp { user: session.user.clone(), session: Some(session) });
        }
        let user: Identity = match value.get("user") {
            Some(user) => serde_json::from_value(user.clone())?,
            None => serde_json::from_value(value)?,
        };
        Ok(SignUp { user, session: None })
    }

    async fn sign_out(&self) -> Result<(), RemoteError> {
        let Some(session) = self.current_session().await else {
            return Ok(());
        };
        let url = self.endpoint(&["auth", "v1", "logout"])?;
        let request = self.client.post(url).bearer_auth(&session.access_token);
        match self.send(request).await {
            Ok(_) => {}
            // Token already invalid on the server: the end state is the same
            Err(RemoteError::Rejected { status: 401 | 403 | 404, .. }) => {}
            Err(err) => return Err(err),
        }
        self.store(None, AuthEvent::signed_out()).await;
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    async fn execute(&self, query: Query) -> Result<Vec<Value>, RemoteError> {
        let operation = query.operation;
        if matches!(operation, Operation::Update | Operation::Delete) && !query.filter.has_conditions() {
            return Err(FilterError::UnfilteredMutation(operation.to_string()).into());
        }

        let url = self.endpoint(&["rest", "v1", query.table()])?;
        let pairs = match operation {
            Operation::Select => query.filter.to_query_pairs(),
            _ => query.filter.to_mutation_pairs(),
        };
        debug!(%operation, table = query.table(), ?pairs, "Remote query");

        let mut request = self
            .client
            .request(operation.method(), url)
            .query(&pairs)
            .bearer_auth(self.bearer().await);
        match operation {
            Operation::Upsert => request = request.header("Prefer", "return=representation,resolution=merge-duplicates"),
            op if op.is_mutation() => request = request.header("Prefer", "return=representation"),
            _ => {}
        }
        if let Some(body) = &query.body {
            request = request.json(body);
        }

        let value = match self.send(request).await {
            Ok(value) => value,
            Err(err) => return Err(self.expire_on_jwt_rejection(err).await),
        };
        match value {
            Value::Array(rows) => Ok(rows),
            Value::Null => Ok(vec![]),
            other => Ok(vec![other]),
        }
    }

    async fn count(&self, filter: Filter) -> Result<usize, RemoteError> {
        let url = self.endpoint(&["rest", "v1", filter.table_name()])?;
        let pairs = filter.to_query_pairs();
        debug!(table = filter.table_name(), ?pairs, "Remote count");

        let response = self
            .client
            .head(url)
            .query(&pairs)
            .bearer_auth(self.bearer().await)
            .header("apikey", &self.key)
            .header("Prefer", "count=exact")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            // HEAD responses carry no error body to read a code from
            let err = match status.as_u16() {
                401 => RemoteError::rejected(401, Some(JWT_EXPIRED), "JWT expired"),
                other => rejection(other, ""),
            };
            return Err(self.expire_on_jwt_rejection(err).await);
        }
        response
            .headers()
            .get(reqwest::header::CONTENT_RANGE)
            .and_then(|value| value.to_str().ok())
            .and_then(content_range_total)
            .ok_or_else(|| RemoteError::Decode(format!("{} count returned no Content-Range total", filter.table_name())))
    }
}
