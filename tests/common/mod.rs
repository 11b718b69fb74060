#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use axum::extract::{Path, RawQuery, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Duration, Utc};
use fisiosmart::config::AppConfig;
use fisiosmart::gate::AccessGate;
use async_trait::async_trait;
use fisiosmart::error::RemoteError;
use fisiosmart::filter::Filter;
use fisiosmart::models::{Identity, Role, Session};
use fisiosmart::remote::{AuthEvent, Query, RemoteService, SignUp};
use fisiosmart::session::SessionSnapshot;
use fisiosmart::testing::MemoryRemote;
use fisiosmart::Clinic;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tokio::sync::{broadcast, watch};
use uuid::Uuid;

pub const EMAIL: &str = "marco.rossi@fisiosmart.it";
pub const PASSWORD: &str = "correct-horse";

pub fn config(gating: bool) -> AppConfig {
    let mut env = HashMap::new();
    env.insert("SUPABASE_URL", "http://127.0.0.1:54321".to_string());
    env.insert("SUPABASE_KEY", "anon-key".to_string());
    env.insert("FISIO_SUBSCRIPTION_GATING", gating.to_string());
    AppConfig::from_lookup(|key| env.get(key).cloned()).expect("test config")
}

/// Clinic over a fresh in-memory platform
pub fn memory_clinic(gating: bool) -> (Clinic, Arc<MemoryRemote>) {
    let remote = Arc::new(MemoryRemote::new());
    let clinic = Clinic::from_parts(remote.clone() as Arc<dyn RemoteService>, AccessGate::new(gating), Role::Therapist);
    (clinic, remote)
}

pub async fn seed_profile(remote: &MemoryRemote, user: &Identity, role: Role) {
    remote
        .seed("profiles", vec![json!({
            "id": user.id,
            "email": user.email,
            "full_name": "Marco Rossi",
            "role": role,
        })])
        .await;
}

pub async fn seed_subscription(remote: &MemoryRemote, user: &Identity, status: &str, expires_at: Option<DateTime<Utc>>) {
    remote
        .seed("subscriptions", vec![json!({
            "user_id": user.id,
            "plan": "premium",
            "status": status,
            "expires_at": expires_at,
        })])
        .await;
}

/// A therapist with a profile and, if `subscribed`, an active subscription
pub async fn therapist(remote: &MemoryRemote, subscribed: bool) -> Identity {
    let user = remote.add_user(EMAIL, PASSWORD).await;
    seed_profile(remote, &user, Role::Therapist).await;
    if subscribed {
        seed_subscription(remote, &user, "active", Some(Utc::now() + Duration::days(30))).await;
    }
    user
}

/// Clinic signed in as a subscribed therapist
pub async fn signed_in_clinic() -> Result<(Clinic, Arc<MemoryRemote>)> {
    let (clinic, remote) = memory_clinic(true);
    therapist(&remote, true).await;
    clinic.session.login(EMAIL, PASSWORD).await?;
    Ok((clinic, remote))
}

pub async fn seed_patient(remote: &MemoryRemote, first_name: &str, last_name: &str, created_at: &str) -> Uuid {
    let rows = remote
        .seed("patients", vec![json!({
            "first_name": first_name,
            "last_name": last_name,
            "email": format!("{}.{}@example.com", first_name.to_lowercase(), last_name.to_lowercase()),
            "created_at": created_at,
        })])
        .await;
    serde_json::from_value(rows[0]["id"].clone()).expect("seeded id")
}

/// Delegates to a `MemoryRemote` but holds every table request until
/// `release` is called
pub struct HeldRemote {
    pub inner: Arc<MemoryRemote>,
    released: watch::Sender<bool>,
}

impl HeldRemote {
    pub fn new(inner: Arc<MemoryRemote>) -> Self {
        let (released, _) = watch::channel(false);
        Self { inner, released }
    }

    pub fn release(&self) {
        self.released.send_replace(true);
    }

    async fn hold(&self) {
        let mut released = self.released.subscribe();
        let _ = released.wait_for(|open| *open).await;
    }
}

#[async_trait]
impl RemoteService for HeldRemote {
    async fn get_session(&self) -> Result<Option<Session>, RemoteError> {
        self.inner.get_session().await
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, RemoteError> {
        self.inner.sign_in(email, password).await
    }

    async fn sign_up(&self, email: &str, password: &str, display_name: &str) -> Result<SignUp, RemoteError> {
        self.inner.sign_up(email, password, display_name).await
    }

    async fn sign_out(&self) -> Result<(), RemoteError> {
        self.inner.sign_out().await
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.subscribe()
    }

    async fn execute(&self, query: Query) -> Result<Vec<Value>, RemoteError> {
        self.hold().await;
        self.inner.execute(query).await
    }

    async fn count(&self, filter: Filter) -> Result<usize, RemoteError> {
        self.hold().await;
        self.inner.count(filter).await
    }
}

/// Every snapshot the store publishes from now on
pub fn record_snapshots(clinic: &Clinic) -> Arc<Mutex<Vec<SessionSnapshot>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut updates = clinic.session.subscribe();
    let sink = seen.clone();
    tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let snapshot = updates.borrow_and_update().clone();
            sink.lock().unwrap().push(snapshot);
        }
    });
    seen
}

// ---------------------------------------------------------------------------
// Fake of the platform's REST endpoints, for the HTTP binding

#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub query: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Value>,
}

impl Recorded {
    /// Decoded value of a query parameter
    pub fn param(&self, key: &str) -> Option<String> {
        url::form_urlencoded::parse(self.query.as_bytes())
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

#[derive(Clone, Default)]
pub struct FakeState {
    pub requests: Arc<Mutex<Vec<Recorded>>>,
    pub user_id: Uuid,
}

pub struct FakePlatform {
    pub base_url: String,
    pub state: FakeState,
}

impl FakePlatform {
    pub fn requests(&self) -> Vec<Recorded> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self, path: &str) -> Option<Recorded> {
        self.requests().into_iter().rev().find(|r| r.path == path)
    }
}

pub fn access_token(user_id: Uuid, expires_in: Duration) -> String {
    let claims = json!({
        "sub": user_id,
        "email": EMAIL,
        "role": "authenticated",
        "aud": "authenticated",
        "exp": (Utc::now() + expires_in).timestamp(),
    });
    encode(&Header::default(), &claims, &EncodingKey::from_secret(b"platform-jwt-secret")).expect("token")
}

fn record(state: &FakeState, method: &Method, path: String, query: Option<String>, headers: &HeaderMap, body: &str) {
    let headers = headers
        .iter()
        .map(|(k, v)| (k.as_str().to_string(), v.to_str().unwrap_or_default().to_string()))
        .collect();
    state.requests.lock().unwrap().push(Recorded {
        method: method.to_string(),
        path,
        query: query.unwrap_or_default(),
        headers,
        body: serde_json::from_str(body).ok(),
    });
}

async fn token(
    State(state): State<FakeState>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, Json<Value>) {
    record(&state, &Method::POST, "/auth/v1/token".into(), query.clone(), &headers, &body);
    let body: Value = serde_json::from_str(&body).unwrap_or_default();
    let user = json!({ "id": state.user_id, "email": EMAIL, "aud": "authenticated" });

    match query.as_deref() {
        Some("grant_type=password") if body["password"] == PASSWORD => (
            StatusCode::OK,
            // No expires_in/expires_at: the client reads the JWT instead
            Json(json!({
                "access_token": access_token(state.user_id, Duration::seconds(5)),
                "token_type": "bearer",
                "refresh_token": "refresh-1",
                "user": user,
            })),
        ),
        Some("grant_type=password") => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid_grant", "error_description": "Invalid login credentials" })),
        ),
        Some("grant_type=refresh_token") if body["refresh_token"] == "refresh-1" => (
            StatusCode::OK,
            Json(json!({
                "access_token": access_token(state.user_id, Duration::hours(1)),
                "token_type": "bearer",
                "expires_in": 3600,
                "refresh_token": "refresh-2",
                "user": user,
            })),
        ),
        _ => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "invalid_grant", "error_description": "Invalid Refresh Token" })),
        ),
    }
}

async fn signup(State(state): State<FakeState>, headers: HeaderMap, body: String) -> (StatusCode, Json<Value>) {
    record(&state, &Method::POST, "/auth/v1/signup".into(), None, &headers, &body);
    let body: Value = serde_json::from_str(&body).unwrap_or_default();
    if body["email"] == EMAIL {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "code": 422, "error_code": "user_already_exists", "msg": "User already registered" })),
        );
    }
    // Confirmation pending: the user object comes back without a session
    (StatusCode::OK, Json(json!({ "id": Uuid::new_v4(), "email": body["email"], "aud": "authenticated" })))
}

async fn logout(State(state): State<FakeState>, headers: HeaderMap) -> StatusCode {
    record(&state, &Method::POST, "/auth/v1/logout".into(), None, &headers, "");
    StatusCode::NO_CONTENT
}

async fn rest(
    State(state): State<FakeState>,
    method: Method,
    Path(table): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: String,
) -> Response {
    record(&state, &method, format!("/rest/v1/{}", table), query.clone(), &headers, &body);
    let patient = json!({
        "id": "0b8f5c8e-6d0b-4a43-9a52-3f4f0c1d2e3f",
        "first_name": "Laura",
        "last_name": "Bianchi",
        "phone": "333 1234567",
        "created_at": "2025-04-01T10:00:00Z",
    });
    let query = query.unwrap_or_default();

    match (method.as_str(), table.as_str()) {
        ("HEAD", "patients") => (StatusCode::OK, [(header::CONTENT_RANGE, "0-6/7")]).into_response(),
        ("GET", "profiles") => Json(json!([{ "id": state.user_id, "role": "admin" }])).into_response(),
        ("GET", "subscriptions") => Json(json!([])).into_response(),
        ("GET", "patients") => Json(json!([patient])).into_response(),
        ("POST", "patients") => {
            let mut created: Value = serde_json::from_str(&body).unwrap_or_default();
            created["id"] = json!(Uuid::new_v4());
            created["created_at"] = json!(Utc::now());
            (StatusCode::CREATED, Json(json!([created]))).into_response()
        }
        ("PATCH", "patients") | ("DELETE", "patients") => Json(json!([])).into_response(),
        ("GET", "invoices") => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "code": "22P02", "message": "invalid input syntax for type uuid", "details": null, "hint": null })),
        )
            .into_response(),
        ("GET", "appointments") => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "code": "PGRST301", "message": "JWT expired", "details": null, "hint": null })),
        )
            .into_response(),
        ("GET", "exercises") if query.contains("order=nome") => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "code": "42703", "message": "column exercises.nome does not exist" })),
        )
            .into_response(),
        _ => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "code": "PGRST205",
                "message": format!("Could not find the table 'public.{}' in the schema cache", table),
            })),
        )
            .into_response(),
    }
}

/// Serve the fake platform on a free local port
pub async fn spawn_platform() -> Result<FakePlatform> {
    let port = portpicker::pick_unused_port().context("failed to pick free port")?;
    let state = FakeState { requests: Arc::default(), user_id: Uuid::new_v4() };

    let app = Router::new()
        .route("/auth/v1/token", post(token))
        .route("/auth/v1/signup", post(signup))
        .route("/auth/v1/logout", post(logout))
        .route("/rest/v1/:table", get(rest).post(rest).patch(rest).delete(rest))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    Ok(FakePlatform { base_url: format!("http://127.0.0.1:{}", port), state })
}
