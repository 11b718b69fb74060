// In-memory stand-in for the hosted platform: users, sessions, tables and
// auth events, with the same row semantics as the REST binding.
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::error::RemoteError;
use crate::filter::{Embed, Filter};
use crate::models::{Identity, Session};
use crate::remote::{AuthEvent, Query, RemoteService, SignUp, AUTH_EVENT_CAPACITY};
use crate::types::Operation;

struct MemoryUser {
    identity: Identity,
    password: String,
}

pub struct MemoryRemote {
    users: RwLock<HashMap<String, MemoryUser>>,
    tables: RwLock<HashMap<String, Vec<Value>>>,
    session: RwLock<Option<Session>>,
    required: HashMap<String, Vec<String>>,
    failing: RwLock<HashSet<String>>,
    email_confirmation: bool,
    queries: AtomicUsize,
    expired: AtomicBool,
    events: broadcast::Sender<AuthEvent>,
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRemote {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        Self {
            users: RwLock::new(HashMap::new()),
            tables: RwLock::new(HashMap::new()),
            session: RwLock::new(None),
            required: HashMap::new(),
            failing: RwLock::new(HashSet::new()),
            email_confirmation: false,
            queries: AtomicUsize::new(0),
            expired: AtomicBool::new(false),
            events,
        }
    }

    /// Reject inserts into `table` that omit any of `columns` (not-null constraint)
    pub fn with_required(mut self, table: &str, columns: &[&str]) -> Self {
        self.required.insert(table.to_string(), columns.iter().map(|c| c.to_string()).collect());
        self
    }

    /// Sign-ups return no session until the address is confirmed
    pub fn with_email_confirmation(mut self) -> Self {
        self.email_confirmation = true;
        self
    }

    pub async fn add_user(&self, email: &str, password: &str) -> Identity {
        let identity = Identity { id: Uuid::new_v4(), email: Some(email.to_string()), authenticated_at: None };
        self.users.write().await.insert(
            email.to_lowercase(),
            MemoryUser { identity: identity.clone(), password: password.to_string() },
        );
        identity
    }

    /// Insert rows directly, filling `id` and `created_at` when absent
    pub async fn seed(&self, table: &str, rows: Vec<Value>) -> Vec<Value> {
        let mut tables = self.tables.write().await;
        let stored = tables.entry(table.to_string()).or_default();
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let row = with_defaults(row);
            stored.push(row.clone());
            out.push(row);
        }
        out
    }

    pub async fn rows(&self, table: &str) -> Vec<Value> {
        self.tables.read().await.get(table).cloned().unwrap_or_default()
    }

    /// Make every request against `table` fail with a transport error
    pub async fn fail_table(&self, table: &str) {
        self.failing.write().await.insert(table.to_string());
    }

    pub async fn heal_table(&self, table: &str) {
        self.failing.write().await.remove(table);
    }

    /// Number of table requests served so far
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    /// Invalidate the held session's tokens: the next session lookup or
    /// table request signs out and reports an expired session
    pub fn expire_session(&self) {
        self.expired.store(true, Ordering::SeqCst);
    }

    /// Deliver an auth event as if the platform had pushed it
    pub fn emit(&self, event: AuthEvent) {
        let _ = self.events.send(event);
    }

    pub async fn current_session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    fn issue_session(identity: &Identity) -> Session {
        let now = Utc::now();
        Session {
            access_token: Uuid::new_v4().to_string(),
            refresh_token: Some(Uuid::new_v4().to_string()),
            expires_at: Some(now + Duration::hours(1)),
            user: Identity { authenticated_at: Some(now), ..identity.clone() },
        }
    }

    async fn store(&self, session: Option<Session>, event: AuthEvent) {
        *self.session.write().await = session;
        let _ = self.events.send(event);
    }

    async fn check_table(&self, table: &str) -> Result<(), RemoteError> {
        self.check_expiry().await?;
        if self.failing.read().await.contains(table) {
            return Err(RemoteError::Transport(format!("connection reset while querying {}", table)));
        }
        Ok(())
    }

    async fn check_expiry(&self) -> Result<(), RemoteError> {
        if !self.expired.swap(false, Ordering::SeqCst) || self.session.read().await.is_none() {
            return Ok(());
        }
        self.store(None, AuthEvent::signed_out()).await;
        Err(RemoteError::SessionExpired("JWT expired".to_string()))
    }

    fn check_required(&self, table: &str, row: &Value) -> Result<(), RemoteError> {
        let Some(columns) = self.required.get(table) else {
            return Ok(());
        };
        for column in columns {
            if row.get(column).map(Value::is_null).unwrap_or(true) {
                return Err(RemoteError::rejected(
                    400,
                    Some("23502"),
                    format!("null value in column \"{}\" of relation \"{}\" violates not-null constraint", column, table),
                ));
            }
        }
        Ok(())
    }
}

fn with_defaults(row: Value) -> Value {
    let mut map = match row {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    map.entry("id").or_insert_with(|| json!(Uuid::new_v4()));
    map.entry("created_at").or_insert_with(|| json!(Utc::now()));
    Value::Object(map)
}

fn body_rows(body: Option<Value>) -> Result<Vec<Value>, RemoteError> {
    match body {
        Some(Value::Array(rows)) => Ok(rows),
        Some(row @ Value::Object(_)) => Ok(vec![row]),
        _ => Err(RemoteError::rejected(400, Some("PGRST102"), "Empty or invalid json")),
    }
}

fn merge(target: &mut Value, patch: &Value) {
    if let (Value::Object(target), Value::Object(patch)) = (target, patch) {
        for (key, value) in patch {
            target.insert(key.clone(), value.clone());
        }
    }
}

/// Attach each embedded relation the way the REST binding returns it
fn resolve_embeds(tables: &HashMap<String, Vec<Value>>, embeds: &[Embed], rows: Vec<Value>) -> Vec<Value> {
    if embeds.is_empty() {
        return rows;
    }
    rows.into_iter()
        .map(|mut row| {
            for embed in embeds {
                let target = row.get(&embed.foreign_key).cloned().unwrap_or(Value::Null);
                let related = tables
                    .get(&embed.table)
                    .and_then(|related| related.iter().find(|r| !target.is_null() && r.get("id") == Some(&target)))
                    .map(|r| project_columns(r, &embed.columns))
                    .unwrap_or(Value::Null);
                if let Value::Object(map) = &mut row {
                    map.insert(embed.table.clone(), related);
                }
            }
            row
        })
        .collect()
}

fn project_columns(row: &Value, columns: &[String]) -> Value {
    if columns.is_empty() || columns.iter().any(|c| c == "*") {
        return row.clone();
    }
    let map: Map<String, Value> = columns
        .iter()
        .map(|c| (c.clone(), row.get(c).cloned().unwrap_or(Value::Null)))
        .collect();
    Value::Object(map)
}

#[async_trait]
impl RemoteService for MemoryRemote {
    async fn get_session(&self) -> Result<Option<Session>, RemoteError> {
        self.check_expiry().await?;
        Ok(self.session.read().await.clone())
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, RemoteError> {
        let identity = {
            let users = self.users.read().await;
            match users.get(&email.to_lowercase()) {
                Some(user) if user.password == password => user.identity.clone(),
                _ => return Err(RemoteError::rejected(400, Some("invalid_credentials"), "Invalid login credentials")),
            }
        };
        let session = Self::issue_session(&identity);
        self.store(Some(session.clone()), AuthEvent::signed_in(session.clone())).await;
        Ok(session)
    }

    async fn sign_up(&self, email: &str, password: &str, _display_name: &str) -> Result<SignUp, RemoteError> {
        if password.len() < 6 {
            return Err(RemoteError::rejected(422, Some("weak_password"), "Password should be at least 6 characters"));
        }
        if self.users.read().await.contains_key(&email.to_lowercase()) {
            return Err(RemoteError::rejected(422, Some("user_already_exists"), "User already registered"));
        }
        let user = self.add_user(email, password).await;
        if self.email_confirmation {
            return Ok(SignUp { user, session: None });
        }
        let session = Self::issue_session(&user);
        self.store(Some(session.clone()), AuthEvent::signed_in(session.clone())).await;
        Ok(SignUp { user, session: Some(session) })
    }

    async fn sign_out(&self) -> Result<(), RemoteError> {
        if self.session.read().await.is_none() {
            return Ok(());
        }
        self.store(None, AuthEvent::signed_out()).await;
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    async fn execute(&self, query: Query) -> Result<Vec<Value>, RemoteError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let table = query.table().to_string();
        self.check_table(&table).await?;

        let filter: &Filter = &query.filter;
        let mut tables = self.tables.write().await;
        let rows = match query.operation {
            Operation::Select => {
                let stored = tables.get(&table).cloned().unwrap_or_default();
                filter.apply(stored)
            }
            Operation::Create => {
                let incoming = body_rows(query.body)?;
                let mut created = Vec::with_capacity(incoming.len());
                for row in incoming {
                    self.check_required(&table, &row)?;
                    created.push(with_defaults(row));
                }
                tables.entry(table.clone()).or_default().extend(created.iter().cloned());
                created
            }
            Operation::Upsert => {
                let incoming = body_rows(query.body)?;
                let stored = tables.entry(table.clone()).or_default();
                let mut written = Vec::with_capacity(incoming.len());
                for row in incoming {
                    let existing = row
                        .get("id")
                        .and_then(|id| stored.iter_mut().find(|r| r.get("id") == Some(id)));
                    match existing {
                        Some(existing) => {
                            merge(existing, &row);
                            written.push(existing.clone());
                        }
                        None => {
                            self.check_required(&table, &row)?;
                            let row = with_defaults(row);
                            stored.push(row.clone());
                            written.push(row);
                        }
                    }
                }
                written
            }
            Operation::Update => {
                let patch = query.body.unwrap_or(Value::Null);
                let stored = tables.entry(table.clone()).or_default();
                let mut updated = Vec::new();
                for row in stored.iter_mut().filter(|r| filter.matches(r)) {
                    merge(row, &patch);
                    updated.push(row.clone());
                }
                updated
            }
            Operation::Delete => {
                let stored = tables.entry(table.clone()).or_default();
                let (removed, kept): (Vec<Value>, Vec<Value>) = stored.drain(..).partition(|r| filter.matches(r));
                *stored = kept;
                removed
            }
        };

        let rows = resolve_embeds(&tables, filter.embeds(), rows);
        Ok(rows.into_iter().map(|row| filter.project(row)).collect())
    }

    async fn count(&self, filter: Filter) -> Result<usize, RemoteError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.check_table(filter.table_name()).await?;
        let stored = self.rows(filter.table_name()).await;
        Ok(stored.iter().filter(|row| filter.matches(row)).count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn select_resolves_embedded_patient() {
        let remote = MemoryRemote::new();
        let patients = remote
            .seed("patients", vec![json!({ "first_name": "Laura", "last_name": "Bianchi", "phone": "333" })])
            .await;
        let patient_id = patients[0]["id"].clone();
        remote
            .seed("appointments", vec![json!({ "patient_id": patient_id, "start_time": "2025-04-19T09:00:00Z" })])
            .await;

        let filter = Filter::new("appointments")
            .unwrap()
            .embed(Embed::new("patients", "patient_id", &["id", "first_name", "last_name"]))
            .unwrap();
        let rows = remote.execute(Query::select(filter)).await.unwrap();

        assert_eq!(rows[0]["patients"]["first_name"], "Laura");
        assert!(rows[0]["patients"].get("phone").is_none());
    }

    #[tokio::test]
    async fn count_ignores_paging() {
        let remote = MemoryRemote::new();
        remote
            .seed("patients", vec![json!({ "first_name": "Laura" }), json!({ "first_name": "Paolo" })])
            .await;
        let filter = Filter::new("patients").unwrap().limit(1, None).unwrap();
        assert_eq!(remote.count(filter).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn insert_enforces_required_columns() {
        let remote = MemoryRemote::new().with_required("patients", &["last_name"]);
        let filter = Filter::new("patients").unwrap();
        let err = remote
            .execute(Query::insert(filter, json!({ "first_name": "Marco" })))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("23502"));
        assert!(remote.rows("patients").await.is_empty());
    }

    #[tokio::test]
    async fn upsert_merges_existing_rows() {
        let remote = MemoryRemote::new();
        let id = Uuid::new_v4();
        let filter = Filter::new("profiles").unwrap();
        remote
            .execute(Query::upsert(filter.clone(), json!({ "id": id, "role": "therapist", "full_name": "Marco" })))
            .await
            .unwrap();
        remote
            .execute(Query::upsert(filter, json!({ "id": id, "full_name": "Marco Rossi" })))
            .await
            .unwrap();

        let rows = remote.rows("profiles").await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["full_name"], "Marco Rossi");
        assert_eq!(rows[0]["role"], "therapist");
    }
}
