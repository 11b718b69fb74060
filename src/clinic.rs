use chrono::{TimeZone, Utc};
use std::sync::Arc;

use crate::config::AppConfig;
use crate::dashboard::Dashboard;
use crate::error::RemoteError;
use crate::gate::{AccessGate, GateDecision, Route};
use crate::models::{Appointment, Exercise, Invoice, Patient, Role};
use crate::remote::{HttpRemote, RemoteService};
use crate::services::Repository;
use crate::session::SessionStore;

/// Application context: one session store, the gate and a repository per
/// entity, all sharing the same remote. Clone it freely.
#[derive(Clone)]
pub struct Clinic {
    pub session: Arc<SessionStore>,
    pub gate: AccessGate,
    pub patients: Repository<Patient>,
    pub appointments: Repository<Appointment>,
    pub exercises: Repository<Exercise>,
    pub invoices: Repository<Invoice>,
}

impl Clinic {
    /// Build over the HTTP binding of the configured platform
    pub fn connect(config: &AppConfig) -> Result<(Self, Arc<HttpRemote>), RemoteError> {
        let remote = Arc::new(HttpRemote::new(&config.service)?);
        let clinic = Self::with_remote(config, remote.clone());
        Ok((clinic, remote))
    }

    pub fn with_remote(config: &AppConfig, remote: Arc<dyn RemoteService>) -> Self {
        Self::from_parts(remote, AccessGate::from_config(&config.access), config.access.default_role)
    }

    pub fn from_parts(remote: Arc<dyn RemoteService>, gate: AccessGate, default_role: Role) -> Self {
        Self {
            session: Arc::new(SessionStore::new(remote.clone(), default_role)),
            gate,
            patients: Repository::new(remote.clone()),
            appointments: Repository::new(remote.clone()),
            exercises: Repository::new(remote.clone()),
            invoices: Repository::new(remote),
        }
    }

    /// Gate decision for `route` against the current session snapshot
    pub fn check(&self, route: Route) -> GateDecision {
        self.gate.decide_route(route, self.session.gate_input())
    }

    pub async fn dashboard<Tz: TimeZone>(&self, tz: &Tz) -> Dashboard {
        Dashboard::load(&self.patients, &self.appointments, &self.invoices, Utc::now(), tz).await
    }
}
