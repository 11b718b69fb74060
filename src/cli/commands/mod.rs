pub mod auth;
pub mod dashboard;
pub mod data;
pub mod gate;

use crate::clinic::Clinic;
use crate::gate::{GateDecision, Route};

/// Refuse protected commands the gate would not allow
pub fn ensure_allowed(clinic: &Clinic, route: Route) -> anyhow::Result<()> {
    match clinic.check(route) {
        GateDecision::Allow => Ok(()),
        GateDecision::RedirectLogin => anyhow::bail!("Not signed in. Run `fisio auth login <email>` first"),
        GateDecision::RedirectSubscribe => {
            anyhow::bail!("An active subscription is required for {}. See {}", route, Route::Subscription)
        }
        GateDecision::Pending => anyhow::bail!("Session is still loading, try again"),
    }
}
