use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::config::AccessConfig;

/// What the gate needs to know about the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GateInput {
    pub loading: bool,
    pub has_identity: bool,
    pub has_active_subscription: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GateDecision {
    /// Session state still resolving: render a neutral waiting state
    Pending,
    RedirectLogin,
    RedirectSubscribe,
    Allow,
}

impl GateDecision {
    /// Route to navigate to instead of the requested one
    pub fn redirect(&self) -> Option<Route> {
        match self {
            GateDecision::RedirectLogin => Some(Route::Login),
            GateDecision::RedirectSubscribe => Some(Route::Subscription),
            GateDecision::Pending | GateDecision::Allow => None,
        }
    }
}

/// Navigable views. Protected routes go through the gate; public ones never do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    Dashboard,
    Patients,
    Appointments,
    Exercises,
    Billing,
    Login,
    Signup,
    Subscription,
}

impl Route {
    pub const PROTECTED: [Route; 5] = [
        Route::Dashboard,
        Route::Patients,
        Route::Appointments,
        Route::Exercises,
        Route::Billing,
    ];

    pub fn is_protected(&self) -> bool {
        !matches!(self, Route::Login | Route::Signup | Route::Subscription)
    }

    pub fn path(&self) -> &'static str {
        match self {
            Route::Dashboard => "/dashboard",
            Route::Patients => "/patients",
            Route::Appointments => "/appointments",
            Route::Exercises => "/exercises",
            Route::Billing => "/billing",
            Route::Login => "/login",
            Route::Signup => "/signup",
            Route::Subscription => "/subscription",
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}

impl FromStr for Route {
    type Err = String;

    /// Match on the first path segment, so `/patients/42?tab=notes` is `Patients`
    /// and `/` is the dashboard.
    fn from_str(path: &str) -> Result<Self, Self::Err> {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let segment = path.trim().trim_start_matches('/').split('/').next().unwrap_or_default();
        match segment.to_ascii_lowercase().as_str() {
            "" | "dashboard" => Ok(Route::Dashboard),
            "patients" => Ok(Route::Patients),
            "appointments" => Ok(Route::Appointments),
            "exercises" => Ok(Route::Exercises),
            "billing" => Ok(Route::Billing),
            "login" => Ok(Route::Login),
            "signup" => Ok(Route::Signup),
            "subscription" => Ok(Route::Subscription),
            other => Err(format!("unknown route '/{}'", other)),
        }
    }
}

/// Decides whether a protected view is reachable. Pure: no I/O, no state
/// beyond the deployment's gating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessGate {
    subscription_gating: bool,
}

impl AccessGate {
    pub fn new(subscription_gating: bool) -> Self {
        Self { subscription_gating }
    }

    pub fn from_config(access: &AccessConfig) -> Self {
        Self::new(access.subscription_gating)
    }

    pub fn subscription_gating(&self) -> bool {
        self.subscription_gating
    }

    pub fn decide(&self, input: GateInput) -> GateDecision {
        if input.loading {
            return GateDecision::Pending;
        }
        if !input.has_identity {
            return GateDecision::RedirectLogin;
        }
        if self.subscription_gating && !input.has_active_subscription {
            return GateDecision::RedirectSubscribe;
        }
        GateDecision::Allow
    }

    pub fn decide_route(&self, route: Route, input: GateInput) -> GateDecision {
        if route.is_protected() {
            self.decide(input)
        } else {
            GateDecision::Allow
        }
    }
}

impl Default for AccessGate {
    fn default() -> Self {
        Self::new(true)
    }
}
