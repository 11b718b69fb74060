use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use thiserror::Error;

use crate::models::Role;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Missing configuration: {0}")]
    Missing(&'static str),

    #[error("Invalid service URL '{0}'")]
    InvalidUrl(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub service: ServiceConfig,
    pub access: AccessConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

/// Endpoint and credentials of the hosted data/auth platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub url: url::Url,
    #[serde(skip_serializing)]
    pub key: String,
    pub request_timeout_secs: u64,
    /// Refresh the access token this many seconds before it expires
    pub refresh_margin_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessConfig {
    pub subscription_gating: bool,
    /// Role written to the profile of newly registered users
    pub default_role: Role,
}

impl ServiceConfig {
    pub fn new(url: &str, key: &str) -> Result<Self, ConfigError> {
        let url = Self::parse_url(url)?;
        if key.trim().is_empty() {
            return Err(ConfigError::Missing("SUPABASE_KEY"));
        }
        Ok(Self {
            url,
            key: key.to_string(),
            request_timeout_secs: 30,
            refresh_margin_secs: 60,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn parse_url(raw: &str) -> Result<url::Url, ConfigError> {
        if raw.trim().is_empty() {
            return Err(ConfigError::Missing("SUPABASE_URL"));
        }
        let url = url::Url::parse(raw.trim()).map_err(|_| ConfigError::InvalidUrl(raw.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(ConfigError::InvalidUrl(raw.to_string()));
        }
        Ok(url)
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let environment = match lookup("APP_ENV").as_deref() {
            Some("production") | Some("prod") => Environment::Production,
            Some("staging") | Some("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        let url = lookup("SUPABASE_URL").ok_or(ConfigError::Missing("SUPABASE_URL"))?;
        let key = lookup("SUPABASE_KEY").ok_or(ConfigError::Missing("SUPABASE_KEY"))?;
        let service = ServiceConfig::new(&url, &key)?;

        // Set defaults based on environment, then override with specific env vars
        let config = match environment {
            Environment::Production => Self::production(service),
            Environment::Staging => Self::staging(service),
            Environment::Development => Self::development(service),
        };
        Ok(config.with_overrides(&lookup))
    }

    fn with_overrides(mut self, lookup: &impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = lookup("FISIO_SUBSCRIPTION_GATING") {
            self.access.subscription_gating = v.parse().unwrap_or(self.access.subscription_gating);
        }
        if let Some(v) = lookup("FISIO_DEFAULT_ROLE") {
            self.access.default_role = v.parse().unwrap_or(self.access.default_role);
        }
        if let Some(v) = lookup("FISIO_REQUEST_TIMEOUT_SECS") {
            self.service.request_timeout_secs = v.parse().unwrap_or(self.service.request_timeout_secs);
        }
        if let Some(v) = lookup("FISIO_REFRESH_MARGIN_SECS") {
            self.service.refresh_margin_secs = v.parse().unwrap_or(self.service.refresh_margin_secs);
        }
        self
    }

    fn development(service: ServiceConfig) -> Self {
        Self {
            environment: Environment::Development,
            service: ServiceConfig { request_timeout_secs: 30, ..service },
            access: AccessConfig {
                subscription_gating: true,
                default_role: Role::Therapist,
            },
        }
    }

    fn staging(service: ServiceConfig) -> Self {
        Self {
            environment: Environment::Staging,
            service: ServiceConfig { request_timeout_secs: 15, ..service },
            access: AccessConfig {
                subscription_gating: true,
                default_role: Role::Therapist,
            },
        }
    }

    fn production(service: ServiceConfig) -> Self {
        Self {
            environment: Environment::Production,
            service: ServiceConfig { request_timeout_secs: 10, ..service },
            access: AccessConfig {
                subscription_gating: true,
                default_role: Role::Therapist,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_url_fails_fast() {
        let err = AppConfig::from_lookup(lookup(&[("SUPABASE_KEY", "anon")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("SUPABASE_URL"));
    }

    #[test]
    fn blank_key_fails_fast() {
        let err = AppConfig::from_lookup(lookup(&[("SUPABASE_URL", "https://x.supabase.co"), ("SUPABASE_KEY", "  ")])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("SUPABASE_KEY"));
    }

    #[test]
    fn rejects_non_http_url() {
        let err = AppConfig::from_lookup(lookup(&[("SUPABASE_URL", "ftp://x"), ("SUPABASE_KEY", "anon")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUrl(_)));
    }

    #[test]
    fn production_defaults_with_overrides() {
        let config = AppConfig::from_lookup(lookup(&[
            ("APP_ENV", "prod"),
            ("SUPABASE_URL", "https://x.supabase.co"),
            ("SUPABASE_KEY", "anon"),
            ("FISIO_SUBSCRIPTION_GATING", "false"),
            ("FISIO_DEFAULT_ROLE", "admin"),
        ]))
        .unwrap();
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.service.request_timeout_secs, 10);
        assert!(!config.access.subscription_gating);
        assert_eq!(config.access.default_role, Role::Admin);
    }

    #[test]
    fn unparsable_override_keeps_default() {
        let config = AppConfig::from_lookup(lookup(&[
            ("SUPABASE_URL", "http://localhost:54321"),
            ("SUPABASE_KEY", "anon"),
            ("FISIO_REQUEST_TIMEOUT_SECS", "soon"),
        ]))
        .unwrap();
        assert_eq!(config.service.request_timeout_secs, 30);
        assert!(config.access.subscription_gating);
    }
}
