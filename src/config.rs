//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::onboarding::state::{DASHBOARD_ROUTE, normalize_path};

/// Gate configuration.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Public route unauthenticated visitors are sent to.
    pub landing_route: String,
    /// Where completed identities land from public pages.
    pub complete_route: String,
    /// Protected routes exempt from step enforcement.
    pub bypass_routes: Vec<String>,
    /// Public pages a signed-in identity is bounced away from.
    pub public_only_routes: Vec<String>,
    /// Upper bound on a single profile store call.
    pub profile_timeout: Duration,
    /// Attempts per profile store call before falling back.
    pub profile_attempts: u32,
    /// How long a read for the same (identity, route) may be reused by the
    /// next resolution.
    pub fresh_read_window: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            landing_route: "/".to_string(),
            complete_route: DASHBOARD_ROUTE.to_string(),
            bypass_routes: vec!["/verified".to_string(), "/update-password".to_string()],
            public_only_routes: vec!["/".to_string(), "/signin".to_string(), "/signup".to_string()],
            profile_timeout: Duration::from_secs(5),
            profile_attempts: 2,
            fresh_read_window: Duration::from_millis(500),
        }
    }
}

impl GateConfig {
    pub fn is_bypass(&self, path: &str) -> bool {
        let path = normalize_path(path);
        self.bypass_routes.iter().any(|r| normalize_path(r) == path)
    }

    pub fn is_public_only(&self, path: &str) -> bool {
        let path = normalize_path(path);
        self.public_only_routes.iter().any(|r| normalize_path(r) == path)
    }
}

/// Server configuration, read from the environment.
#[derive(Debug)]
pub struct ServerConfig {
    pub port: u16,
    pub database_path: PathBuf,
    pub identity_url: String,
    pub identity_api_key: SecretString,
    /// Allowed browser origin. `None` allows any origin.
    pub cors_origin: Option<String>,
    pub gate: GateConfig,
}

impl ServerConfig {
    /// Build from `GATE_*` / `IDENTITY_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let identity_url = lookup("IDENTITY_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("IDENTITY_URL".into()))?;
        let identity_api_key = lookup("IDENTITY_API_KEY")
            .filter(|v| !v.trim().is_empty())
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingEnvVar("IDENTITY_API_KEY".into()))?;

        let port = parse_or("GATE_PORT", lookup("GATE_PORT"), 8080u16)?;
        let database_path = lookup("GATE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("data/gate.db"));
        let cors_origin = lookup("GATE_CORS_ORIGIN").filter(|v| !v.trim().is_empty());

        let mut gate = GateConfig::default();
        if let Some(raw) = lookup("GATE_BYPASS_ROUTES") {
            gate.bypass_routes = raw
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string)
                .collect();
            if let Some(bad) = gate.bypass_routes.iter().find(|r| !r.starts_with('/')) {
                return Err(ConfigError::InvalidValue {
                    key: "GATE_BYPASS_ROUTES".into(),
                    message: format!("route '{bad}' must start with '/'"),
                });
            }
        }
        let timeout_ms = parse_or("GATE_PROFILE_TIMEOUT_MS", lookup("GATE_PROFILE_TIMEOUT_MS"), 5_000u64)?;
        if timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "GATE_PROFILE_TIMEOUT_MS".into(),
                message: "must be greater than zero".into(),
            });
        }
        gate.profile_timeout = Duration::from_millis(timeout_ms);
        gate.profile_attempts = parse_or("GATE_PROFILE_ATTEMPTS", lookup("GATE_PROFILE_ATTEMPTS"), 2u32)?.max(1);

        Ok(Self {
            port,
            database_path,
            identity_url,
            identity_api_key,
            cors_origin,
            gate,
        })
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
    }
}
