//! Gateway configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::auth::UnauthenticatedPolicy;

/// Log output format selected by `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per event.
    Json,
}

/// Top-level gateway configuration.
///
/// Loaded once at startup via [`GatewayConfig::from_env`].
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:8080`).
    pub listen_addr: SocketAddr,

    /// Root directory scanned for service manifests.
    pub services_root: PathBuf,

    /// File name that marks a directory as a service.
    pub manifest_file: String,

    /// Conventional setup script name looked up in each service directory.
    pub setup_script: String,

    /// Maximum time a setup step may run before it is killed.
    pub setup_timeout: Duration,

    /// Grace period between SIGTERM and SIGKILL when stopping a child.
    pub stop_grace: Duration,

    /// Upstream base URL for services whose manifest names none.
    pub default_upstream: String,

    /// Per-request upstream timeout.
    pub proxy_timeout: Duration,

    /// Largest request body buffered for forwarding.
    pub max_body_bytes: usize,

    /// Decision for services that declare no `auth` block.
    pub unauthenticated_policy: UnauthenticatedPolicy,

    /// Whether to guess a start command from a service's files.
    pub infer_start_command: bool,

    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            services_root: PathBuf::from("services"),
            manifest_file: "service-config.json".to_string(),
            setup_script: "setup.sh".to_string(),
            setup_timeout: Duration::from_secs(300),
            stop_grace: Duration::from_secs(10),
            default_upstream: "http://localhost:8187".to_string(),
            proxy_timeout: Duration::from_secs(30),
            max_body_bytes: 10 * 1024 * 1024,
            unauthenticated_policy: UnauthenticatedPolicy::Deny,
            infer_start_command: false,
            log_format: LogFormat::Text,
        }
    }
}

impl GatewayConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to defaults when a variable is not set.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if `LISTEN_ADDR` is set but cannot be parsed as
    /// a [`SocketAddr`].
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if `LISTEN_ADDR` is present but unparsable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Box<dyn std::error::Error>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let listen_addr = match lookup("LISTEN_ADDR") {
            Some(raw) => raw.parse()?,
            None => defaults.listen_addr,
        };

        let unauthenticated_policy = match lookup("UNAUTHENTICATED_POLICY").as_deref() {
            Some("allow") | Some("ALLOW") => UnauthenticatedPolicy::Allow,
            _ => UnauthenticatedPolicy::Deny,
        };

        let log_format = match lookup("LOG_FORMAT").as_deref() {
            Some("json") | Some("JSON") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Ok(Self {
            listen_addr,
            services_root: lookup("SERVICES_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.services_root),
            manifest_file: lookup("MANIFEST_FILE").unwrap_or(defaults.manifest_file),
            setup_script: lookup("SETUP_SCRIPT").unwrap_or(defaults.setup_script),
            setup_timeout: Duration::from_secs(parse_or(&lookup, "SETUP_TIMEOUT_SECS", 300)),
            stop_grace: Duration::from_secs(parse_or(&lookup, "STOP_GRACE_SECS", 10)),
            default_upstream: lookup("DEFAULT_UPSTREAM").unwrap_or(defaults.default_upstream),
            proxy_timeout: Duration::from_secs(parse_or(&lookup, "PROXY_TIMEOUT_SECS", 30)),
            max_body_bytes: parse_or(&lookup, "MAX_BODY_BYTES", defaults.max_body_bytes),
            unauthenticated_policy,
            infer_start_command: parse_bool_or(&lookup, "INFER_START_COMMAND", false),
            log_format,
        })
    }
}

/// Parses a value as `T`, returning `default` on missing or invalid input.
fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Parses a boolean. Accepts `"true"`, `"1"`, `"false"`, `"0"`
/// (case-insensitive). Returns `default` otherwise.
fn parse_bool_or<F>(lookup: &F, key: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|v| v.to_ascii_lowercase()).as_deref() {
        Some("true") | Some("1") => true,
        Some("false") | Some("0") => false,
        _ => default,
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let Ok(config) = GatewayConfig::from_lookup(lookup_from(&[])) else {
            panic!("defaults must load");
        };
        assert_eq!(config.listen_addr.port(), 8080);
        assert_eq!(config.services_root, PathBuf::from("services"));
        assert_eq!(config.manifest_file, "service-config.json");
        assert_eq!(config.unauthenticated_policy, UnauthenticatedPolicy::Deny);
        assert!(!config.infer_start_command);
    }

    #[test]
    fn overrides_are_applied() {
        let Ok(config) = GatewayConfig::from_lookup(lookup_from(&[
            ("LISTEN_ADDR", "127.0.0.1:9000"),
            ("SERVICES_ROOT", "/srv/services"),
            ("SETUP_TIMEOUT_SECS", "5"),
            ("UNAUTHENTICATED_POLICY", "allow"),
            ("INFER_START_COMMAND", "TRUE"),
            ("LOG_FORMAT", "json"),
        ])) else {
            panic!("overrides must load");
        };
        assert_eq!(config.listen_addr.port(), 9000);
        assert_eq!(config.services_root, PathBuf::from("/srv/services"));
        assert_eq!(config.setup_timeout, Duration::from_secs(5));
        assert_eq!(config.unauthenticated_policy, UnauthenticatedPolicy::Allow);
        assert!(config.infer_start_command);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn invalid_numbers_fall_back() {
        let Ok(config) =
            GatewayConfig::from_lookup(lookup_from(&[("STOP_GRACE_SECS", "soon")]))
        else {
            panic!("config must load");
        };
        assert_eq!(config.stop_grace, Duration::from_secs(10));
    }

    #[test]
    fn bad_listen_addr_is_an_error() {
        let result = GatewayConfig::from_lookup(lookup_from(&[("LISTEN_ADDR", "nowhere")]));
        assert!(result.is_err());
    }

    #[test]
    fn unknown_policy_stays_closed() {
        let Ok(config) =
            GatewayConfig::from_lookup(lookup_from(&[("UNAUTHENTICATED_POLICY", "maybe")]))
        else {
            panic!("config must load");
        };
        assert_eq!(config.unauthenticated_policy, UnauthenticatedPolicy::Deny);
    }
}
