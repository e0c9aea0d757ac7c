//! Process-level configuration
//!
//! Read once at startup from the environment (after `.env` is loaded) and
//! treated as immutable from then on.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::GatewayError;
use crate::Result;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_TIMEOUT_SECS: f64 = 15.0;
pub const DEFAULT_AUDIT_LOG: &str = "logs/gateway_audit.log";
pub const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    /// Global kill-switch for WRITE actions.
    pub writes_enabled: bool,
    pub downstream_base_url: String,
    pub downstream_timeout: Duration,
    pub audit_log_path: PathBuf,
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            writes_enabled: true,
            downstream_base_url: DEFAULT_BASE_URL.to_string(),
            downstream_timeout: Duration::from_secs_f64(DEFAULT_TIMEOUT_SECS),
            audit_log_path: PathBuf::from(DEFAULT_AUDIT_LOG),
            port: DEFAULT_PORT,
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup so tests never
    /// have to mutate the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let writes_enabled = match lookup("GATEWAY_ALLOW_WRITE_TOOLS") {
            Some(raw) => parse_bool("GATEWAY_ALLOW_WRITE_TOOLS", &raw)?,
            None => defaults.writes_enabled,
        };

        let downstream_base_url = lookup("RECONCILIATION_API_BASE_URL")
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or(defaults.downstream_base_url);

        let downstream_timeout = match lookup("GATEWAY_HTTP_TIMEOUT_SECS") {
            Some(raw) => parse_timeout(&raw)?,
            None => defaults.downstream_timeout,
        };

        let audit_log_path = lookup("GATEWAY_AUDIT_LOG")
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.audit_log_path);

        let port = match lookup("PORT").or_else(|| lookup("API_PORT")) {
            Some(raw) => raw.trim().parse::<u16>().map_err(|e| {
                GatewayError::Config(format!("PORT must be a valid port number: {}", e))
            })?,
            None => defaults.port,
        };

        Ok(Self {
            writes_enabled,
            downstream_base_url,
            downstream_timeout,
            audit_log_path,
            port,
        })
    }

    pub fn with_writes_enabled(mut self, enabled: bool) -> Self {
        self.writes_enabled = enabled;
        self
    }

    pub fn with_downstream_timeout(mut self, timeout: Duration) -> Self {
        self.downstream_timeout = timeout;
        self
    }

    pub fn with_downstream_base_url(mut self, url: impl Into<String>) -> Self {
        self.downstream_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_audit_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.audit_log_path = path.into();
        self
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(GatewayError::Config(format!(
            "{} must be a boolean, got '{}'",
            key, other
        ))),
    }
}

fn parse_timeout(raw: &str) -> Result<Duration> {
    let secs: f64 = raw.trim().parse().map_err(|_| {
        GatewayError::Config(format!(
            "GATEWAY_HTTP_TIMEOUT_SECS must be a number of seconds, got '{}'",
            raw.trim()
        ))
    })?;

    if !secs.is_finite() || secs <= 0.0 {
        return Err(GatewayError::Config(
            "GATEWAY_HTTP_TIMEOUT_SECS must be greater than zero".to_string(),
        ));
    }

    Duration::try_from_secs_f64(secs).map_err(|e| {
        GatewayError::Config(format!(
            "GATEWAY_HTTP_TIMEOUT_SECS is out of range ({}): {}",
            raw.trim(),
            e
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = GatewayConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, GatewayConfig::default());
        assert!(config.writes_enabled);
        assert_eq!(config.downstream_timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_overrides() {
        let config = GatewayConfig::from_lookup(lookup_from(&[
            ("GATEWAY_ALLOW_WRITE_TOOLS", "off"),
            ("RECONCILIATION_API_BASE_URL", "http://recon:8002/"),
            ("GATEWAY_HTTP_TIMEOUT_SECS", "2.5"),
            ("GATEWAY_AUDIT_LOG", "/tmp/audit.log"),
            ("API_PORT", "9090"),
        ]))
        .unwrap();

        assert!(!config.writes_enabled);
        assert_eq!(config.downstream_base_url, "http://recon:8002");
        assert_eq!(config.downstream_timeout, Duration::from_millis(2500));
        assert_eq!(config.audit_log_path, PathBuf::from("/tmp/audit.log"));
        assert_eq!(config.port, 9090);
    }

    #[test]
    fn test_rejects_malformed_values() {
        let err = GatewayConfig::from_lookup(lookup_from(&[("GATEWAY_ALLOW_WRITE_TOOLS", "maybe")]))
            .unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));

        let err = GatewayConfig::from_lookup(lookup_from(&[("GATEWAY_HTTP_TIMEOUT_SECS", "0")]))
            .unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));

        for huge in ["1e30", "1e300"] {
            let err =
                GatewayConfig::from_lookup(lookup_from(&[("GATEWAY_HTTP_TIMEOUT_SECS", huge)]))
                    .unwrap_err();
            assert!(matches!(err, GatewayError::Config(ref m) if m.contains("out of range")));
        }

        let err = GatewayConfig::from_lookup(lookup_from(&[("PORT", "http")])).unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));
    }
}
