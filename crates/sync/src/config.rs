//! Runtime configuration, read from the environment.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use ledgerline_core::sync::{
    DEFAULT_MAX_SYNC_ATTEMPTS, ONLINE_PROBE_INTERVAL_SECS, PROBE_TIMEOUT_MS, REQUEST_TIMEOUT_SECS,
    SERVER_DOWN_PROBE_INTERVAL_SECS,
};

use crate::error::{Result, SyncError};

pub const ENV_API_URL: &str = "LEDGERLINE_API_URL";
pub const ENV_ACCESS_TOKEN: &str = "LEDGERLINE_ACCESS_TOKEN";
pub const ENV_OWNER_ID: &str = "LEDGERLINE_OWNER_ID";
pub const ENV_HEALTH_PATH: &str = "LEDGERLINE_HEALTH_PATH";
pub const ENV_PROBE_INTERVAL_SECS: &str = "LEDGERLINE_PROBE_INTERVAL_SECS";
pub const ENV_SERVER_DOWN_PROBE_INTERVAL_SECS: &str = "LEDGERLINE_SERVER_DOWN_PROBE_INTERVAL_SECS";
pub const ENV_PROBE_TIMEOUT_MS: &str = "LEDGERLINE_PROBE_TIMEOUT_MS";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "LEDGERLINE_REQUEST_TIMEOUT_SECS";
pub const ENV_MAX_SYNC_ATTEMPTS: &str = "LEDGERLINE_MAX_SYNC_ATTEMPTS";

const DEFAULT_HEALTH_PATH: &str = "/health";
const DEFAULT_OWNER_ID: &str = "local";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    /// Base URL of the remote ledger, without trailing slash.
    pub api_url: String,
    pub access_token: Option<String>,
    /// Owner stamped on queued operations and cached records.
    pub owner_id: String,
    pub health_path: String,
    pub probe_interval_secs: u64,
    pub server_down_probe_interval_secs: u64,
    pub probe_timeout_ms: u64,
    pub request_timeout_secs: u64,
    pub max_sync_attempts: i32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            access_token: None,
            owner_id: DEFAULT_OWNER_ID.to_string(),
            health_path: DEFAULT_HEALTH_PATH.to_string(),
            probe_interval_secs: ONLINE_PROBE_INTERVAL_SECS,
            server_down_probe_interval_secs: SERVER_DOWN_PROBE_INTERVAL_SECS,
            probe_timeout_ms: PROBE_TIMEOUT_MS,
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
            max_sync_attempts: DEFAULT_MAX_SYNC_ATTEMPTS,
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();

        let api_url = read(ENV_API_URL)
            .map(|url| url.trim_end_matches('/').to_string())
            .ok_or_else(|| {
                SyncError::invalid_request(format!(
                    "{} not configured. Remote sync is disabled.",
                    ENV_API_URL
                ))
            })?;

        let max_sync_attempts: i32 =
            parse_or(read(ENV_MAX_SYNC_ATTEMPTS), ENV_MAX_SYNC_ATTEMPTS, defaults.max_sync_attempts)?;
        if max_sync_attempts < 1 {
            return Err(SyncError::invalid_request(format!(
                "{} must be at least 1",
                ENV_MAX_SYNC_ATTEMPTS
            )));
        }

        let mut health_path = read(ENV_HEALTH_PATH).unwrap_or(defaults.health_path);
        if !health_path.starts_with('/') {
            health_path.insert(0, '/');
        }

        Ok(Self {
            api_url,
            access_token: read(ENV_ACCESS_TOKEN),
            owner_id: read(ENV_OWNER_ID).unwrap_or(defaults.owner_id),
            health_path,
            probe_interval_secs: parse_or(
                read(ENV_PROBE_INTERVAL_SECS),
                ENV_PROBE_INTERVAL_SECS,
                defaults.probe_interval_secs,
            )?,
            server_down_probe_interval_secs: parse_or(
                read(ENV_SERVER_DOWN_PROBE_INTERVAL_SECS),
                ENV_SERVER_DOWN_PROBE_INTERVAL_SECS,
                defaults.server_down_probe_interval_secs,
            )?,
            probe_timeout_ms: parse_or(
                read(ENV_PROBE_TIMEOUT_MS),
                ENV_PROBE_TIMEOUT_MS,
                defaults.probe_timeout_ms,
            )?,
            request_timeout_secs: parse_or(
                read(ENV_REQUEST_TIMEOUT_SECS),
                ENV_REQUEST_TIMEOUT_SECS,
                defaults.request_timeout_secs,
            )?,
            max_sync_attempts,
        })
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub fn server_down_probe_interval(&self) -> Duration {
        Duration::from_secs(self.server_down_probe_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| SyncError::invalid_request(format!("Invalid {} '{}': {}", key, raw, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_url_is_set() {
        let config = SyncConfig::from_lookup(lookup(&[(ENV_API_URL, "https://ledger.test/")]))
            .expect("config");

        assert_eq!(config.api_url, "https://ledger.test");
        assert_eq!(config.health_path, "/health");
        assert_eq!(config.probe_interval(), Duration::from_secs(10));
        assert_eq!(config.server_down_probe_interval(), Duration::from_secs(3));
        assert_eq!(config.probe_timeout(), Duration::from_millis(3000));
        assert_eq!(config.max_sync_attempts, 1);
        assert!(config.access_token.is_none());
    }

    #[test]
    fn missing_url_disables_remote_sync() {
        let err = SyncConfig::from_lookup(lookup(&[(ENV_API_URL, "  ")])).unwrap_err();
        assert!(err.to_string().contains(ENV_API_URL));
    }

    #[test]
    fn overrides_are_parsed_and_validated() {
        let config = SyncConfig::from_lookup(lookup(&[
            (ENV_API_URL, "http://localhost:5000"),
            (ENV_HEALTH_PATH, "api/ping"),
            (ENV_PROBE_TIMEOUT_MS, "750"),
            (ENV_MAX_SYNC_ATTEMPTS, "3"),
            (ENV_ACCESS_TOKEN, "secret"),
        ]))
        .expect("config");
        assert_eq!(config.health_path, "/api/ping");
        assert_eq!(config.probe_timeout_ms, 750);
        assert_eq!(config.max_sync_attempts, 3);
        assert_eq!(config.access_token.as_deref(), Some("secret"));

        assert!(SyncConfig::from_lookup(lookup(&[
            (ENV_API_URL, "http://localhost:5000"),
            (ENV_PROBE_INTERVAL_SECS, "soon"),
        ]))
        .is_err());
        assert!(SyncConfig::from_lookup(lookup(&[
            (ENV_API_URL, "http://localhost:5000"),
            (ENV_MAX_SYNC_ATTEMPTS, "0"),
        ]))
        .is_err());
    }
}
