//! Connection and query settings.
//!
//! Values come from `DONORDESK_*` environment variables (a `.env` file is
//! loaded first when present) and fall back to the dashboard defaults.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid origin '{0}': {1}")]
    InvalidOrigin(String, String),
    #[error("unsupported origin scheme '{0}' (expected http or https)")]
    UnsupportedScheme(String),
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Page origin the dashboard is served from, e.g. `https://admin.example.org`.
    pub origin: String,
    #[serde(default = "default_api_base_path")]
    pub api_base_path: String,
    #[serde(default = "default_ws_path")]
    pub ws_path: String,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_session_file")]
    pub session_file: PathBuf,
}

fn default_api_base_path() -> String { "/api".to_string() }
fn default_ws_path() -> String { "/ws".to_string() }
fn default_reconnect_delay_ms() -> u64 { 3_000 }
fn default_debounce_ms() -> u64 { 500 }
fn default_page_size() -> usize { 50 }
fn default_request_timeout_ms() -> u64 { 30_000 }

fn default_session_file() -> PathBuf {
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".donordesk").join("session");
    }
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".donordesk").join("session");
    }
    PathBuf::from(".donordesk").join("session")
}

impl SyncConfig {
    /// Config with defaults for everything but the origin.
    pub fn new(origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            api_base_path: default_api_base_path(),
            ws_path: default_ws_path(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            debounce_ms: default_debounce_ms(),
            page_size: default_page_size(),
            request_timeout_ms: default_request_timeout_ms(),
            session_file: default_session_file(),
        }
    }

    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let origin =
            get("DONORDESK_ORIGIN").unwrap_or_else(|| "http://localhost:8000".to_string());
        let mut config = Self::new(origin);

        if let Some(path) = get("DONORDESK_API_BASE_PATH") {
            config.api_base_path = path;
        }
        if let Some(path) = get("DONORDESK_WS_PATH") {
            config.ws_path = path;
        }
        if let Some(raw) = get("DONORDESK_RECONNECT_DELAY_MS") {
            config.reconnect_delay_ms = parse_number("DONORDESK_RECONNECT_DELAY_MS", &raw)?;
        }
        if let Some(raw) = get("DONORDESK_DEBOUNCE_MS") {
            config.debounce_ms = parse_number("DONORDESK_DEBOUNCE_MS", &raw)?;
        }
        if let Some(raw) = get("DONORDESK_PAGE_SIZE") {
            config.page_size = parse_number("DONORDESK_PAGE_SIZE", &raw)?;
        }
        if let Some(raw) = get("DONORDESK_REQUEST_TIMEOUT_MS") {
            config.request_timeout_ms = parse_number("DONORDESK_REQUEST_TIMEOUT_MS", &raw)?;
        }
        if let Some(path) = get("DONORDESK_SESSION_FILE") {
            config.session_file = PathBuf::from(path);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.origin_url()?;
        if self.page_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "page_size",
                message: "must be greater than 0".to_string(),
            });
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "request_timeout_ms",
                message: "must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    fn origin_url(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(self.origin.trim())
            .map_err(|e| ConfigError::InvalidOrigin(self.origin.clone(), e.to_string()))?;
        match url.scheme() {
            "http" | "https" => {}
            other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
        }
        if url.host_str().is_none() {
            return Err(ConfigError::InvalidOrigin(
                self.origin.clone(),
                "missing host".to_string(),
            ));
        }
        Ok(url)
    }

    /// WebSocket endpoint: `ws` for an `http` origin, `wss` for `https`,
    /// same host and port.
    pub fn ws_url(&self) -> Result<String, ConfigError> {
        let origin = self.origin_url()?;
        let scheme = if origin.scheme() == "https" { "wss" } else { "ws" };
        // `Host` displays IPv6 literals in brackets.
        let host = origin
            .host()
            .map(|host| host.to_string())
            .unwrap_or_default();
        let authority = match origin.port() {
            Some(port) => format!("{host}:{port}"),
            None => host,
        };
        Ok(format!("{scheme}://{authority}{}", normalize_path(&self.ws_path)))
    }

    /// Absolute REST URL for `path` under the configured base path.
    pub fn api_url(&self, path: &str) -> Result<String, ConfigError> {
        let origin = self.origin_url()?;
        let base = origin.as_str().trim_end_matches('/');
        let prefix = normalize_path(&self.api_base_path);
        let prefix = prefix.trim_end_matches('/');
        Ok(format!("{base}{prefix}{}", normalize_path(path)))
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|e| ConfigError::InvalidValue {
        key,
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn ws_scheme_follows_page_scheme() {
        let plain = SyncConfig::new("http://admin.local:8080");
        assert_eq!(plain.ws_url().unwrap(), "ws://admin.local:8080/ws");

        let secure = SyncConfig::new("https://admin.example.org");
        assert_eq!(secure.ws_url().unwrap(), "wss://admin.example.org/ws");
    }

    #[test]
    fn ws_url_keeps_ipv6_brackets() {
        let config = SyncConfig::new("http://[::1]:8080");
        assert_eq!(config.ws_url().unwrap(), "ws://[::1]:8080/ws");
    }

    #[test]
    fn deserialized_config_fills_defaults() {
        let config: SyncConfig = serde_json::from_value(serde_json::json!({
            "origin": "https://crm.example.org",
            "page_size": 20
        }))
        .unwrap();

        assert_eq!(config.page_size, 20);
        assert_eq!(config.api_base_path, "/api");
        assert_eq!(config.ws_path, "/ws");
        assert_eq!(config.reconnect_delay(), Duration::from_secs(3));
        assert_eq!(config.debounce_window(), Duration::from_millis(500));
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert!(config.session_file.ends_with("session"));
        assert_eq!(config.ws_url().unwrap(), "wss://crm.example.org/ws");
    }

    #[test]
    fn api_url_joins_base_path() {
        let mut config = SyncConfig::new("https://admin.example.org/");
        assert_eq!(
            config.api_url("donations").unwrap(),
            "https://admin.example.org/api/donations"
        );

        config.api_base_path = "v2/".to_string();
        assert_eq!(
            config.api_url("/stats").unwrap(),
            "https://admin.example.org/v2/stats"
        );
    }

    #[test]
    fn rejects_non_http_origin() {
        let config = SyncConfig::new("ftp://files.example.org");
        assert!(matches!(
            config.ws_url(),
            Err(ConfigError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn env_overrides_defaults() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("DONORDESK_ORIGIN", "https://crm.example.org"),
            ("DONORDESK_PAGE_SIZE", "25"),
            ("DONORDESK_DEBOUNCE_MS", " 250 "),
        ]))
        .unwrap();

        assert_eq!(config.origin, "https://crm.example.org");
        assert_eq!(config.page_size, 25);
        assert_eq!(config.debounce_window(), Duration::from_millis(250));
        assert_eq!(config.reconnect_delay(), Duration::from_secs(3));
    }

    #[test]
    fn zero_page_size_is_invalid() {
        let result = SyncConfig::from_lookup(lookup(&[("DONORDESK_PAGE_SIZE", "0")]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { key: "page_size", .. })
        ));
    }

    #[test]
    fn malformed_number_reports_key() {
        let result = SyncConfig::from_lookup(lookup(&[("DONORDESK_RECONNECT_DELAY_MS", "soon")]));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { key: "DONORDESK_RECONNECT_DELAY_MS", .. })
        ));
    }
}
