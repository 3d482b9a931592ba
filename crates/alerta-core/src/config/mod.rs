//! Remote store configuration.
//!
//! `StoreConfig` carries the public Supabase endpoint and anon key the client
//! needs to read, insert and watch reports. The anon key is safe to ship; it
//! is still redacted from debug output.

use std::fmt;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::util::{is_http_url, normalize_text_option, websocket_base_url};

pub const DEFAULT_REPORTS_TABLE: &str = "reportes";
pub const DEFAULT_SCHEMA: &str = "public";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_HEARTBEAT_SECS: u64 = 25;
const DEFAULT_REOPEN_DELAY_MS: u64 = 2_000;
const REALTIME_PROTOCOL_VERSION: &str = "1.0.0";

/// Validated connection settings for the report store.
#[derive(Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Project URL, e.g. `https://project.supabase.co`, without trailing slash
    pub supabase_url: String,
    pub anon_key: String,
    pub reports_table: String,
    pub schema: String,
    /// Upper bound for a single REST call or realtime join
    pub request_timeout: Duration,
    pub heartbeat_interval: Duration,
    /// Fixed pause between attempts to re-open a dropped change channel
    pub reopen_delay: Duration,
}

impl StoreConfig {
    /// Build a config with default table, schema and timings.
    pub fn new(supabase_url: impl AsRef<str>, anon_key: impl Into<String>) -> Result<Self> {
        let supabase_url = normalize_supabase_url(supabase_url.as_ref())?;
        let anon_key = normalize_text_option(Some(anon_key.into()))
            .ok_or_else(|| Error::Config("Supabase anon key must not be empty".to_string()))?;

        Ok(Self {
            supabase_url,
            anon_key,
            reports_table: DEFAULT_REPORTS_TABLE.to_string(),
            schema: DEFAULT_SCHEMA.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_SECS),
            reopen_delay: Duration::from_millis(DEFAULT_REOPEN_DELAY_MS),
        })
    }

    /// Use a different reports table; blank values keep the current one.
    #[must_use]
    pub fn with_reports_table(mut self, table: Option<String>) -> Self {
        if let Some(table) = normalize_text_option(table) {
            self.reports_table = table;
        }
        self
    }

    /// Resolve the config from optional URL/key pairs.
    ///
    /// Both missing means the store is not configured (`Ok(None)`); exactly
    /// one present is a configuration error.
    pub fn resolve_optional(
        supabase_url: Option<String>,
        anon_key: Option<String>,
    ) -> Result<Option<Self>> {
        match (
            normalize_text_option(supabase_url),
            normalize_text_option(anon_key),
        ) {
            (None, None) => Ok(None),
            (Some(url), Some(key)) => Self::new(url, key).map(Some),
            (Some(_), None) => Err(Error::Config(
                "Supabase anon key is missing for the configured URL".to_string(),
            )),
            (None, Some(_)) => Err(Error::Config(
                "Supabase URL is missing for the configured anon key".to_string(),
            )),
        }
    }

    /// PostgREST endpoint for the reports table.
    pub fn rest_endpoint(&self) -> String {
        format!(
            "{}/rest/v1/{}",
            self.supabase_url,
            urlencoding::encode(&self.reports_table)
        )
    }

    /// Realtime websocket endpoint, including the key and protocol version.
    pub fn realtime_endpoint(&self) -> Result<String> {
        let base = websocket_base_url(&self.supabase_url).ok_or_else(|| {
            Error::Config("Supabase URL must include http:// or https://".to_string())
        })?;
        Ok(format!(
            "{base}/realtime/v1/websocket?apikey={}&vsn={REALTIME_PROTOCOL_VERSION}",
            urlencoding::encode(&self.anon_key)
        ))
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("StoreConfig")
            .field("supabase_url", &self.supabase_url)
            .field("anon_key", &"[REDACTED]")
            .field("reports_table", &self.reports_table)
            .field("schema", &self.schema)
            .field("request_timeout", &self.request_timeout)
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("reopen_delay", &self.reopen_delay)
            .finish()
    }
}

/// Trim, require an HTTP scheme, and strip trailing slashes and `/rest/v1`.
pub fn normalize_supabase_url(url: &str) -> Result<String> {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(Error::Config("Supabase URL must not be empty".to_string()));
    }
    if !is_http_url(trimmed) {
        return Err(Error::Config(
            "Supabase URL must include http:// or https://".to_string(),
        ));
    }
    Ok(trimmed
        .strip_suffix("/rest/v1")
        .unwrap_or(trimmed)
        .to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_supabase_url_strips_rest_path() {
        assert_eq!(
            normalize_supabase_url(" https://demo.supabase.co/rest/v1/ ").unwrap(),
            "https://demo.supabase.co"
        );
        assert!(normalize_supabase_url("demo.supabase.co").is_err());
        assert!(normalize_supabase_url("   ").is_err());
    }

    #[test]
    fn endpoints_derive_from_project_url() {
        let config = StoreConfig::new("https://demo.supabase.co/", "anon key").unwrap();
        assert_eq!(
            config.rest_endpoint(),
            "https://demo.supabase.co/rest/v1/reportes"
        );
        assert_eq!(
            config.realtime_endpoint().unwrap(),
            "wss://demo.supabase.co/realtime/v1/websocket?apikey=anon%20key&vsn=1.0.0"
        );
    }

    #[test]
    fn resolve_optional_requires_both_values() {
        assert!(StoreConfig::resolve_optional(None, None).unwrap().is_none());
        assert!(StoreConfig::resolve_optional(Some(" ".to_string()), None)
            .unwrap()
            .is_none());
        assert!(
            StoreConfig::resolve_optional(Some("https://demo.supabase.co".to_string()), None)
                .is_err()
        );
        assert!(StoreConfig::resolve_optional(None, Some("anon".to_string())).is_err());
    }

    #[test]
    fn with_reports_table_ignores_blank() {
        let config = StoreConfig::new("https://demo.supabase.co", "anon")
            .unwrap()
            .with_reports_table(Some("  ".to_string()));
        assert_eq!(config.reports_table, "reportes");

        let config = config.with_reports_table(Some("incidents".to_string()));
        assert_eq!(
            config.rest_endpoint(),
            "https://demo.supabase.co/rest/v1/incidents"
        );
    }

    #[test]
    fn debug_redacts_anon_key() {
        let config = StoreConfig::new("https://demo.supabase.co", "secret-anon").unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("secret-anon"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn new_uses_default_timings() {
        let config = StoreConfig::new("https://demo.supabase.co", " anon ").unwrap();
        assert_eq!(config.anon_key, "anon");
        assert_eq!(config.schema, "public");
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(25));
        assert_eq!(config.reopen_delay, Duration::from_millis(2_000));
        assert!(StoreConfig::new("https://demo.supabase.co", "  ").is_err());
    }
}
