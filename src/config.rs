//! Workbench Configuration
//!
//! Defaults suit a backend running locally. Each field can be overridden from
//! the environment (a `.env` file is honoured by the binary).

use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use crate::viewport::DEFAULT_DEBOUNCE;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";

#[derive(Debug, Clone, PartialEq)]
pub struct WorkbenchConfig {
    /// Base URL of the offset backend
    pub api_url: String,
    /// Quiet period before a viewport counts as settled
    pub debounce: Duration,
    /// Freshness window for viewport facility and protected-area queries
    pub cache_ttl: Duration,
    /// Freshness window for the top-polluters card
    pub top_polluters_ttl: Duration,
    /// Where the brief handoff is persisted between views
    pub handoff_file: PathBuf,
    /// Client-side request deadline; `None` leaves it to the transport
    pub request_timeout: Option<Duration>,
}

impl Default for WorkbenchConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            debounce: DEFAULT_DEBOUNCE,
            cache_ttl: Duration::from_secs(60),
            top_polluters_ttl: Duration::from_secs(5 * 60),
            handoff_file: PathBuf::from("handoff.json"),
            request_timeout: None,
        }
    }
}

impl WorkbenchConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unparseable values keep the default.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("OFFSET_API_URL").filter(|u| !u.trim().is_empty()) {
            config.api_url = url.trim().trim_end_matches('/').to_string();
        }
        if let Some(ms) = parse_u64(&lookup, "OFFSET_DEBOUNCE_MS") {
            config.debounce = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_u64(&lookup, "OFFSET_CACHE_TTL_SECS") {
            config.cache_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_u64(&lookup, "OFFSET_TOP_POLLUTERS_TTL_SECS") {
            config.top_polluters_ttl = Duration::from_secs(secs);
        }
        if let Some(path) = lookup("OFFSET_HANDOFF_FILE").filter(|p| !p.trim().is_empty()) {
            config.handoff_file = PathBuf::from(path);
        }
        if let Some(secs) = parse_u64(&lookup, "OFFSET_REQUEST_TIMEOUT_SECS").filter(|s| *s > 0) {
            config.request_timeout = Some(Duration::from_secs(secs));
        }

        config
    }
}

fn parse_u64<F>(lookup: &F, key: &str) -> Option<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring {}={:?}: not a whole number", key, raw);
            None
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
    fn test_defaults() {
        let config = WorkbenchConfig::from_lookup(|_| None);
        assert_eq!(config, WorkbenchConfig::default());
        assert_eq!(config.debounce, Duration::from_millis(400));
        assert_eq!(config.cache_ttl, Duration::from_secs(60));
        assert!(config.request_timeout.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = WorkbenchConfig::from_lookup(lookup(&[
            ("OFFSET_API_URL", "https://offsets.example.org/"),
            ("OFFSET_DEBOUNCE_MS", "250"),
            ("OFFSET_REQUEST_TIMEOUT_SECS", "30"),
            ("OFFSET_HANDOFF_FILE", "/tmp/brief.json"),
        ]));
        assert_eq!(config.api_url, "https://offsets.example.org");
        assert_eq!(config.debounce, Duration::from_millis(250));
        assert_eq!(config.request_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.handoff_file, PathBuf::from("/tmp/brief.json"));
    }

    #[test]
    fn test_bad_values_keep_defaults() {
        let config = WorkbenchConfig::from_lookup(lookup(&[
            ("OFFSET_CACHE_TTL_SECS", "soon"),
            ("OFFSET_REQUEST_TIMEOUT_SECS", "0"),
        ]));
        assert_eq!(config.cache_ttl, Duration::from_secs(60));
        assert!(config.request_timeout.is_none());
    }
}
