use std::path::Path;
use std::time::Duration;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Resolver configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Retries after a transient metadata failure
    pub max_retries: u32,
    /// Delay before the first retry, doubled on every further attempt
    pub retry_backoff_ms: u64,
    /// Timeout for a single metadata request
    pub fetch_timeout_ms: u64,
    /// Maximum number of concurrent metadata prefetches
    pub prefetch_concurrency: usize,
    /// Consider pre-releases even when final releases match
    pub allow_prereleases: bool,
    /// Upper bound on the number of decisions in one run
    pub max_rounds: usize,
    /// Integrity verification settings
    pub verify: VerifyConfig,
}

/// Integrity verification settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyConfig {
    /// Require a matching digest for every algorithm the lock records, not just one
    pub require_all_algorithms: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_backoff_ms: 100,
            fetch_timeout_ms: 30_000,
            prefetch_concurrency: 8,
            allow_prereleases: false,
            max_rounds: 200_000,
            verify: VerifyConfig::default(),
        }
    }
}

impl ResolverConfig {
    /// Parse a JSON configuration; missing fields keep their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Apply `PYX_*` overrides from the process environment
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// Unparsable values are logged and ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(value) = lookup("PYX_MAX_RETRIES") {
            match value.trim().parse() {
                Ok(retries) => self.max_retries = retries,
                Err(_) => warn!("Ignoring invalid PYX_MAX_RETRIES value \"{}\"", value),
            }
        }

        if let Some(value) = lookup("PYX_FETCH_TIMEOUT_MS") {
            match value.trim().parse() {
                Ok(timeout) => self.fetch_timeout_ms = timeout,
                Err(_) => warn!("Ignoring invalid PYX_FETCH_TIMEOUT_MS value \"{}\"", value),
            }
        }

        if let Some(value) = lookup("PYX_ALLOW_PRERELEASES") {
            match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.allow_prereleases = true,
                "0" | "false" | "no" | "off" => self.allow_prereleases = false,
                _ => warn!("Ignoring invalid PYX_ALLOW_PRERELEASES value \"{}\"", value),
            }
        }

        self
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = ResolverConfig::default();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.fetch_timeout(), Duration::from_secs(30));
        assert!(!config.allow_prereleases);
        assert!(!config.verify.require_all_algorithms);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = ResolverConfig::from_json(r#"{"max_retries": 7, "verify": {"require_all_algorithms": true}}"#).unwrap();
        assert_eq!(config.max_retries, 7);
        assert_eq!(config.retry_backoff_ms, 100);
        assert_eq!(config.prefetch_concurrency, 8);
        assert!(config.verify.require_all_algorithms);
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            ResolverConfig::from_json(r#"{"max_retries": "many"}"#),
            Err(crate::Error::Json(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pyx.json");
        std::fs::write(&path, r#"{"allow_prereleases": true}"#).unwrap();

        let config = ResolverConfig::load(&path).unwrap();
        assert!(config.allow_prereleases);
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("PYX_MAX_RETRIES", "5"),
            ("PYX_FETCH_TIMEOUT_MS", "250"),
            ("PYX_ALLOW_PRERELEASES", "yes"),
        ]
        .into_iter()
        .collect();

        let config = ResolverConfig::default().with_overrides(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.fetch_timeout_ms, 250);
        assert!(config.allow_prereleases);
    }

    #[test]
    fn test_invalid_overrides_are_ignored() {
        let config = ResolverConfig::default().with_overrides(|key| match key {
            "PYX_MAX_RETRIES" => Some("lots".to_string()),
            "PYX_ALLOW_PRERELEASES" => Some("maybe".to_string()),
            _ => None,
        });
        assert_eq!(config, ResolverConfig::default());
    }
}
