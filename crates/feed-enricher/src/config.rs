//! Enricher configuration.

use std::time::Duration;

use crate::cache::DEFAULT_CACHE_KEY;
use crate::inject::CONTAINER_SEARCH_LIMIT;

/// Endpoint fragment identifying feed responses.
pub const DEFAULT_ENDPOINT: &str = "/feed/firehose";

/// Quiet window before a scheduled run fires.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);

/// Runtime knobs for an [`Enricher`](crate::Enricher).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnricherConfig {
    /// Substring a response URL must contain to be captured.
    pub endpoint: String,
    pub debounce: Duration,
    /// Durable cache key for the last payload.
    pub cache_key: String,
    /// Elements inspected when looking for an entry's card.
    pub ancestor_limit: usize,
}

impl Default for EnricherConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            debounce: DEFAULT_DEBOUNCE,
            cache_key: DEFAULT_CACHE_KEY.to_string(),
            ancestor_limit: CONTAINER_SEARCH_LIMIT,
        }
    }
}

impl EnricherConfig {
    /// Defaults overridden by `FEED_ENRICHER_ENDPOINT`,
    /// `FEED_ENRICHER_DEBOUNCE_MS` and `FEED_ENRICHER_CACHE_KEY`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) but reading variables through `lookup`.
    /// Empty and unparsable values are ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(endpoint) = get("FEED_ENRICHER_ENDPOINT") {
            config.endpoint = endpoint;
        }
        if let Some(ms) = get("FEED_ENRICHER_DEBOUNCE_MS") {
            match ms.trim().parse::<u64>() {
                Ok(ms) => config.debounce = Duration::from_millis(ms),
                Err(_) => tracing::warn!(value = %ms, "ignoring invalid FEED_ENRICHER_DEBOUNCE_MS"),
            }
        }
        if let Some(key) = get("FEED_ENRICHER_CACHE_KEY") {
            config.cache_key = key;
        }
        config
    }
}
