//! Configuration loading and resolution.

use std::path::PathBuf;

use feed_enricher::{default_cache_dir, EnricherConfig};

/// Environment variable overriding the cache directory.
pub const CACHE_DIR_ENV: &str = "FEED_ENRICHER_CACHE_DIR";

/// Resolve the durable cache directory: explicit flag, then
/// `FEED_ENRICHER_CACHE_DIR`, then `~/.feed-enricher/cache`.
pub fn resolve_cache_dir(explicit: Option<&str>) -> PathBuf {
    resolve_cache_dir_from(explicit, std::env::var(CACHE_DIR_ENV).ok())
}

fn resolve_cache_dir_from(explicit: Option<&str>, env_dir: Option<String>) -> PathBuf {
    if let Some(dir) = explicit {
        return PathBuf::from(dir);
    }

    if let Some(dir) = env_dir.filter(|d| !d.trim().is_empty()) {
        return PathBuf::from(dir);
    }

    default_cache_dir()
}

/// Library configuration from the environment.
pub fn load_enricher_config() -> EnricherConfig {
    let config = EnricherConfig::from_env();
    tracing::debug!(
        endpoint = %config.endpoint,
        debounce_ms = config.debounce.as_millis() as u64,
        cache_key = %config.cache_key,
        "loaded enricher config"
    );
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_wins_over_env() {
        let dir = resolve_cache_dir_from(Some("/tmp/flag"), Some("/tmp/env".into()));
        assert_eq!(dir, PathBuf::from("/tmp/flag"));
    }

    #[test]
    fn test_env_then_home_default() {
        let dir = resolve_cache_dir_from(None, Some("/tmp/env".into()));
        assert_eq!(dir, PathBuf::from("/tmp/env"));

        let dir = resolve_cache_dir_from(None, Some("".into()));
        assert_eq!(dir, default_cache_dir());
        assert!(dir.ends_with(".feed-enricher/cache"));
    }
}
