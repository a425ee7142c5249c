//! `cache show` / `cache clear`.

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;

use feed_enricher::index::normalize_items;
use feed_enricher::{CacheRecord, DurableCache, PayloadBody};

/// Summary of the cached payload.
#[derive(Debug, Serialize)]
pub struct CacheSummary {
    pub key: String,
    pub url: String,
    pub captured_at: Option<DateTime<Utc>>,
    /// Body shape, e.g. `object` or `raw`.
    pub body: &'static str,
    /// Items in the normalized list, if one was found.
    pub items: Option<usize>,
}

impl CacheSummary {
    pub fn from_record(key: &str, record: &CacheRecord) -> Self {
        let body = PayloadBody::from_cache_value(record.payload.clone());
        Self {
            key: key.to_string(),
            url: record.url.clone(),
            captured_at: DateTime::<Utc>::from_timestamp_millis(record.timestamp),
            body: body.kind(),
            items: normalize_items(&body).map(<[_]>::len),
        }
    }

    pub fn render(&self, json: bool) -> anyhow::Result<String> {
        if json {
            return Ok(serde_json::to_string_pretty(self)?);
        }
        let captured = self
            .captured_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "unknown".to_string());
        let items = self
            .items
            .map(|n| n.to_string())
            .unwrap_or_else(|| "no item list".to_string());
        Ok(format!(
            "Key:      {}\nURL:      {}\nCaptured: {}\nBody:     {}\nItems:    {}",
            self.key, self.url, captured, self.body, items
        ))
    }
}

/// Read the cached payload under `key`.
pub fn show(cache: &dyn DurableCache, key: &str) -> anyhow::Result<Option<CacheSummary>> {
    let record = cache
        .get(key)
        .with_context(|| format!("failed to read cache entry {key}"))?;
    Ok(record.map(|r| CacheSummary::from_record(key, &r)))
}

/// Delete the cached payload under `key`.
pub fn clear(cache: &dyn DurableCache, key: &str) -> anyhow::Result<()> {
    cache
        .remove(key)
        .with_context(|| format!("failed to remove cache entry {key}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use feed_enricher::{MemoryCache, DEFAULT_CACHE_KEY};
    use serde_json::json;

    #[test]
    fn test_show_and_clear() {
        let cache = MemoryCache::new();
        assert!(show(&cache, DEFAULT_CACHE_KEY).unwrap().is_none());

        cache
            .set(
                DEFAULT_CACHE_KEY,
                &CacheRecord {
                    timestamp: 1_760_000_000_000,
                    url: "https://wm.test/feed/firehose".into(),
                    payload: json!({"data": [{"id": 1}, {"id": 2}]}),
                },
            )
            .unwrap();

        let summary = show(&cache, DEFAULT_CACHE_KEY).unwrap().unwrap();
        assert_eq!(summary.items, Some(2));
        assert_eq!(summary.body, "object");
        assert!(summary.render(false).unwrap().contains("Items:    2"));

        clear(&cache, DEFAULT_CACHE_KEY).unwrap();
        assert!(show(&cache, DEFAULT_CACHE_KEY).unwrap().is_none());
    }

    #[test]
    fn test_raw_payload_summary() {
        let record = CacheRecord {
            timestamp: 0,
            url: "https://wm.test/feed/firehose".into(),
            payload: json!("<html>oops</html>"),
        };
        let summary = CacheSummary::from_record("k", &record);
        assert_eq!(summary.body, "raw");
        assert!(summary.items.is_none());
    }
}
