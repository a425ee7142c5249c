//! Payload store: most-recent-wins holder of the captured feed payload.
//!
//! Every capture replaces the held payload, is mirrored into the durable
//! cache on a best-effort basis, then fans out to subscribers in
//! registration order.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};

use crate::cache::{CacheRecord, DurableCache};
use crate::types::{CapturedPayload, EnricherResult, PayloadBody};

/// Callback invoked synchronously for every capture.
pub type Subscriber = Arc<dyn Fn(&CapturedPayload) -> EnricherResult<()> + Send + Sync>;

pub struct PayloadStore {
    latest: RwLock<Option<Arc<CapturedPayload>>>,
    cache: Arc<dyn DurableCache>,
    cache_key: String,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl PayloadStore {
    /// Open the store and hydrate it from the durable cache.
    ///
    /// A missing and a corrupt cache entry are treated the same: the store
    /// starts empty.
    pub fn open(cache: Arc<dyn DurableCache>, cache_key: impl Into<String>) -> Self {
        let cache_key = cache_key.into();
        let hydrated = match cache.get(&cache_key) {
            Ok(Some(record)) => {
                tracing::info!(url = %record.url, "hydrated payload from cache");
                Some(Arc::new(from_record(record)))
            }
            Ok(None) => {
                tracing::debug!(key = %cache_key, "no cached payload");
                None
            }
            Err(e) => {
                tracing::warn!(key = %cache_key, error = %e, "ignoring unreadable cached payload");
                None
            }
        };

        Self {
            latest: RwLock::new(hydrated),
            cache,
            cache_key,
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// The payload current at the moment of the call.
    pub fn latest(&self) -> Option<Arc<CapturedPayload>> {
        self.latest
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn last_url(&self) -> Option<String> {
        self.latest().map(|p| p.source_url.clone())
    }

    pub fn cache_key(&self) -> &str {
        &self.cache_key
    }

    /// Register a subscriber. Subscribers run in registration order.
    pub fn subscribe<F>(&self, subscriber: F)
    where
        F: Fn(&CapturedPayload) -> EnricherResult<()> + Send + Sync + 'static,
    {
        self.subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::new(subscriber));
    }

    /// Record a capture: replace the held payload, mirror it to the cache,
    /// notify subscribers.
    pub fn emit(&self, url: &str, body: PayloadBody) -> Arc<CapturedPayload> {
        let payload = Arc::new(CapturedPayload::new(url, body));
        *self.latest.write().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&payload));

        if let Err(e) = self.cache.set(&self.cache_key, &to_record(&payload)) {
            tracing::debug!(error = %e, "durable cache write failed");
        }

        // Snapshot so a subscriber may register further subscribers.
        let subscribers: Vec<Subscriber> = self
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        for (i, subscriber) in subscribers.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| subscriber(&payload))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(subscriber = i, error = %e, "payload subscriber failed"),
                Err(_) => tracing::error!(subscriber = i, "payload subscriber panicked"),
            }
        }

        payload
    }
}

fn to_record(payload: &CapturedPayload) -> CacheRecord {
    CacheRecord {
        timestamp: payload.captured_at.timestamp_millis(),
        url: payload.source_url.clone(),
        payload: payload.body.to_cache_value(),
    }
}

fn from_record(record: CacheRecord) -> CapturedPayload {
    CapturedPayload {
        source_url: record.url,
        body: PayloadBody::from_cache_value(record.payload),
        captured_at: DateTime::<Utc>::from_timestamp_millis(record.timestamp)
            .unwrap_or_else(Utc::now),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{FileCache, MemoryCache, DEFAULT_CACHE_KEY};
    use crate::types::EnricherError;
    use serde_json::json;

    struct BrokenCache;

    impl DurableCache for BrokenCache {
        fn get(&self, _key: &str) -> EnricherResult<Option<CacheRecord>> {
            Err(EnricherError::Cache("disk on fire".into()))
        }
        fn set(&self, _key: &str, _record: &CacheRecord) -> EnricherResult<()> {
            Err(EnricherError::Cache("disk on fire".into()))
        }
        fn remove(&self, _key: &str) -> EnricherResult<()> {
            Err(EnricherError::Cache("disk on fire".into()))
        }
    }

    #[test]
    fn test_emit_replaces_latest_and_caches() {
        let cache = Arc::new(MemoryCache::new());
        let store = PayloadStore::open(cache.clone(), DEFAULT_CACHE_KEY);
        assert!(store.latest().is_none());

        store.emit("https://h/feed/firehose?p=1", PayloadBody::Parsed(json!([1])));
        store.emit("https://h/feed/firehose?p=2", PayloadBody::Parsed(json!([2])));

        let latest = store.latest().unwrap();
        assert_eq!(latest.source_url, "https://h/feed/firehose?p=2");
        assert_eq!(latest.body, PayloadBody::Parsed(json!([2])));

        let cached = cache.get(DEFAULT_CACHE_KEY).unwrap().unwrap();
        assert_eq!(cached.url, "https://h/feed/firehose?p=2");
        assert_eq!(cached.payload, json!([2]));
    }

    #[test]
    fn test_hydrates_from_cache() {
        let cache = Arc::new(MemoryCache::new());
        cache
            .set(
                DEFAULT_CACHE_KEY,
                &CacheRecord {
                    timestamp: 1_700_000_000_000,
                    url: "https://h/feed/firehose".into(),
                    payload: json!({"items": []}),
                },
            )
            .unwrap();

        let store = PayloadStore::open(cache, DEFAULT_CACHE_KEY);
        let latest = store.latest().unwrap();
        assert_eq!(store.last_url().as_deref(), Some("https://h/feed/firehose"));
        assert_eq!(latest.captured_at.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_corrupt_cache_entry_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileCache::new(dir.path()).unwrap();
        std::fs::write(cache.path_for(DEFAULT_CACHE_KEY), b"garbage").unwrap();

        let store = PayloadStore::open(Arc::new(cache), DEFAULT_CACHE_KEY);
        assert!(store.latest().is_none());
    }

    #[test]
    fn test_cache_failures_never_block_subscribers() {
        let store = PayloadStore::open(Arc::new(BrokenCache), DEFAULT_CACHE_KEY);
        let hits = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&hits);
        store.subscribe(move |_| {
            *counter.lock().unwrap() += 1;
            Ok(())
        });

        store.emit("https://h/feed/firehose", PayloadBody::Raw("x".into()));
        assert_eq!(*hits.lock().unwrap(), 1);
        assert!(store.latest().is_some());
    }

    #[test]
    fn test_failing_subscribers_do_not_stop_the_rest() {
        let store = PayloadStore::open(Arc::new(MemoryCache::new()), DEFAULT_CACHE_KEY);
        let order = Arc::new(Mutex::new(Vec::new()));

        let o = Arc::clone(&order);
        store.subscribe(move |_| {
            o.lock().unwrap().push("first");
            Err(EnricherError::Subscriber("boom".into()))
        });
        store.subscribe(|_| panic!("subscriber panic"));
        let o = Arc::clone(&order);
        store.subscribe(move |_| {
            o.lock().unwrap().push("third");
            Ok(())
        });

        store.emit("https://h/feed/firehose", PayloadBody::Parsed(json!([])));
        assert_eq!(*order.lock().unwrap(), vec!["first", "third"]);

        // The store itself is still usable afterwards.
        store.emit("https://h/feed/firehose?2", PayloadBody::Parsed(json!([])));
        assert_eq!(order.lock().unwrap().len(), 4);
    }
}
