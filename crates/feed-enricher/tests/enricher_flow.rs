//! End-to-end tests: capture through the transport, debounce, annotate.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use feed_enricher::inject::ANNOTATION_CLASS;
use feed_enricher::*;

// ─────────────────────── helpers ───────────────────────

const PAGE: &str = r#"<html><body>
  <ul>
    <li class="list-item"><a href="/work/500123">Install shelving</a><span>Denver</span></li>
    <li class="list-item"><a href="/work/500124">Replace POS terminal</a></li>
  </ul>
  <nav><a href="/feed?page=2">Next</a></nav>
</body></html>"#;

#[derive(Default)]
struct RecordingStatus {
    updates: Mutex<Vec<StatusSnapshot>>,
    visible: Mutex<Option<bool>>,
}

impl StatusDisplay for RecordingStatus {
    fn update(&self, snapshot: &StatusSnapshot) {
        self.updates.lock().unwrap().push(snapshot.clone());
    }
    fn set_visible(&self, visible: bool) {
        *self.visible.lock().unwrap() = Some(visible);
    }
}

impl RecordingStatus {
    fn runs(&self) -> usize {
        self.updates.lock().unwrap().len()
    }
}

fn page() -> Document {
    Document::parse(PAGE).with_base_url(url::Url::parse("https://wm.test/").unwrap())
}

fn fast_config() -> EnricherConfig {
    EnricherConfig {
        debounce: Duration::from_millis(20),
        ..EnricherConfig::default()
    }
}

async fn annotation_texts<T>(enricher: &Enricher<T>) -> Vec<String> {
    let doc = enricher.document();
    let doc = doc.lock().await;
    doc.elements()
        .filter(|&id| doc.has_class(id, ANNOTATION_CLASS))
        .map(|id| doc.text_content(id))
        .collect()
}

async fn wait_for_report<T>(enricher: &Enricher<T>) -> RunReport {
    let mut stats = enricher.stats();
    let report = tokio::time::timeout(Duration::from_secs(5), stats.wait_for(|r| r.is_some()))
        .await
        .expect("a run within five seconds")
        .unwrap()
        .clone();
    report.unwrap()
}

fn seeded_cache(dir: &tempfile::TempDir) -> Arc<FileCache> {
    let cache = FileCache::new(dir.path()).unwrap();
    cache
        .set(
            DEFAULT_CACHE_KEY,
            &CacheRecord {
                timestamp: 1_760_000_000_000,
                url: "https://wm.test/feed/firehose?page=1".into(),
                payload: json!({"results": [
                    {"id": 9, "workNumber": "500123", "companyName": "Acme", "spendLimit": 250}
                ]}),
            },
        )
        .unwrap();
    Arc::new(cache)
}

// ─────────────────────── capture ───────────────────────

#[tokio::test]
async fn test_captured_feed_response_annotates_page() {
    let server = MockServer::start().await;
    let body = json!({"items": [
        {"id": "1", "workNumber": "500123", "companyName": "Acme"},
        {"id": "2", "workNumber": "500124", "assignToFirstResource": true}
    ]});
    Mock::given(method("GET"))
        .and(path("/feed/firehose"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body.clone()))
        .mount(&server)
        .await;

    let enricher = Enricher::start(
        page(),
        ReqwestTransport::new(5000),
        Arc::new(MemoryCache::new()),
        fast_config(),
    );

    let url = format!("{}/feed/firehose?page=1", server.uri());
    let response = enricher
        .transport()
        .fetch(HttpRequest::get(url.clone()))
        .await
        .unwrap();
    // The caller sees the untouched response.
    assert_eq!(response.status, 200);
    assert_eq!(serde_json::from_str::<serde_json::Value>(&response.body).unwrap(), body);

    let report = wait_for_report(&enricher).await;
    assert_eq!(report.anchors, 2);
    assert_eq!(report.indexed, 2);
    assert_eq!(report.injected, 2);
    assert_eq!(enricher.last_url(), Some(url));

    let texts = annotation_texts(&enricher).await;
    assert!(texts[0].contains("Work order: 500123"));
    assert!(texts[0].contains("Company name: Acme"));
    assert!(texts[1].contains("(assignToFirstResource:true)"));
}

#[tokio::test]
async fn test_failed_response_keeps_previous_payload() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed/firehose"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"workNumber": "500123"}])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/feed/firehose/next"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .mount(&server)
        .await;

    let cache = Arc::new(MemoryCache::new());
    let enricher = Enricher::start(page(), ReqwestTransport::new(5000), cache.clone(), fast_config());
    let transport = enricher.transport();

    let good = format!("{}/feed/firehose", server.uri());
    transport.fetch(HttpRequest::get(good.clone())).await.unwrap();
    let failed = transport
        .fetch(HttpRequest::get(format!("{}/feed/firehose/next", server.uri())))
        .await
        .unwrap();

    assert_eq!(failed.status, 503);
    assert_eq!(failed.body, "busy");
    assert_eq!(enricher.last_url(), Some(good.clone()));
    assert_eq!(cache.get(DEFAULT_CACHE_KEY).unwrap().unwrap().url, good);
}

#[tokio::test]
async fn test_unrelated_responses_are_not_captured() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/profile"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"workNumber": "500123"}])))
        .mount(&server)
        .await;

    let enricher = Enricher::start(
        page(),
        ReqwestTransport::new(5000),
        Arc::new(MemoryCache::new()),
        fast_config(),
    );
    enricher
        .transport()
        .fetch(HttpRequest::get(format!("{}/api/profile", server.uri())))
        .await
        .unwrap();

    assert!(enricher.last_payload().is_none());
}

// ─────────────────────── triggers ───────────────────────

#[tokio::test(start_paused = true)]
async fn test_hydrated_payload_runs_on_document_ready() {
    let dir = tempfile::tempdir().unwrap();
    let status = Arc::new(RecordingStatus::default());
    let enricher = Enricher::start_with_status(
        page(),
        ReqwestTransport::new(1000),
        seeded_cache(&dir),
        EnricherConfig::default(),
        status.clone(),
    );

    assert_eq!(
        enricher.last_url().as_deref(),
        Some("https://wm.test/feed/firehose?page=1")
    );
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(status.runs(), 0);

    enricher.document_ready().unwrap();
    let report = wait_for_report(&enricher).await;
    assert_eq!(report.injected, 1);
    assert_eq!(report.unmatched, 1);

    let texts = annotation_texts(&enricher).await;
    assert_eq!(texts.len(), 1);
    assert!(texts[0].contains("Spend limit: 250"));
}

#[tokio::test(start_paused = true)]
async fn test_clicks_and_navigation_schedule_runs() {
    let dir = tempfile::tempdir().unwrap();
    let status = Arc::new(RecordingStatus::default());
    let enricher = Enricher::start_with_status(
        page(),
        ReqwestTransport::new(1000),
        seeded_cache(&dir),
        EnricherConfig::default(),
        status.clone(),
    );

    assert!(!enricher
        .clicked(Some("https://wm.test/work/500123"), "Install shelving")
        .unwrap());
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(status.runs(), 0);

    assert!(enricher.clicked(Some("/feed?page=2"), "Next").unwrap());
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(status.runs(), 1);

    enricher.navigated(NavigationKind::Push).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    enricher.navigated(NavigationKind::Pop).unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(status.runs(), 2);

    // The follow-up run found the block already in place.
    let last = enricher.last_report().unwrap();
    assert_eq!(last.injected, 0);
    assert_eq!(last.already_annotated, 1);
    assert_eq!(annotation_texts(&enricher).await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_debug_surface() {
    let status = Arc::new(RecordingStatus::default());
    let enricher = Enricher::start_with_status(
        page(),
        ReqwestTransport::new(1000),
        Arc::new(MemoryCache::new()),
        EnricherConfig::default(),
        status.clone(),
    );

    assert!(enricher.last_url().is_none());
    assert!(enricher.last_payload().is_none());

    let report = enricher.run_now().await.unwrap();
    assert_eq!(report, RunReport::default());

    enricher.hide_status();
    assert_eq!(*status.visible.lock().unwrap(), Some(false));
    enricher.show_status();
    assert_eq!(*status.visible.lock().unwrap(), Some(true));
    assert_eq!(status.updates.lock().unwrap().last().unwrap().source_label(), "none");

    enricher.shutdown();
    assert!(enricher.run_now().await.is_err());
}
