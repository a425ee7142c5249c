//! `watch`: run the full enricher over a saved page while fetching live URLs.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use feed_enricher::{
    DurableCache, Enricher, EnricherConfig, HttpRequest, ReqwestTransport, RunReport, Transport,
};

/// Extra wait past the debounce window before reading the result.
const SETTLE_MARGIN: Duration = Duration::from_millis(150);

/// Options for [`watch`].
#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub base_url: Option<String>,
    pub urls: Vec<String>,
    pub timeout_ms: u64,
}

/// Outcome of a watch session.
#[derive(Debug)]
pub struct WatchOutcome {
    pub report: RunReport,
    pub html: String,
    /// URLs whose fetch failed outright.
    pub failed_urls: Vec<String>,
}

/// Start an enricher over `html`, route every URL through its transport,
/// signal document-ready and collect the result once the quiet window has
/// passed.
pub async fn watch(
    html: &str,
    options: &WatchOptions,
    cache: Arc<dyn DurableCache>,
    config: EnricherConfig,
) -> anyhow::Result<WatchOutcome> {
    let document = super::load_document(html, options.base_url.as_deref())?;
    let settle = config.debounce + SETTLE_MARGIN;
    let enricher = Enricher::start(
        document,
        ReqwestTransport::new(options.timeout_ms),
        cache,
        config,
    );

    if let Some(url) = enricher.last_url() {
        tracing::info!(%url, "starting from cached payload");
    }

    let transport = enricher.transport();
    let mut failed_urls = Vec::new();
    for url in &options.urls {
        match transport.fetch(HttpRequest::get(url.clone())).await {
            Ok(response) => {
                tracing::info!(%url, status = response.status, bytes = response.body.len(), "fetched");
            }
            Err(e) => {
                tracing::warn!(%url, error = %e, "fetch failed");
                failed_urls.push(url.clone());
            }
        }
    }

    enricher
        .document_ready()
        .context("scheduler stopped before the page was ready")?;
    tokio::time::sleep(settle).await;

    let report = match enricher.last_report() {
        Some(report) => report,
        None => enricher
            .run_now()
            .await
            .context("scheduler stopped before running")?,
    };

    let html = enricher
        .document()
        .lock()
        .await
        .to_html()
        .context("failed to serialize the page")?;
    enricher.shutdown();

    Ok(WatchOutcome {
        report,
        html,
        failed_urls,
    })
}
