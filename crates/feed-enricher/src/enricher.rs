//! Top-level wiring and the debug surface.

use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::cache::DurableCache;
use crate::config::EnricherConfig;
use crate::dom::Document;
use crate::payload::PayloadStore;
use crate::pipeline::PipelineState;
use crate::scheduler::{Scheduler, SchedulerHandle, SharedDocument};
use crate::status::{StatusDisplay, StatusSnapshot, TracingStatus};
use crate::transport::{endpoint_contains, InterceptingTransport};
use crate::triggers::{is_list_navigation_click, NavigationKind, Trigger};
use crate::types::{CapturedPayload, EnricherResult, RunReport};

/// A running enricher attached to one document.
///
/// Responses fetched through [`transport`](Self::transport) whose URL
/// contains the configured endpoint are captured, cached and trigger a
/// debounced pipeline run. Host events feed in through
/// [`document_ready`](Self::document_ready), [`navigated`](Self::navigated)
/// and [`clicked`](Self::clicked); document mutations are observed directly.
pub struct Enricher<T> {
    config: EnricherConfig,
    document: SharedDocument,
    store: Arc<PayloadStore>,
    transport: Arc<InterceptingTransport<T>>,
    status: Arc<dyn StatusDisplay>,
    scheduler: SchedulerHandle,
    task: JoinHandle<()>,
}

impl<T: Send + Sync + 'static> Enricher<T> {
    /// Start with the default tracing status display.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        document: Document,
        transport: T,
        cache: Arc<dyn DurableCache>,
        config: EnricherConfig,
    ) -> Self {
        Self::start_with_status(document, transport, cache, config, Arc::new(TracingStatus::new()))
    }

    pub fn start_with_status(
        mut document: Document,
        transport: T,
        cache: Arc<dyn DurableCache>,
        config: EnricherConfig,
        status: Arc<dyn StatusDisplay>,
    ) -> Self {
        let mutations = document.observe();
        let document = Arc::new(Mutex::new(document));
        let store = Arc::new(PayloadStore::open(cache, config.cache_key.clone()));

        let (scheduler, task) = Scheduler::spawn(
            Arc::clone(&document),
            mutations,
            Arc::clone(&store),
            Arc::clone(&status),
            config.debounce,
            PipelineState::new(config.ancestor_limit),
        );

        let handle = scheduler.clone();
        store.subscribe(move |payload: &CapturedPayload| {
            tracing::debug!(url = %payload.source_url, "payload captured, scheduling run");
            handle.trigger(Trigger::Capture)
        });

        let transport = Arc::new(InterceptingTransport::new(transport));
        let sink = Arc::clone(&store);
        transport.intercept(endpoint_contains(config.endpoint.clone()), move |url, body| {
            sink.emit(url, body);
        });

        tracing::info!(endpoint = %config.endpoint, "enricher started");
        Self {
            config,
            document,
            store,
            transport,
            status,
            scheduler,
            task,
        }
    }
}

impl<T> Enricher<T> {
    pub fn config(&self) -> &EnricherConfig {
        &self.config
    }

    /// Transport to route host requests through.
    pub fn transport(&self) -> Arc<InterceptingTransport<T>> {
        Arc::clone(&self.transport)
    }

    pub fn document(&self) -> SharedDocument {
        Arc::clone(&self.document)
    }

    pub fn store(&self) -> &PayloadStore {
        &self.store
    }

    /// Source URL of the current payload.
    pub fn last_url(&self) -> Option<String> {
        self.store.last_url()
    }

    pub fn last_payload(&self) -> Option<Arc<CapturedPayload>> {
        self.store.latest()
    }

    /// Run the pipeline immediately.
    pub async fn run_now(&self) -> EnricherResult<RunReport> {
        self.scheduler.run_now().await
    }

    pub fn last_report(&self) -> Option<RunReport> {
        self.scheduler.last_report()
    }

    pub fn stats(&self) -> watch::Receiver<Option<RunReport>> {
        self.scheduler.stats()
    }

    pub fn show_status(&self) {
        self.status.set_visible(true);
        let snapshot = self
            .last_report()
            .map(|r| StatusSnapshot::from_report(&r))
            .unwrap_or_default();
        self.status.update(&snapshot);
    }

    pub fn hide_status(&self) {
        self.status.set_visible(false);
    }

    /// The document became interactive; schedules the initial run.
    pub fn document_ready(&self) -> EnricherResult<()> {
        self.scheduler.trigger(Trigger::InitialLoad)
    }

    pub fn navigated(&self, kind: NavigationKind) -> EnricherResult<()> {
        self.scheduler.trigger(Trigger::Navigation(kind))
    }

    /// Report a click. Returns whether it was recognized as list navigation
    /// and scheduled a run.
    pub fn clicked(&self, href: Option<&str>, label: &str) -> EnricherResult<bool> {
        if !is_list_navigation_click(href, label) {
            return Ok(false);
        }
        self.scheduler.trigger(Trigger::Click)?;
        Ok(true)
    }

    /// Stop the scheduler; later calls report a stopped scheduler.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }
}

impl<T> Drop for Enricher<T> {
    fn drop(&mut self) {
        self.scheduler.shutdown();
        if !self.task.is_finished() {
            tracing::debug!("enricher dropped; scheduler shutting down");
        }
    }
}
