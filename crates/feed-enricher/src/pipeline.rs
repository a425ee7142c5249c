//! One pass of Indexing → Matching → Injection over the live document.

use crate::candidates;
use crate::dom::Document;
use crate::index::{self, ItemIndex};
use crate::inject::{self, InjectOutcome, CONTAINER_SEARCH_LIMIT};
use crate::matching;
use crate::types::{CapturedPayload, RunReport};

/// State carried between pipeline runs.
///
/// The scheduler owns the only mutable reference; each run receives it
/// explicitly rather than reaching for shared globals.
#[derive(Debug, Clone)]
pub struct PipelineState {
    ancestor_limit: usize,
    runs: u64,
    last_report: Option<RunReport>,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new(CONTAINER_SEARCH_LIMIT)
    }
}

impl PipelineState {
    pub fn new(ancestor_limit: usize) -> Self {
        Self {
            ancestor_limit,
            runs: 0,
            last_report: None,
        }
    }

    /// Completed runs so far.
    pub fn runs(&self) -> u64 {
        self.runs
    }

    pub fn last_report(&self) -> Option<&RunReport> {
        self.last_report.as_ref()
    }

    pub fn ancestor_limit(&self) -> usize {
        self.ancestor_limit
    }

    fn record(&mut self, report: &RunReport) {
        self.runs += 1;
        self.last_report = Some(report.clone());
    }
}

/// Annotate every matchable entry in `doc` from `payload`.
///
/// Never fails: a missing payload or an unrecognized shape yields an empty
/// report, and a failing entry is counted and skipped.
pub fn run_pipeline(
    doc: &mut Document,
    payload: Option<&CapturedPayload>,
    state: &mut PipelineState,
) -> RunReport {
    let Some(payload) = payload else {
        tracing::info!("no payload available; nothing to annotate");
        let report = RunReport::default();
        state.record(&report);
        return report;
    };

    let mut report = RunReport {
        source_url: Some(payload.source_url.clone()),
        ..RunReport::default()
    };

    let Some((index, indexed)) = ItemIndex::from_body(&payload.body) else {
        tracing::warn!(
            url = %payload.source_url,
            body = payload.body.kind(),
            keys = ?index::top_level_keys(&payload.body),
            "payload has no recognizable item list"
        );
        state.record(&report);
        return report;
    };
    report.indexed = indexed;
    tracing::debug!(
        ids = index.id_count(),
        uuids = index.uuid_count(),
        work_numbers = index.work_number_count(),
        "indexed payload"
    );

    let entries = candidates::discover(doc);
    report.anchors = entries.len();

    for (node, entry) in &entries {
        let Some(matched) = matching::resolve(entry, &index) else {
            tracing::debug!(href = %entry.href, "no match for entry");
            report.unmatched += 1;
            continue;
        };

        match inject::inject(doc, *node, matched.item, state.ancestor_limit) {
            Ok(InjectOutcome::Injected(_)) => {
                report.injected += 1;
                tracing::debug!(
                    href = %entry.href,
                    strategy = %matched.strategy,
                    work_number = matched.item.work_number.as_deref().unwrap_or_default(),
                    title = matched.item.title().unwrap_or_default(),
                    "annotated entry"
                );
            }
            Ok(InjectOutcome::AlreadyAnnotated) => {
                report.already_annotated += 1;
                tracing::debug!(href = %entry.href, strategy = %matched.strategy, "already annotated");
            }
            Err(e) => {
                report.failed += 1;
                tracing::error!(href = %entry.href, error = %e, "failed to annotate entry");
            }
        }
    }

    tracing::info!(
        anchors = report.anchors,
        indexed = report.indexed,
        injected = report.injected,
        "pipeline run complete"
    );
    state.record(&report);
    report
}
