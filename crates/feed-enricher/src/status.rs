//! Status display collaborator.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;

use crate::types::RunReport;

const SOURCE_LABEL_MAX: usize = 28;

/// Counters shown by a status display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub anchors: usize,
    pub indexed: usize,
    pub injected: usize,
    pub source: Option<String>,
}

impl StatusSnapshot {
    pub fn from_report(report: &RunReport) -> Self {
        Self {
            anchors: report.anchors,
            indexed: report.indexed,
            injected: report.injected,
            source: report.source_url.clone(),
        }
    }

    /// Source URL shortened for display, or `none`.
    pub fn source_label(&self) -> String {
        match &self.source {
            None => "none".to_string(),
            Some(url) if url.chars().count() > SOURCE_LABEL_MAX => {
                let head: String = url.chars().take(SOURCE_LABEL_MAX).collect();
                format!("{head}…")
            }
            Some(url) => url.clone(),
        }
    }
}

/// Receives counters after every run.
pub trait StatusDisplay: Send + Sync {
    fn update(&self, snapshot: &StatusSnapshot);
    fn set_visible(&self, visible: bool);
}

/// Logs snapshots while visible.
#[derive(Debug)]
pub struct TracingStatus {
    visible: AtomicBool,
}

impl Default for TracingStatus {
    fn default() -> Self {
        Self {
            visible: AtomicBool::new(true),
        }
    }
}

impl TracingStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::Relaxed)
    }
}

impl StatusDisplay for TracingStatus {
    fn update(&self, snapshot: &StatusSnapshot) {
        if self.is_visible() {
            tracing::info!(
                anchors = snapshot.anchors,
                indexed = snapshot.indexed,
                injected = snapshot.injected,
                source = %snapshot.source_label(),
                "status"
            );
        }
    }

    fn set_visible(&self, visible: bool) {
        self.visible.store(visible, Ordering::Relaxed);
    }
}
