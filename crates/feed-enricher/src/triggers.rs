//! Events that ask the scheduler for a pipeline run.

use std::fmt;

use serde::{Deserialize, Serialize};

/// History-state change reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavigationKind {
    Push,
    Replace,
    /// Back/forward.
    Pop,
}

/// Why a run was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// The document became interactive.
    InitialLoad,
    /// A new payload was captured.
    Capture,
    /// An inserted subtree contains a candidate entry.
    Mutation,
    Navigation(NavigationKind),
    /// A click on a pagination or list-navigation control.
    Click,
    Manual,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::InitialLoad => write!(f, "initial-load"),
            Trigger::Capture => write!(f, "capture"),
            Trigger::Mutation => write!(f, "mutation"),
            Trigger::Navigation(kind) => write!(f, "navigation:{kind:?}"),
            Trigger::Click => write!(f, "click"),
            Trigger::Manual => write!(f, "manual"),
        }
    }
}

const PAGING_HREF_FRAGMENTS: &[&str] = &["page=", "/page/", "offset=", "start="];
const ARROW_LABELS: &[&str] = &["»", "«", "›", "‹", ">", "<"];
const LABEL_PREFIXES: &[&str] = &["next", "prev", "previous", "load more", "show more"];

/// Whether a click on a control with this destination and label moves
/// through the list.
pub fn is_list_navigation_click(href: Option<&str>, label: &str) -> bool {
    if let Some(href) = href {
        if PAGING_HREF_FRAGMENTS.iter().any(|f| href.contains(f)) {
            return true;
        }
    }

    let label = label.trim().to_lowercase();
    if label.is_empty() {
        return false;
    }
    label.chars().all(|c| c.is_ascii_digit())
        || ARROW_LABELS.contains(&label.as_str())
        || LABEL_PREFIXES.iter().any(|p| label.starts_with(p))
}
