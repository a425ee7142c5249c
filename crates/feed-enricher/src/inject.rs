//! Injection engine: annotate a matched entry's card exactly once.

use serde_json::Value;

use crate::dom::{Document, NodeId};
use crate::index::{number_text, FeedItem};
use crate::types::{EnricherError, EnricherResult};

/// Class carried by every annotation block.
pub const ANNOTATION_CLASS: &str = "feed-details-block";

/// Attribute set on a container once it has been annotated.
pub const MARKER_ATTR: &str = "data-feed-enriched";

/// How many elements the container search inspects, starting at the entry.
pub const CONTAINER_SEARCH_LIMIT: usize = 6;

/// Class names that identify a card container.
pub const CONTAINER_CLASSES: &[&str] = &["card", "assignment-card", "list-item"];

/// Shown instead of an assignee when the record auto-assigns the first responder.
pub const AUTO_ASSIGN_SENTINEL: &str = "(assignToFirstResource:true)";

/// Shown for fields the record does not carry.
pub const MISSING_VALUE: &str = "—";

/// Display values pulled from a matched item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotationFields {
    pub work_order: Option<String>,
    pub spend_limit: Option<String>,
    pub pricing_type: Option<String>,
    pub company_name: Option<String>,
    pub company: Option<String>,
    pub assigned_to_first: Option<String>,
}

impl AnnotationFields {
    pub fn from_item(item: &FeedItem) -> Self {
        let assigned_to_first = if item.assigns_first_responder() {
            Some(AUTO_ASSIGN_SENTINEL.to_string())
        } else {
            item.first_assignee().map(display_value)
        };

        Self {
            work_order: item.work_number.clone(),
            spend_limit: item.spend_limit().map(display_value),
            pricing_type: item.pricing_type().map(display_value),
            company_name: item.company_name().map(display_value),
            company: item.company().map(display_value),
            assigned_to_first,
        }
    }

    /// `(label, value)` rows in display order.
    pub fn rows(&self) -> [(&'static str, Option<&str>); 6] {
        [
            ("Work order", self.work_order.as_deref()),
            ("Spend limit", self.spend_limit.as_deref()),
            ("Pricing type", self.pricing_type.as_deref()),
            ("Company name", self.company_name.as_deref()),
            ("Company", self.company.as_deref()),
            ("Assigned to (first resource)", self.assigned_to_first.as_deref()),
        ]
    }
}

/// Strings verbatim, whole floats without a fraction, everything else as
/// compact JSON.
fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => number_text(n),
        other => other.to_string(),
    }
}

fn is_container(doc: &Document, id: NodeId) -> bool {
    CONTAINER_CLASSES.iter().any(|c| doc.has_class(id, c))
        || doc
            .attr(id, "data-assignment")
            .map(|v| !v.is_empty())
            .unwrap_or(false)
        || doc.attr(id, "role") == Some("article")
}

/// Nearest card around the entry, inspecting at most `limit` elements
/// starting with the entry itself. Falls back to the entry's parent.
pub fn find_card_container(doc: &Document, entry: NodeId, limit: usize) -> NodeId {
    let mut current = Some(entry);
    for _ in 0..limit {
        let Some(el) = current.filter(|&id| doc.is_element(id)) else {
            break;
        };
        if is_container(doc, el) {
            return el;
        }
        current = doc.parent(el);
    }
    doc.parent(entry)
        .filter(|&p| doc.is_element(p))
        .unwrap_or(entry)
}

/// Whether a container already carries an annotation.
pub fn is_annotated(doc: &Document, container: NodeId) -> bool {
    doc.attr(container, MARKER_ATTR).is_some()
        || doc
            .descendants(container)
            .any(|id| doc.has_class(id, ANNOTATION_CLASS))
}

/// Build a detached annotation block.
pub fn build_annotation(doc: &mut Document, fields: &AnnotationFields) -> EnricherResult<NodeId> {
    let block = doc.create_element("div");
    doc.set_attr(block, "class", ANNOTATION_CLASS)?;

    let title = doc.create_element("div");
    doc.set_attr(title, "class", "feed-details-title")?;
    let text = doc.create_text("Feed details");
    doc.append_child(title, text)?;
    doc.append_child(block, title)?;

    for (label, value) in fields.rows() {
        let row = doc.create_element("div");
        doc.set_attr(row, "class", "feed-details-row")?;

        let label_el = doc.create_element("strong");
        let label_text = doc.create_text(&format!("{label}: "));
        doc.append_child(label_el, label_text)?;
        doc.append_child(row, label_el)?;

        let value_el = doc.create_element("span");
        let value_text = doc.create_text(value.unwrap_or(MISSING_VALUE));
        doc.append_child(value_el, value_text)?;
        doc.append_child(row, value_el)?;

        doc.append_child(block, row)?;
    }

    Ok(block)
}

/// What [`inject`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectOutcome {
    /// A block was inserted.
    Injected(NodeId),
    /// The container was already annotated; nothing changed.
    AlreadyAnnotated,
}

/// Annotate the card around `entry` with `item`'s fields, unless the card
/// is already annotated. The block goes immediately after the entry.
pub fn inject(
    doc: &mut Document,
    entry: NodeId,
    item: &FeedItem,
    limit: usize,
) -> EnricherResult<InjectOutcome> {
    if !doc.is_attached(entry) {
        return Err(EnricherError::Injection("entry is no longer in the document".into()));
    }

    let container = find_card_container(doc, entry, limit);
    if is_annotated(doc, container) {
        return Ok(InjectOutcome::AlreadyAnnotated);
    }

    let block = build_annotation(doc, &AnnotationFields::from_item(item))?;
    if doc.parent(entry).is_some() {
        doc.insert_after(entry, block)?;
    } else {
        doc.append_child(container, block)?;
    }
    doc.set_attr(container, MARKER_ATTR, "true")?;

    Ok(InjectOutcome::Injected(block))
}
