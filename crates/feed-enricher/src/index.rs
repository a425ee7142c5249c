//! Indexing engine: normalize a payload to an item list and build lookups.

use std::collections::HashMap;

use serde_json::{Map, Number, Value};

use crate::types::PayloadBody;

/// Keys probed, in order, for an item list inside an object payload.
pub const LIST_KEYS: &[&str] = &["results", "items", "data"];

/// One payload record.
///
/// No identifier is guaranteed; any subset may be missing. The descriptive
/// accessors fall back across the spellings the feed is known to use.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedItem {
    pub id: Option<String>,
    pub uuid: Option<String>,
    pub work_number: Option<String>,
    fields: Map<String, Value>,
}

impl FeedItem {
    /// Build an item from a list element. Non-object elements carry nothing
    /// usable and yield `None`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let fields = value.as_object()?;
        Some(Self {
            id: fields.get("id").and_then(identifier),
            uuid: fields
                .get("uuid")
                .and_then(identifier)
                .filter(|u| !u.is_empty()),
            work_number: fields.get("workNumber").and_then(identifier),
            fields: fields.clone(),
        })
    }

    /// Raw field access.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key).filter(|v| !v.is_null())
    }

    fn first_of(&self, keys: &[&str]) -> Option<&Value> {
        keys.iter().find_map(|k| self.field(k))
    }

    pub fn spend_limit(&self) -> Option<&Value> {
        self.first_of(&["spendLimit", "spend_limit", "budget"])
    }

    pub fn pricing_type(&self) -> Option<&Value> {
        self.first_of(&["pricingType", "pricing_type", "pricing"])
    }

    pub fn company_name(&self) -> Option<&Value> {
        self.first_of(&["companyName", "company_name"])
    }

    pub fn company(&self) -> Option<&Value> {
        self.first_of(&["company", "client"])
    }

    /// Whether the record asks for the first responder to be auto-assigned.
    pub fn assigns_first_responder(&self) -> bool {
        self.field("assignToFirstResource") == Some(&Value::Bool(true))
    }

    /// First assigned resource: its `name`, or the entry itself.
    pub fn first_assignee(&self) -> Option<&Value> {
        let first = self.field("assignedTo")?.as_array()?.first()?;
        match first.get("name") {
            Some(name) if !name.is_null() => Some(name),
            _ if first.is_null() => None,
            _ => Some(first),
        }
    }

    /// Human title, for diagnostics.
    pub fn title(&self) -> Option<&str> {
        self.first_of(&["publicTitle", "title"])
            .and_then(Value::as_str)
    }
}

/// Stringify an identifier the way the page compares them.
fn identifier(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(number_text(n)),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Render a number the way the page prints it: whole floats lose their
/// fraction, so `250.0` reads `250`.
pub(crate) fn number_text(n: &Number) -> String {
    match n.as_f64() {
        Some(f) if n.is_f64() && f == 0.0 => "0".to_string(),
        Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e21 => format!("{f:.0}"),
        _ => n.to_string(),
    }
}

/// Locate the item list in a payload body.
///
/// The body itself wins if it is a list; otherwise the first of
/// [`LIST_KEYS`] holding a list. Raw (undecodable) bodies have no list.
pub fn normalize_items(body: &PayloadBody) -> Option<&[Value]> {
    let value = body.as_value()?;
    if let Value::Array(items) = value {
        return Some(items.as_slice());
    }
    let object = value.as_object()?;
    LIST_KEYS
        .iter()
        .find_map(|k| object.get(*k).and_then(Value::as_array))
        .map(Vec::as_slice)
}

/// Top-level keys of an object body, for shape-error diagnostics.
pub fn top_level_keys(body: &PayloadBody) -> Vec<String> {
    body.as_value()
        .and_then(Value::as_object)
        .map(|o| o.keys().cloned().collect())
        .unwrap_or_default()
}

/// Three lookups over one payload's items.
///
/// Colliding keys keep the last item seen; a work number keeps the position
/// of its first appearance for the fallback scan.
#[derive(Debug, Default)]
pub struct ItemIndex {
    items: Vec<FeedItem>,
    by_id: HashMap<String, usize>,
    by_uuid: HashMap<String, usize>,
    by_work_number: HashMap<String, usize>,
    work_number_order: Vec<String>,
}

impl ItemIndex {
    /// Build all three lookups in a single pass over `items`.
    pub fn build(items: &[Value]) -> Self {
        let mut index = ItemIndex::default();
        for value in items {
            let Some(item) = FeedItem::from_value(value) else {
                continue;
            };
            let pos = index.items.len();
            if let Some(id) = &item.id {
                index.by_id.insert(id.clone(), pos);
            }
            if let Some(uuid) = &item.uuid {
                index.by_uuid.insert(uuid.clone(), pos);
            }
            if let Some(wn) = &item.work_number {
                if index.by_work_number.insert(wn.clone(), pos).is_none() {
                    index.work_number_order.push(wn.clone());
                }
            }
            index.items.push(item);
        }
        index
    }

    /// Normalize and index a payload body; `None` when it holds no list.
    pub fn from_body(body: &PayloadBody) -> Option<(Self, usize)> {
        let items = normalize_items(body)?;
        Some((Self::build(items), items.len()))
    }

    pub fn by_id(&self, key: &str) -> Option<&FeedItem> {
        self.by_id.get(key).map(|&i| &self.items[i])
    }

    pub fn by_uuid(&self, key: &str) -> Option<&FeedItem> {
        self.by_uuid.get(key).map(|&i| &self.items[i])
    }

    pub fn by_work_number(&self, key: &str) -> Option<&FeedItem> {
        self.by_work_number.get(key).map(|&i| &self.items[i])
    }

    /// `(work number, item)` pairs in first-appearance order.
    pub fn work_numbers(&self) -> impl Iterator<Item = (&str, &FeedItem)> {
        self.work_number_order
            .iter()
            .map(|wn| (wn.as_str(), &self.items[self.by_work_number[wn]]))
    }

    pub fn id_count(&self) -> usize {
        self.by_id.len()
    }

    pub fn uuid_count(&self) -> usize {
        self.by_uuid.len()
    }

    pub fn work_number_count(&self) -> usize {
        self.by_work_number.len()
    }
}
