//! Core data types shared by every pipeline stage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::transport::TransportError;

/// A response body as captured off the wire.
///
/// Decoding never fails outward: text that is not valid JSON is kept verbatim
/// and later normalizes to zero items.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadBody {
    Parsed(Value),
    Raw(String),
}

impl PayloadBody {
    /// Decode response text, falling back to the raw text.
    pub fn from_text(text: &str) -> Self {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => PayloadBody::Parsed(value),
            Err(_) => PayloadBody::Raw(text.to_string()),
        }
    }

    /// The decoded value, if decoding succeeded.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            PayloadBody::Parsed(value) => Some(value),
            PayloadBody::Raw(_) => None,
        }
    }

    /// Short description of the body shape, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            PayloadBody::Parsed(Value::Array(_)) => "array",
            PayloadBody::Parsed(Value::Object(_)) => "object",
            PayloadBody::Parsed(Value::String(_)) => "string",
            PayloadBody::Parsed(Value::Number(_)) => "number",
            PayloadBody::Parsed(Value::Bool(_)) => "bool",
            PayloadBody::Parsed(Value::Null) => "null",
            PayloadBody::Raw(_) => "raw",
        }
    }

    /// Representation written to the durable cache.
    ///
    /// Raw text is stored as a JSON string.
    pub fn to_cache_value(&self) -> Value {
        match self {
            PayloadBody::Parsed(value) => value.clone(),
            PayloadBody::Raw(text) => Value::String(text.clone()),
        }
    }

    /// Inverse of [`PayloadBody::to_cache_value`].
    pub fn from_cache_value(value: Value) -> Self {
        match value {
            Value::String(text) => PayloadBody::Raw(text),
            other => PayloadBody::Parsed(other),
        }
    }
}

/// The most recent payload captured from the feed endpoint.
///
/// Replaced wholesale on every capture, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedPayload {
    pub source_url: String,
    pub body: PayloadBody,
    pub captured_at: DateTime<Utc>,
}

impl CapturedPayload {
    /// Capture stamped with the current time.
    pub fn new(source_url: impl Into<String>, body: PayloadBody) -> Self {
        Self {
            source_url: source_url.into(),
            body,
            captured_at: Utc::now(),
        }
    }
}

/// A visible rendered entry: a link whose destination looks like a work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryCandidate {
    /// Destination, resolved against the document base URL when one is set.
    pub href: String,
    /// Visible text of the link.
    pub text: String,
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub source_url: Option<String>,
    /// Candidate entries found in the document.
    pub anchors: usize,
    /// Items in the normalized payload list.
    pub indexed: usize,
    /// Annotation blocks inserted by this run.
    pub injected: usize,
    /// Matched entries whose container was already annotated.
    pub already_annotated: usize,
    pub unmatched: usize,
    /// Entries skipped because matching or injection failed.
    pub failed: usize,
}

/// Errors that can occur in the enricher library.
#[derive(thiserror::Error, Debug)]
pub enum EnricherError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Document error: {0}")]
    Dom(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Injection error: {0}")]
    Injection(String),

    #[error("Subscriber error: {0}")]
    Subscriber(String),

    #[error("Scheduler stopped")]
    SchedulerStopped,
}

/// Convenience result type.
pub type EnricherResult<T> = Result<T, EnricherError>;
