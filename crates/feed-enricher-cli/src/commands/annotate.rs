//! `annotate`: one pipeline run over a saved page and a saved payload.

use std::path::Path;

use anyhow::Context;

use feed_enricher::{run_pipeline, CapturedPayload, PayloadBody, PipelineState, RunReport};

use super::load_document;

/// Annotate `html` from the payload body text. Returns the annotated page
/// and the run report.
pub fn annotate(
    html: &str,
    payload_text: &str,
    source_url: &str,
    base_url: Option<&str>,
    ancestor_limit: usize,
) -> anyhow::Result<(String, RunReport)> {
    let mut doc = load_document(html, base_url)?;
    let payload = CapturedPayload::new(source_url, PayloadBody::from_text(payload_text));
    let mut state = PipelineState::new(ancestor_limit);

    let report = run_pipeline(&mut doc, Some(&payload), &mut state);
    Ok((doc.to_html()?, report))
}

/// File-based wrapper around [`annotate`]. The payload file's path stands in
/// for the source URL.
pub fn annotate_files(
    html_path: &Path,
    payload_path: &Path,
    base_url: Option<&str>,
    ancestor_limit: usize,
) -> anyhow::Result<(String, RunReport)> {
    let html = std::fs::read_to_string(html_path)
        .with_context(|| format!("failed to read page {}", html_path.display()))?;
    let payload = std::fs::read_to_string(payload_path)
        .with_context(|| format!("failed to read payload {}", payload_path.display()))?;
    let source = format!("file://{}", payload_path.display());
    annotate(&html, &payload, &source, base_url, ancestor_limit)
}
