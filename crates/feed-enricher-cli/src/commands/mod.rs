//! Subcommand implementations.

pub mod annotate;
pub mod cache;
pub mod watch;

use anyhow::Context;

use feed_enricher::{Document, RunReport};

/// Parse a page, attaching a base URL when given.
pub fn load_document(html: &str, base_url: Option<&str>) -> anyhow::Result<Document> {
    let doc = Document::parse(html);
    match base_url {
        Some(base) => {
            let base = url::Url::parse(base).with_context(|| format!("invalid base URL: {base}"))?;
            Ok(doc.with_base_url(base))
        }
        None => Ok(doc),
    }
}

/// Render a run report for the terminal.
pub fn render_report(report: &RunReport, json: bool) -> anyhow::Result<String> {
    if json {
        return Ok(serde_json::to_string_pretty(report)?);
    }

    let mut out = String::new();
    out.push_str(&format!(
        "Source:            {}\n",
        report.source_url.as_deref().unwrap_or("none")
    ));
    out.push_str(&format!("Anchors:           {}\n", report.anchors));
    out.push_str(&format!("Indexed items:     {}\n", report.indexed));
    out.push_str(&format!("Injected:          {}\n", report.injected));
    out.push_str(&format!("Already annotated: {}\n", report.already_annotated));
    out.push_str(&format!("Unmatched:         {}\n", report.unmatched));
    out.push_str(&format!("Failed:            {}", report.failed));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_report_text_and_json() {
        let report = RunReport {
            source_url: Some("https://wm.test/feed/firehose".into()),
            anchors: 3,
            indexed: 10,
            injected: 2,
            unmatched: 1,
            ..RunReport::default()
        };

        let text = render_report(&report, false).unwrap();
        assert!(text.contains("Injected:          2"));
        assert!(text.starts_with("Source:            https://wm.test/feed/firehose"));

        let json: serde_json::Value =
            serde_json::from_str(&render_report(&report, true).unwrap()).unwrap();
        assert_eq!(json["indexed"], 10);
    }

    #[test]
    fn test_load_document_rejects_bad_base() {
        assert!(load_document("<p></p>", Some("not a url")).is_err());
        let doc = load_document("<p></p>", Some("https://wm.test/")).unwrap();
        assert_eq!(doc.resolve_href("/work/1"), "https://wm.test/work/1");
    }
}
