//! Discovery of rendered entries in the document.

use crate::dom::{Document, NodeId};
use crate::inject::ANNOTATION_CLASS;
use crate::types::EntryCandidate;

/// Destination fragments that identify a link to a work item.
pub const CANDIDATE_PATTERNS: &[&str] = &["/assignment/", "/work/", "/job/", "/workorder/", "/jobs/"];

/// Whether an element is a candidate link (`a[href*=...]` for any pattern).
pub fn is_candidate_link(doc: &Document, id: NodeId) -> bool {
    if doc.tag(id) != Some("a") {
        return false;
    }
    doc.attr(id, "href")
        .map(|href| CANDIDATE_PATTERNS.iter().any(|p| href.contains(p)))
        .unwrap_or(false)
}

/// Every candidate link in document order, paired with its entry data.
pub fn discover(doc: &Document) -> Vec<(NodeId, EntryCandidate)> {
    doc.elements()
        .filter(|&id| is_candidate_link(doc, id))
        .map(|id| (id, entry_for(doc, id)))
        .collect()
}

/// Build the entry data for a link element.
pub fn entry_for(doc: &Document, id: NodeId) -> EntryCandidate {
    let raw = doc.attr(id, "href").unwrap_or_default();
    EntryCandidate {
        href: doc.resolve_href(raw),
        text: doc.text_content(id),
    }
}

/// Whether a subtree contains a candidate link.
///
/// Annotation blocks are skipped entirely so the pipeline's own insertions
/// never count as a reason to run again.
pub fn subtree_has_candidate(doc: &Document, root: NodeId) -> bool {
    if !doc.is_attached(root) || is_annotation(doc, root) {
        return false;
    }
    if is_candidate_link(doc, root) {
        return true;
    }

    let mut stack: Vec<NodeId> = doc.children(root).to_vec();
    while let Some(id) = stack.pop() {
        if is_annotation(doc, id) {
            continue;
        }
        if is_candidate_link(doc, id) {
            return true;
        }
        stack.extend_from_slice(doc.children(id));
    }
    false
}

fn is_annotation(doc: &Document, id: NodeId) -> bool {
    doc.has_class(id, ANNOTATION_CLASS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    #[test]
    fn test_discover_matches_patterns_only() {
        let doc = Document::parse(
            r#"<body>
                <a href="/assignment/111111">A</a>
                <a href="/profile/me">Me</a>
                <a href="https://x.test/jobs/222222?tab=1">B</a>
                <a>no href</a>
                <a href="/workorder/333333"><span>C</span></a>
            </body>"#,
        );
        let found = discover(&doc);
        let hrefs: Vec<&str> = found.iter().map(|(_, c)| c.href.as_str()).collect();
        assert_eq!(
            hrefs,
            vec![
                "/assignment/111111",
                "https://x.test/jobs/222222?tab=1",
                "/workorder/333333"
            ]
        );
        assert_eq!(found[2].1.text, "C");
    }

    #[test]
    fn test_entry_href_is_resolved() {
        let doc = Document::parse(r#"<body><a href="/work/500123">Open</a></body>"#)
            .with_base_url(Url::parse("https://www.example.com/worker/browse").unwrap());
        let found = discover(&doc);
        assert_eq!(found[0].1.href, "https://www.example.com/work/500123");
    }

    #[test]
    fn test_subtree_check_ignores_annotation_blocks() {
        let mut doc = Document::parse("<body><div id=\"list\"></div></body>");
        let list = doc
            .elements()
            .find(|&id| doc.attr(id, "id") == Some("list"))
            .unwrap();

        let block = doc.create_element("div");
        doc.set_attr(block, "class", ANNOTATION_CLASS).unwrap();
        let link = doc.create_element("a");
        doc.set_attr(link, "href", "/work/1").unwrap();
        doc.append_child(block, link).unwrap();
        doc.append_child(list, block).unwrap();
        assert!(!subtree_has_candidate(&doc, block));

        let row = doc.create_element("div");
        let link = doc.create_element("a");
        doc.set_attr(link, "href", "/work/2").unwrap();
        doc.append_child(row, link).unwrap();
        doc.append_child(list, row).unwrap();
        assert!(subtree_has_candidate(&doc, row));
    }
}
