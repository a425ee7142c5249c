//! Live document tree.
//!
//! An arena of nodes addressed by [`NodeId`]. The tree is parsed from HTML
//! with `scraper`, then mutated in place: the host page adds and removes
//! subtrees (pagination, client-side navigation), the injection engine
//! inserts annotation blocks. Structural changes to the attached tree are
//! reported to observers as [`MutationRecord`]s.
//!
//! Detached nodes keep their slots until [`Document::discard`] frees them.
//! Freed slots are reused; a handle to a freed node resolves to nothing.

use std::io;

use html5ever::serialize::{self, Serialize, SerializeOpts, Serializer, TraversalScope};
use html5ever::{namespace_url, ns, LocalName, QualName};
use tokio::sync::mpsc;
use url::Url;

use crate::types::{EnricherError, EnricherResult};

/// Handle to a node in a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: usize,
    generation: u32,
}

/// Node payload.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    Document,
    Doctype(String),
    Element {
        name: QualName,
        attrs: Vec<(QualName, String)>,
    },
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    data: NodeData,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

/// A structural change to the attached tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    /// Parent whose child list changed.
    pub target: NodeId,
    pub added: Vec<NodeId>,
    pub removed: Vec<NodeId>,
}

/// Mutable document tree.
#[derive(Debug)]
pub struct Document {
    slots: Vec<Slot>,
    free: Vec<usize>,
    base_url: Option<Url>,
    observers: Vec<mpsc::UnboundedSender<MutationRecord>>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty document holding only the root node.
    pub fn new() -> Self {
        Self {
            slots: vec![Slot {
                generation: 0,
                node: Some(Node {
                    parent: None,
                    children: Vec::new(),
                    data: NodeData::Document,
                }),
            }],
            free: Vec::new(),
            base_url: None,
            observers: Vec::new(),
        }
    }

    /// Parse an HTML document. Processing instructions are dropped.
    pub fn parse(html: &str) -> Self {
        let source = scraper::Html::parse_document(html);
        let mut doc = Document::new();
        let root = doc.root();

        // Pre-order walk; popping in document order keeps sibling order intact.
        let mut stack: Vec<_> = source.tree.root().children().map(|c| (root, c)).collect();
        stack.reverse();

        while let Some((parent, node)) = stack.pop() {
            let data = match node.value() {
                scraper::Node::Element(el) => NodeData::Element {
                    name: el.name.clone(),
                    attrs: el
                        .attrs
                        .iter()
                        .map(|(k, v)| (k.clone(), (**v).to_string()))
                        .collect(),
                },
                scraper::Node::Text(text) => {
                    let text: &str = text;
                    NodeData::Text(text.to_string())
                }
                scraper::Node::Comment(comment) => {
                    let comment: &str = comment;
                    NodeData::Comment(comment.to_string())
                }
                scraper::Node::Doctype(doctype) => NodeData::Doctype(doctype.name().to_string()),
                _ => continue,
            };
            let id = doc.alloc(Some(parent), data);
            doc.link(parent, id, None);

            let children: Vec<_> = node.children().collect();
            for child in children.into_iter().rev() {
                stack.push((id, child));
            }
        }

        doc
    }

    /// Set the URL link destinations are resolved against.
    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base_url = Some(base);
        self
    }

    pub fn set_base_url(&mut self, base: Option<Url>) {
        self.base_url = base;
    }

    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    /// Resolve a raw `href` value the way a browser reports a link destination.
    pub fn resolve_href(&self, raw: &str) -> String {
        match &self.base_url {
            Some(base) => base
                .join(raw)
                .map(|u| u.to_string())
                .unwrap_or_else(|_| raw.to_string()),
            None => raw.to_string(),
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId {
            index: 0,
            generation: 0,
        }
    }

    /// Subscribe to structural changes of the attached tree.
    pub fn observe(&mut self) -> mpsc::UnboundedReceiver<MutationRecord> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.observers.push(tx);
        rx
    }

    /// Live nodes, attached or not.
    pub fn node_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    // ── Node access ────────────────────────────────────────────

    fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots
            .get(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.slots
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
    }

    fn node(&self, id: NodeId) -> EnricherResult<&Node> {
        self.get(id)
            .ok_or_else(|| EnricherError::Dom(format!("unknown node {}", id.index)))
    }

    pub fn data(&self, id: NodeId) -> Option<&NodeData> {
        self.get(id).map(|n| &n.data)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|n| n.parent)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.get(id).map(|n| n.children.as_slice()).unwrap_or(&[])
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let siblings = self.children(parent);
        let pos = siblings.iter().position(|&c| c == id)?;
        siblings.get(pos + 1).copied()
    }

    /// Local tag name, for element nodes.
    pub fn tag(&self, id: NodeId) -> Option<&str> {
        match self.data(id)? {
            NodeData::Element { name, .. } => Some(&*name.local),
            _ => None,
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.tag(id).is_some()
    }

    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        match self.data(id)? {
            NodeData::Element { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| (&*k.local).eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    pub fn has_class(&self, id: NodeId, class: &str) -> bool {
        self.attr(id, "class")
            .map(|v| v.split_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }

    /// Whether the node is reachable from the root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = self.get(id).map(|_| id);
        while let Some(node) = current {
            if node == self.root() {
                return true;
            }
            current = self.parent(node);
        }
        false
    }

    /// Pre-order traversal of the node's descendants, excluding the node itself.
    pub fn descendants(&self, id: NodeId) -> Descendants<'_> {
        let mut stack: Vec<NodeId> = self.children(id).to_vec();
        stack.reverse();
        Descendants { doc: self, stack }
    }

    /// Every attached element in document order.
    pub fn elements(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.descendants(self.root())
            .filter(move |&id| self.is_element(id))
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self, id: NodeId) -> String {
        if let Some(NodeData::Text(text)) = self.data(id) {
            return text.clone();
        }
        self.descendants(id)
            .filter_map(|n| match self.data(n) {
                Some(NodeData::Text(text)) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    // ── Mutation ───────────────────────────────────────────────

    fn alloc(&mut self, parent: Option<NodeId>, data: NodeData) -> NodeId {
        let node = Node {
            parent,
            children: Vec::new(),
            data,
        };
        match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index];
                slot.node = Some(node);
                NodeId {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                NodeId {
                    index: self.slots.len() - 1,
                    generation: 0,
                }
            }
        }
    }

    /// Create a detached HTML element.
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        let name = QualName::new(None, ns!(html), LocalName::from(tag.to_ascii_lowercase().as_str()));
        self.alloc(
            None,
            NodeData::Element {
                name,
                attrs: Vec::new(),
            },
        )
    }

    /// Create a detached text node.
    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.alloc(None, NodeData::Text(text.to_string()))
    }

    /// Set (or replace) an attribute. Attribute changes are not reported to observers.
    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) -> EnricherResult<()> {
        let node = self
            .get_mut(id)
            .ok_or_else(|| EnricherError::Dom(format!("unknown node {}", id.index)))?;
        match &mut node.data {
            NodeData::Element { attrs, .. } => {
                match attrs.iter_mut().find(|(k, _)| (&*k.local).eq_ignore_ascii_case(name)) {
                    Some(slot) => slot.1 = value.to_string(),
                    None => attrs.push((
                        QualName::new(None, ns!(), LocalName::from(name)),
                        value.to_string(),
                    )),
                }
                Ok(())
            }
            _ => Err(EnricherError::Dom(format!(
                "node {} is not an element",
                id.index
            ))),
        }
    }

    /// Append `child` as the last child of `parent`, moving it if it is
    /// already in the tree.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> EnricherResult<()> {
        self.check_insert(parent, child)?;
        self.take_from_parent(child);
        self.link(parent, child, None);
        self.notify_added(parent, child);
        Ok(())
    }

    /// Insert `new` as the sibling immediately following `reference`.
    pub fn insert_after(&mut self, reference: NodeId, new: NodeId) -> EnricherResult<()> {
        if reference == new {
            return Err(EnricherError::Dom("a node cannot follow itself".into()));
        }
        let parent = self
            .parent(reference)
            .ok_or_else(|| EnricherError::Dom(format!("node {} has no parent", reference.index)))?;
        self.check_insert(parent, new)?;
        self.take_from_parent(new);
        // Moving `new` out may shift `reference` within the same parent.
        let pos = self
            .children(parent)
            .iter()
            .position(|&c| c == reference)
            .ok_or_else(|| EnricherError::Dom("reference is not a child of its parent".into()))?;
        self.link(parent, new, Some(pos + 1));
        self.notify_added(parent, new);
        Ok(())
    }

    /// Detach a node (and its subtree) from the tree. The subtree stays
    /// valid and can be inserted again.
    pub fn remove(&mut self, id: NodeId) -> EnricherResult<()> {
        self.node(id)?;
        self.take_from_parent(id);
        Ok(())
    }

    /// Detach a node and free its whole subtree. Handles into the subtree
    /// stop resolving. Returns how many nodes were freed.
    pub fn discard(&mut self, id: NodeId) -> EnricherResult<usize> {
        if id == self.root() {
            return Err(EnricherError::Dom("the root cannot be discarded".into()));
        }
        self.remove(id)?;

        let doomed: Vec<NodeId> = std::iter::once(id).chain(self.descendants(id)).collect();
        for &node in &doomed {
            let slot = &mut self.slots[node.index];
            slot.node = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(node.index);
        }
        Ok(doomed.len())
    }

    fn check_insert(&self, parent: NodeId, child: NodeId) -> EnricherResult<()> {
        let parent_node = self.node(parent)?;
        self.node(child)?;
        if !matches!(parent_node.data, NodeData::Document | NodeData::Element { .. }) {
            return Err(EnricherError::Dom("only elements can have children".into()));
        }
        if child == self.root() {
            return Err(EnricherError::Dom("the root cannot be re-parented".into()));
        }
        let mut current = Some(parent);
        while let Some(node) = current {
            if node == child {
                return Err(EnricherError::Dom(
                    "cannot insert a node into its own subtree".into(),
                ));
            }
            current = self.parent(node);
        }
        Ok(())
    }

    fn link(&mut self, parent: NodeId, child: NodeId, at: Option<usize>) {
        if let Some(node) = self.get_mut(child) {
            node.parent = Some(parent);
        }
        if let Some(node) = self.get_mut(parent) {
            match at {
                Some(pos) => node.children.insert(pos, child),
                None => node.children.push(child),
            }
        }
    }

    /// Unlink a node from its parent, reporting the removal if the parent
    /// was attached.
    fn take_from_parent(&mut self, id: NodeId) {
        let Some(parent) = self.parent(id) else {
            return;
        };
        let was_attached = self.is_attached(parent);
        if let Some(node) = self.get_mut(id) {
            node.parent = None;
        }
        if let Some(node) = self.get_mut(parent) {
            node.children.retain(|&c| c != id);
        }
        if was_attached {
            self.notify(MutationRecord {
                target: parent,
                added: Vec::new(),
                removed: vec![id],
            });
        }
    }

    fn notify_added(&mut self, parent: NodeId, child: NodeId) {
        if self.is_attached(parent) {
            self.notify(MutationRecord {
                target: parent,
                added: vec![child],
                removed: Vec::new(),
            });
        }
    }

    fn notify(&mut self, record: MutationRecord) {
        if self.observers.is_empty() {
            return;
        }
        self.observers.retain(|tx| tx.send(record.clone()).is_ok());
    }

    // ── Serialization ──────────────────────────────────────────

    /// Serialize the whole document.
    pub fn to_html(&self) -> EnricherResult<String> {
        self.serialize_from(self.root(), TraversalScope::ChildrenOnly(None))
    }

    /// Serialize one node and its subtree.
    pub fn outer_html(&self, id: NodeId) -> EnricherResult<String> {
        self.serialize_from(id, TraversalScope::IncludeNode)
    }

    fn serialize_from(&self, id: NodeId, traversal_scope: TraversalScope) -> EnricherResult<String> {
        self.node(id)?;
        let mut buf = Vec::new();
        let opts = SerializeOpts {
            traversal_scope,
            ..SerializeOpts::default()
        };
        serialize::serialize(&mut buf, &Subtree { doc: self, id }, opts)?;
        String::from_utf8(buf).map_err(|e| EnricherError::Dom(e.to_string()))
    }
}

impl Serialize for Document {
    fn serialize<S>(&self, serializer: &mut S, traversal_scope: TraversalScope) -> io::Result<()>
    where
        S: Serializer,
    {
        Subtree {
            doc: self,
            id: self.root(),
        }
        .serialize(serializer, traversal_scope)
    }
}

/// One node of a document, as seen by the html5ever serializer.
struct Subtree<'a> {
    doc: &'a Document,
    id: NodeId,
}

enum Edge {
    Open(NodeId),
    Close(NodeId),
}

impl Serialize for Subtree<'_> {
    fn serialize<S>(&self, serializer: &mut S, traversal_scope: TraversalScope) -> io::Result<()>
    where
        S: Serializer,
    {
        let skip_self = traversal_scope != TraversalScope::IncludeNode;
        let mut stack = vec![Edge::Open(self.id)];

        while let Some(edge) = stack.pop() {
            match edge {
                Edge::Open(id) => {
                    let Some(data) = self.doc.data(id) else {
                        continue;
                    };
                    if !(skip_self && id == self.id) {
                        match data {
                            NodeData::Document => {}
                            NodeData::Doctype(name) => serializer.write_doctype(name)?,
                            NodeData::Comment(text) => serializer.write_comment(text)?,
                            NodeData::Text(text) => serializer.write_text(text)?,
                            NodeData::Element { name, attrs } => serializer.start_elem(
                                name.clone(),
                                attrs.iter().map(|(k, v)| (k, v.as_str())),
                            )?,
                        }
                    }
                    stack.push(Edge::Close(id));
                    stack.extend(self.doc.children(id).iter().rev().map(|&c| Edge::Open(c)));
                }
                Edge::Close(id) => {
                    if skip_self && id == self.id {
                        continue;
                    }
                    if let Some(NodeData::Element { name, .. }) = self.doc.data(id) {
                        serializer.end_elem(name.clone())?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Pre-order iterator returned by [`Document::descendants`].
pub struct Descendants<'a> {
    doc: &'a Document,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.stack.pop()?;
        self.stack
            .extend(self.doc.children(id).iter().rev().copied());
        Some(id)
    }
}
