//! In-memory document tree
//!
//! Arena of nodes addressed by [`NodeId`]. Parsed from XHTML chapter
//! content with roxmltree and serialized back for display or storage.

use crate::error::{AnchorError, Result};

use super::tree::{NodeId, TextTree, TextTreeMut};

/// Tag of the synthetic root node
const DOCUMENT_TAG: &str = "#document";

/// Elements serialized without a closing tag
const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

#[derive(Debug, Clone)]
enum NodeData {
    Element {
        tag: String,
        attributes: Vec<(String, String)>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    data: NodeData,
}

/// An owned, mutable document tree
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty document
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                parent: None,
                children: Vec::new(),
                data: NodeData::Element {
                    tag: DOCUMENT_TAG.to_string(),
                    attributes: Vec::new(),
                },
            }],
        }
    }

    /// Parse XHTML (well-formed XML) content.
    ///
    /// Named HTML entities such as `&nbsp;` are not XML and will fail to
    /// parse; chapter content is expected to use numeric references.
    pub fn parse(xhtml: &str) -> Result<Self> {
        let parsed = roxmltree::Document::parse(xhtml)?;
        let mut document = Self::new();
        let root = document.root();
        document.import(parsed.root_element(), root);
        Ok(document)
    }

    fn import(&mut self, source: roxmltree::Node<'_, '_>, parent: NodeId) {
        if source.is_text() {
            if let Some(text) = source.text() {
                let id = self.push(NodeData::Text(text.to_string()));
                self.insert_before(parent, id, None);
            }
            return;
        }
        if !source.is_element() {
            return;
        }

        let attributes = source
            .attributes()
            .map(|attr| (attr.name().to_string(), attr.value().to_string()))
            .collect();
        let id = self.push(NodeData::Element {
            tag: source.tag_name().name().to_string(),
            attributes,
        });
        self.insert_before(parent, id, None);

        for child in source.children() {
            self.import(child, id);
        }
    }

    fn push(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent: None,
            children: Vec::new(),
            data,
        });
        id
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    /// First element with the given tag, in document order
    pub fn find_element(&self, tag: &str) -> Option<NodeId> {
        let mut stack = vec![self.root()];
        while let Some(n) = stack.pop() {
            if self.tag_name(n) == Some(tag) {
                return Some(n);
            }
            stack.extend(self.children(n).into_iter().rev());
        }
        None
    }

    /// Serialize the attached tree back to markup
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for child in self.children(self.root()) {
            self.write_node(child, &mut out);
        }
        out
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        let Some(node) = self.node(id) else {
            return;
        };
        match &node.data {
            NodeData::Text(text) => out.push_str(&html_escape::encode_text(text)),
            NodeData::Element { tag, attributes } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attributes {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&html_escape::encode_double_quoted_attribute(value));
                    out.push('"');
                }
                if node.children.is_empty() && VOID_TAGS.contains(&tag.as_str()) {
                    out.push_str("/>");
                    return;
                }
                out.push('>');
                for child in &node.children {
                    self.write_node(*child, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }
}

impl TextTree for Document {
    fn root(&self) -> NodeId {
        NodeId(0)
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.node(node).and_then(|n| n.parent)
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.node(node).map(|n| n.children.clone()).unwrap_or_default()
    }

    fn tag_name(&self, node: NodeId) -> Option<&str> {
        match &self.node(node)?.data {
            NodeData::Element { tag, .. } => Some(tag.as_str()),
            NodeData::Text(_) => None,
        }
    }

    fn text(&self, node: NodeId) -> Option<&str> {
        match &self.node(node)?.data {
            NodeData::Text(text) => Some(text.as_str()),
            NodeData::Element { .. } => None,
        }
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<&str> {
        match &self.node(node)?.data {
            NodeData::Element { attributes, .. } => attributes
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.as_str()),
            NodeData::Text(_) => None,
        }
    }
}

impl TextTreeMut for Document {
    fn split_text(&mut self, node: NodeId, offset: usize) -> Result<NodeId> {
        let tail = match self.nodes.get_mut(node.0).map(|n| &mut n.data) {
            Some(NodeData::Text(text)) => {
                if offset > text.len() || !text.is_char_boundary(offset) {
                    return Err(AnchorError::InvalidBoundary(format!(
                        "cannot split text node {:?} at {}",
                        node, offset
                    )));
                }
                text.split_off(offset)
            }
            _ => {
                return Err(AnchorError::InvalidBoundary(format!(
                    "{:?} is not a text node",
                    node
                )))
            }
        };

        let tail_id = self.push(NodeData::Text(tail));
        if let Some(parent) = self.parent(node) {
            let next = self.next_sibling(node);
            self.insert_before(parent, tail_id, next);
        }
        Ok(tail_id)
    }

    fn create_element(&mut self, tag: &str) -> NodeId {
        self.push(NodeData::Element {
            tag: tag.to_string(),
            attributes: Vec::new(),
        })
    }

    fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
        if self.node(parent).is_none() || self.node(child).is_none() || parent == child {
            return;
        }
        self.detach(child);

        let siblings = &mut self.nodes[parent.0].children;
        let index = reference
            .and_then(|r| siblings.iter().position(|c| *c == r))
            .unwrap_or(siblings.len());
        siblings.insert(index, child);
        self.nodes[child.0].parent = Some(parent);
    }

    fn detach(&mut self, node: NodeId) {
        let Some(parent) = self.parent(node) else {
            return;
        };
        self.nodes[parent.0].children.retain(|c| *c != node);
        self.nodes[node.0].parent = None;
    }

    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        if let Some(NodeData::Element { attributes, .. }) =
            self.nodes.get_mut(node.0).map(|n| &mut n.data)
        {
            match attributes.iter_mut().find(|(n, _)| n == name) {
                Some((_, v)) => *v = value.to_string(),
                None => attributes.push((name.to_string(), value.to_string())),
            }
        }
    }

    fn remove_attribute(&mut self, node: NodeId, name: &str) {
        if let Some(NodeData::Element { attributes, .. }) =
            self.nodes.get_mut(node.0).map(|n| &mut n.data)
        {
            attributes.retain(|(n, _)| n != name);
        }
    }

    fn merge_text(&mut self, node: NodeId) {
        let children = self.children(node);
        let mut kept: Vec<NodeId> = Vec::with_capacity(children.len());

        for child in children {
            let Some(text) = self.text(child).map(str::to_string) else {
                kept.push(child);
                continue;
            };
            if text.is_empty() {
                self.nodes[child.0].parent = None;
                continue;
            }
            let previous_text = kept.last().copied().filter(|prev| self.is_text(*prev));
            match previous_text {
                Some(prev) => {
                    if let NodeData::Text(existing) = &mut self.nodes[prev.0].data {
                        existing.push_str(&text);
                    }
                    self.nodes[child.0].parent = None;
                }
                None => kept.push(child),
            }
        }

        if let Some(n) = self.nodes.get_mut(node.0) {
            n.children = kept;
        }
    }
}

impl Document {
    fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let parent = self.parent(node)?;
        let siblings = &self.nodes[parent.0].children;
        let index = siblings.iter().position(|c| *c == node)?;
        siblings.get(index + 1).copied()
    }
}
