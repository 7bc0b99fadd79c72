//! Document tree access
//!
//! The anchoring code never owns the document. It reads it through
//! [`TextTree`] and only the highlighter gets [`TextTreeMut`].

use crate::error::Result;

/// Handle to a node of a document tree.
///
/// Handles are plain indices: they stay valid (but possibly detached) after
/// the node is removed from the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

/// Elements whose text is never part of the document text
pub const NON_CONTENT_TAGS: &[&str] = &["script", "style", "template", "head"];

/// Read access to a document tree
pub trait TextTree {
    /// Root node (the document itself)
    fn root(&self) -> NodeId;

    fn parent(&self, node: NodeId) -> Option<NodeId>;

    /// Child nodes in document order
    fn children(&self, node: NodeId) -> Vec<NodeId>;

    /// Element tag name, `None` for text nodes
    fn tag_name(&self, node: NodeId) -> Option<&str>;

    /// Text content of a text node, `None` for elements
    fn text(&self, node: NodeId) -> Option<&str>;

    fn attribute(&self, node: NodeId, name: &str) -> Option<&str>;

    fn is_text(&self, node: NodeId) -> bool {
        self.text(node).is_some()
    }

    /// Whether `node` is still reachable from the root
    fn is_attached(&self, node: NodeId) -> bool {
        let root = self.root();
        let mut current = Some(node);
        while let Some(n) = current {
            if n == root {
                return true;
            }
            current = self.parent(n);
        }
        false
    }

    /// Whether `node` carries `class` in its class attribute
    fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.attribute(node, "class")
            .map(|classes| classes.split_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }

    /// Content text nodes under `node`, in document order
    fn text_nodes_under(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![node];
        while let Some(n) = stack.pop() {
            if self.is_text(n) {
                out.push(n);
                continue;
            }
            if self
                .tag_name(n)
                .map(|tag| NON_CONTENT_TAGS.contains(&tag))
                .unwrap_or(false)
            {
                continue;
            }
            stack.extend(self.children(n).into_iter().rev());
        }
        out
    }

    /// All content text nodes of the document, in document order
    fn text_nodes(&self) -> Vec<NodeId> {
        self.text_nodes_under(self.root())
    }

    /// Concatenated content text under `node`
    fn text_content(&self, node: NodeId) -> String {
        self.text_nodes_under(node)
            .into_iter()
            .filter_map(|n| self.text(n))
            .collect()
    }
}

/// Mutation access to a document tree, reserved for the highlighter
pub trait TextTreeMut: TextTree {
    /// Split a text node at a byte offset. The original node keeps
    /// `[..offset]`; the returned node holds `[offset..]` and is inserted
    /// right after it.
    fn split_text(&mut self, node: NodeId, offset: usize) -> Result<NodeId>;

    /// Create a detached element
    fn create_element(&mut self, tag: &str) -> NodeId;

    /// Insert `child` into `parent` before `reference`, or at the end.
    /// `child` is detached from its current parent first.
    fn insert_before(&mut self, parent: NodeId, child: NodeId, reference: Option<NodeId>);

    /// Remove `node` from its parent; the subtree stays intact.
    fn detach(&mut self, node: NodeId);

    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str);

    fn remove_attribute(&mut self, node: NodeId, name: &str);

    /// Merge adjacent text children of `node` and drop empty ones.
    fn merge_text(&mut self, node: NodeId);
}
