//! Highlight markers over the document tree
//!
//! A highlight wraps every text node of a span in its own marker element
//! tagged with the annotation id. Removing a highlight moves the wrapped
//! nodes back out and merges the pieces that were split off when applying.
//! Overlapping highlights nest: a later marker may sit inside an earlier one.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dom::{NodeId, TextRange, TextTree, TextTreeMut};
use crate::error::{AnchorError, Result};

/// Configuration for highlight markers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightConfig {
    /// Element name of the marker
    pub tag: String,
    /// CSS class every marker carries
    pub class: String,
    /// Attribute holding the annotation id
    pub id_attribute: String,
    /// Extra class while the highlight is focused
    pub focused_class: String,
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self {
            tag: "amnesia-highlight".to_string(),
            class: "amnesia-highlight".to_string(),
            id_attribute: "data-annotation-id".to_string(),
            focused_class: "amnesia-highlight-focused".to_string(),
        }
    }
}

/// Markers placed for one annotation, in document order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Highlight {
    pub annotation_id: String,
    pub elements: Vec<NodeId>,
}

/// Places and removes highlight markers, at most one highlight per id
#[derive(Debug, Default)]
pub struct Highlighter {
    config: HighlightConfig,
    highlights: HashMap<String, Highlight>,
}

impl Highlighter {
    pub fn new(config: HighlightConfig) -> Self {
        Self {
            config,
            highlights: HashMap::new(),
        }
    }

    pub fn config(&self) -> &HighlightConfig {
        &self.config
    }

    /// Wrap the text of `range` in markers for `annotation_id`.
    ///
    /// Boundary text nodes are split where the boundary falls inside them.
    /// Empty text nodes are left alone, so a span over nothing but empty
    /// nodes yields a highlight with no elements.
    pub fn apply<T: TextTreeMut + ?Sized>(
        &self,
        tree: &mut T,
        range: TextRange,
        annotation_id: &str,
    ) -> Result<Highlight> {
        if range.is_collapsed() {
            return Err(AnchorError::EmptySpan);
        }
        let (start, end) = (range.start, range.end);

        // End first: splitting the start node afterwards cannot move the end.
        let end_len = text_len(&*tree, end.node);
        if end.offset > 0 && end.offset < end_len {
            tree.split_text(end.node, end.offset)?;
        }

        let mut first = start.node;
        let mut last = end.node;
        let mut skip_first = false;
        let start_len = text_len(&*tree, start.node);
        if start.offset >= start_len && start_len > 0 {
            skip_first = true;
        } else if start.offset > 0 {
            first = tree.split_text(start.node, start.offset)?;
            if start.node == end.node {
                last = first;
            }
        }
        let skip_last = end.offset == 0 && first != last;

        let nodes = tree.text_nodes();
        let (Some(from), Some(to)) = (
            nodes.iter().position(|n| *n == first),
            nodes.iter().position(|n| *n == last),
        ) else {
            return Err(AnchorError::InvalidBoundary(format!(
                "range {:?}..{:?} is not in content text",
                first, last
            )));
        };
        if from > to {
            return Err(AnchorError::InvalidBoundary(format!(
                "range start {:?} is after its end {:?}",
                first, last
            )));
        }

        let mut targets = &nodes[from..=to];
        if skip_first {
            targets = &targets[1..];
        }
        if skip_last && !targets.is_empty() {
            targets = &targets[..targets.len() - 1];
        }

        let mut elements = Vec::new();
        for node in targets {
            if text_len(&*tree, *node) == 0 {
                continue;
            }
            let Some(parent) = tree.parent(*node) else {
                continue;
            };
            let marker = tree.create_element(&self.config.tag);
            tree.set_attribute(marker, "class", &self.config.class);
            tree.set_attribute(marker, &self.config.id_attribute, annotation_id);
            tree.insert_before(parent, marker, Some(*node));
            tree.insert_before(marker, *node, None);
            elements.push(marker);
        }

        debug!(
            "Placed {} markers for annotation {}",
            elements.len(),
            annotation_id
        );

        Ok(Highlight {
            annotation_id: annotation_id.to_string(),
            elements,
        })
    }

    /// Remove the markers of `highlight`, restoring the original text nodes.
    /// Markers that are no longer in the document are skipped.
    pub fn remove<T: TextTreeMut + ?Sized>(&self, tree: &mut T, highlight: &Highlight) {
        let mut parents = BTreeSet::new();
        for marker in &highlight.elements {
            match unwrap_marker(tree, *marker) {
                Ok(parent) => {
                    parents.insert(parent);
                }
                Err(e) => debug!("Skipping marker of {}: {}", highlight.annotation_id, e),
            }
        }
        for parent in parents {
            tree.merge_text(parent);
        }
    }

    /// Toggle the focused class on the markers of `highlight`
    pub fn set_focused<T: TextTreeMut + ?Sized>(
        &self,
        tree: &mut T,
        highlight: &Highlight,
        focused: bool,
    ) {
        for marker in &highlight.elements {
            let mut classes: Vec<String> = tree
                .attribute(*marker, "class")
                .unwrap_or_default()
                .split_whitespace()
                .filter(|c| *c != self.config.focused_class)
                .map(str::to_string)
                .collect();
            if focused {
                classes.push(self.config.focused_class.clone());
            }
            tree.set_attribute(*marker, "class", &classes.join(" "));
        }
    }

    /// Highlight `range` for `annotation_id`, replacing any previous
    /// highlight of the same id
    pub fn highlight<T: TextTreeMut + ?Sized>(
        &mut self,
        tree: &mut T,
        range: TextRange,
        annotation_id: &str,
    ) -> Result<&Highlight> {
        self.unhighlight(tree, annotation_id);
        let highlight = self.apply(tree, range, annotation_id)?;
        Ok(&*self
            .highlights
            .entry(annotation_id.to_string())
            .or_insert(highlight))
    }

    /// Remove the highlight of `annotation_id`. Returns false if there was none.
    pub fn unhighlight<T: TextTreeMut + ?Sized>(
        &mut self,
        tree: &mut T,
        annotation_id: &str,
    ) -> bool {
        match self.highlights.remove(annotation_id) {
            Some(highlight) => {
                self.remove(tree, &highlight);
                true
            }
            None => false,
        }
    }

    /// Focus or unfocus the highlight of `annotation_id`. Returns false if
    /// there is none.
    pub fn set_focus<T: TextTreeMut + ?Sized>(
        &self,
        tree: &mut T,
        annotation_id: &str,
        focused: bool,
    ) -> bool {
        match self.highlights.get(annotation_id) {
            Some(highlight) => {
                self.set_focused(tree, highlight, focused);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, annotation_id: &str) -> Option<&Highlight> {
        self.highlights.get(annotation_id)
    }

    /// Ids with a live highlight, sorted
    pub fn highlighted_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.highlights.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Remove every highlight
    pub fn clear<T: TextTreeMut + ?Sized>(&mut self, tree: &mut T) {
        for (_, highlight) in std::mem::take(&mut self.highlights) {
            self.remove(tree, &highlight);
        }
    }

    /// Annotation id carried by `node`, if it is a marker
    pub fn annotation_id_of<'t, T: TextTree + ?Sized>(
        &self,
        tree: &'t T,
        node: NodeId,
    ) -> Option<&'t str> {
        if tree.tag_name(node) != Some(self.config.tag.as_str()) {
            return None;
        }
        tree.attribute(node, &self.config.id_attribute)
    }
}

fn text_len<T: TextTree + ?Sized>(tree: &T, node: NodeId) -> usize {
    tree.text(node).map(str::len).unwrap_or(0)
}

/// Move a marker's children in front of it and drop it. Returns the parent.
fn unwrap_marker<T: TextTreeMut + ?Sized>(tree: &mut T, marker: NodeId) -> Result<NodeId> {
    if !tree.is_attached(marker) {
        return Err(AnchorError::DetachedNode(marker));
    }
    let parent = tree
        .parent(marker)
        .ok_or(AnchorError::DetachedNode(marker))?;
    for child in tree.children(marker) {
        tree.insert_before(parent, child, Some(marker));
    }
    tree.detach(marker);
    Ok(parent)
}
