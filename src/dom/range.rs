//! Spans over the document tree and their plain-text coordinates

use serde::{Deserialize, Serialize};

use super::tree::{NodeId, TextTree};

/// A position inside a text node (byte offset into its text)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Boundary {
    pub node: NodeId,
    pub offset: usize,
}

impl Boundary {
    pub fn new(node: NodeId, offset: usize) -> Self {
        Self { node, offset }
    }
}

/// A span between two text-node boundaries, start before end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextRange {
    pub start: Boundary,
    pub end: Boundary,
}

impl TextRange {
    pub fn new(start: Boundary, end: Boundary) -> Self {
        Self { start, end }
    }

    /// Empty span at a single position
    pub fn collapsed_at(at: Boundary) -> Self {
        Self { start: at, end: at }
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }
}

/// Plain-text offsets of a span within the document text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextPosition {
    pub start: usize,
    pub end: usize,
}

/// The document text together with where each text node sits in it.
///
/// A snapshot: it must be rebuilt after the tree changes.
#[derive(Debug, Clone)]
pub struct TextIndex {
    text: String,
    /// (text node, byte offset of its first char in `text`)
    segments: Vec<(NodeId, usize)>,
}

impl TextIndex {
    pub fn build<T: TextTree + ?Sized>(tree: &T) -> Self {
        let mut text = String::new();
        let mut segments = Vec::new();
        for node in tree.text_nodes() {
            segments.push((node, text.len()));
            text.push_str(tree.text(node).unwrap_or_default());
        }
        Self { text, segments }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Text nodes in document order
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.segments.iter().map(|(node, _)| *node)
    }

    fn segment_len(&self, index: usize) -> usize {
        let start = self.segments[index].1;
        let end = self
            .segments
            .get(index + 1)
            .map(|(_, offset)| *offset)
            .unwrap_or(self.text.len());
        end - start
    }

    /// Resolve a document offset to a start boundary. At a seam between two
    /// text nodes the later node wins, and empty nodes are passed over.
    pub fn start_boundary(&self, offset: usize) -> Option<Boundary> {
        if offset > self.text.len() {
            return None;
        }
        self.segments
            .iter()
            .enumerate()
            .find(|(i, (_, start))| offset >= *start && offset < start + self.segment_len(*i))
            .map(|(_, (node, start))| Boundary::new(*node, offset - start))
            .or_else(|| self.end_boundary(offset))
    }

    /// Resolve a document offset to an end boundary. At a seam between two
    /// text nodes the earlier node wins.
    pub fn end_boundary(&self, offset: usize) -> Option<Boundary> {
        if offset > self.text.len() {
            return None;
        }
        self.segments
            .iter()
            .enumerate()
            .find(|(i, (_, start))| {
                let len = self.segment_len(*i);
                len > 0 && offset > *start && offset <= start + len
            })
            .or_else(|| self.segments.iter().enumerate().find(|(_, (_, start))| *start == offset))
            .map(|(_, (node, start))| Boundary::new(*node, offset - start))
    }

    /// Span covering `[start, end)` of the document text
    pub fn range(&self, start: usize, end: usize) -> Option<TextRange> {
        if start > end {
            return None;
        }
        let start_boundary = self.start_boundary(start)?;
        if start == end {
            return Some(TextRange::collapsed_at(start_boundary));
        }
        Some(TextRange::new(start_boundary, self.end_boundary(end)?))
    }

    /// Document offset of a boundary
    pub fn offset_of(&self, boundary: Boundary) -> Option<usize> {
        self.segments
            .iter()
            .find(|(node, _)| *node == boundary.node)
            .map(|(_, start)| start + boundary.offset)
    }

    /// Document offsets of a span
    pub fn position_of(&self, range: &TextRange) -> Option<TextPosition> {
        Some(TextPosition {
            start: self.offset_of(range.start)?,
            end: self.offset_of(range.end)?,
        })
    }

    /// Text covered by a span
    pub fn range_text(&self, range: &TextRange) -> Option<&str> {
        let position = self.position_of(range)?;
        self.text.get(position.start..position.end)
    }
}
