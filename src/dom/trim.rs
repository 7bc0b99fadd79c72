//! Whitespace trimming of spans
//!
//! Selections routinely start or end in whitespace (double-click selects a
//! trailing space, drag-selects pick up line breaks between paragraphs).
//! Trimming keeps markers off that whitespace.

use super::range::{Boundary, TextRange};
use super::tree::{NodeId, TextTree};

/// Move `range`'s boundaries inward past leading and trailing whitespace.
///
/// A collapsed range is returned as is. A range with no non-whitespace text
/// comes back collapsed at its end, which callers treat as nothing to
/// highlight.
pub fn trim_range<T: TextTree + ?Sized>(tree: &T, range: TextRange) -> TextRange {
    if range.is_collapsed() {
        return range;
    }

    let nodes = nodes_between(tree, range.start.node, range.end.node);

    let Some(start) = first_non_space(tree, &nodes, &range) else {
        return TextRange::collapsed_at(range.end);
    };
    let end = last_non_space(tree, &nodes, &range, start).unwrap_or(start);

    TextRange::new(start, end)
}

/// Text nodes from `first` to `last` inclusive, in document order
fn nodes_between<T: TextTree + ?Sized>(tree: &T, first: NodeId, last: NodeId) -> Vec<NodeId> {
    let all = tree.text_nodes();
    let from = all.iter().position(|n| *n == first);
    let to = all.iter().position(|n| *n == last);
    match (from, to) {
        (Some(from), Some(to)) if from <= to => all[from..=to].to_vec(),
        // Boundaries outside content text (or reversed): only trust the
        // boundary nodes themselves.
        _ if first == last => vec![first],
        _ => vec![first, last],
    }
}

/// The part of `node`'s text that lies inside `range`, as (from, to)
fn clip<T: TextTree + ?Sized>(tree: &T, node: NodeId, range: &TextRange) -> (usize, usize) {
    let len = tree.text(node).map(str::len).unwrap_or(0);
    let from = if node == range.start.node {
        range.start.offset.min(len)
    } else {
        0
    };
    let to = if node == range.end.node {
        range.end.offset.min(len)
    } else {
        len
    };
    (from, to.max(from))
}

fn first_non_space<T: TextTree + ?Sized>(
    tree: &T,
    nodes: &[NodeId],
    range: &TextRange,
) -> Option<Boundary> {
    nodes.iter().find_map(|node| {
        let text = tree.text(*node)?;
        let (from, to) = clip(tree, *node, range);
        text.get(from..to)?
            .char_indices()
            .find(|(_, c)| !c.is_whitespace())
            .map(|(i, _)| Boundary::new(*node, from + i))
    })
}

fn last_non_space<T: TextTree + ?Sized>(
    tree: &T,
    nodes: &[NodeId],
    range: &TextRange,
    start: Boundary,
) -> Option<Boundary> {
    let start_index = nodes.iter().position(|n| *n == start.node)?;
    nodes[start_index..].iter().rev().find_map(|node| {
        let text = tree.text(*node)?;
        let (mut from, to) = clip(tree, *node, range);
        if *node == start.node {
            from = start.offset;
        }
        text.get(from..to)?
            .char_indices()
            .rev()
            .find(|(_, c)| !c.is_whitespace())
            .map(|(i, c)| Boundary::new(*node, from + i + c.len_utf8()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{Document, TextIndex};

    fn trimmed_text(html: &str, start: usize, end: usize) -> (String, bool) {
        let doc = Document::parse(html).unwrap();
        let index = TextIndex::build(&doc);
        let range = index.range(start, end).unwrap();
        let trimmed = trim_range(&doc, range);
        let text = index.range_text(&trimmed).unwrap().to_string();
        (text, trimmed.is_collapsed())
    }

    #[test]
    fn test_collapsed_is_unchanged() {
        let doc = Document::parse("<p>abc</p>").unwrap();
        let index = TextIndex::build(&doc);
        let range = index.range(1, 1).unwrap();
        assert_eq!(trim_range(&doc, range), range);
    }

    #[test]
    fn test_trim_within_single_node() {
        assert_eq!(trimmed_text("<p>  hello  </p>", 0, 9), ("hello".to_string(), false));
    }

    #[test]
    fn test_already_trimmed() {
        assert_eq!(trimmed_text("<p>hello world</p>", 0, 5), ("hello".to_string(), false));
    }

    #[test]
    fn test_trim_across_nodes() {
        // Start sits in a whitespace-only node, end in one too
        let html = "<div><p>one</p>\n  <p>two</p>\n  <p>three</p></div>";
        let doc = Document::parse(html).unwrap();
        let index = TextIndex::build(&doc);
        assert_eq!(index.text(), "one\n  two\n  three");
        let (text, _) = trimmed_text(html, 3, 12);
        assert_eq!(text, "two");
    }

    #[test]
    fn test_whitespace_only_collapses() {
        let (text, collapsed) = trimmed_text("<p>a <b>  </b> b</p>", 1, 5);
        assert!(collapsed);
        assert_eq!(text, "");
    }

    #[test]
    fn test_multibyte_edges() {
        assert_eq!(trimmed_text("<p> café </p>", 0, 7), ("café".to_string(), false));
    }
}
