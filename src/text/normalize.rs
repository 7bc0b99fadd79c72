//! Unicode-aware offset translation
//!
//! Fuzzy matching runs over a canonicalized view of the document text
//! (compatibility-decomposed, whitespace collapsed). Results found in that
//! view are carried back to the raw text by counting "significant" chars:
//! the n-th non-whitespace char of the view is the n-th non-whitespace char
//! of the raw text, whatever happened to the whitespace in between.

use std::collections::HashMap;
use std::sync::OnceLock;

use parking_lot::RwLock;
use unicode_normalization::char::decompose_compatible;
use unicode_normalization::UnicodeNormalization;

/// Number of chars each codepoint expands to under NFKD.
///
/// Grows with the set of distinct codepoints seen, not with input length.
static DECOMPOSED_LEN: OnceLock<RwLock<HashMap<char, usize>>> = OnceLock::new();

/// Options for [`translate_offsets`]
#[derive(Debug, Clone, Copy, Default)]
pub struct TranslateOptions {
    /// Compare both buffers under NFKD
    pub normalize: bool,
}

/// Normalize text to NFKD
pub fn normalize_text(text: &str) -> String {
    text.nfkd().collect()
}

/// Build the view the quote matcher searches: NFKD with every run of
/// whitespace collapsed to a single space.
pub fn search_view(text: &str) -> String {
    let mut view = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.nfkd() {
        if c.is_whitespace() {
            if !in_space {
                view.push(' ');
            }
            in_space = true;
        } else {
            view.push(c);
            in_space = false;
        }
    }
    view
}

/// Predicate used by the anchoring flow: only non-whitespace chars count.
pub fn is_significant(c: char) -> bool {
    !c.is_whitespace()
}

/// Map the `[start, end)` byte range of `input` onto `output`.
///
/// `output` must be a transformed view of the same content. Offsets are
/// clamped to `input`, snapped to char boundaries, and `end` is raised to
/// `start` if needed. The returned pair is always ordered and within
/// `output`. Never fails.
pub fn translate_offsets<F>(
    input: &str,
    output: &str,
    start: usize,
    end: usize,
    filter: F,
    options: TranslateOptions,
) -> (usize, usize)
where
    F: Fn(char) -> bool,
{
    let start = floor_char_boundary(input, start.min(input.len()));
    let end = floor_char_boundary(input, end.min(input.len())).max(start);

    let input_view = OffsetTable::new(input, options.normalize);
    let output_view = OffsetTable::new(output, options.normalize);

    let start_count = input_view.count_before(input_view.to_normalized(start), &filter);
    let end_count = input_view.count_before(input_view.to_normalized(end), &filter);

    let out_start = output_view.to_raw_start(output_view.nth_start(start_count, &filter));
    let out_end = output_view.to_raw_end(output_view.nth_end(end_count, &filter));

    (out_start, out_end.max(out_start))
}

/// Largest char boundary `<= index`
pub fn floor_char_boundary(text: &str, index: usize) -> usize {
    let mut index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn decomposed_len(c: char) -> usize {
    if c.is_ascii() {
        return 1;
    }
    let cache = DECOMPOSED_LEN.get_or_init(Default::default);
    if let Some(len) = cache.read().get(&c) {
        return *len;
    }
    let mut len = 0;
    decompose_compatible(c, |_| len += 1);
    cache.write().insert(c, len);
    len
}

/// A text buffer together with its (optionally normalized) char sequence
/// and the tables linking the two coordinate systems.
struct OffsetTable {
    chars: Vec<char>,
    /// Raw byte offset of the char that produced each normalized char
    raw_start: Vec<usize>,
    /// Raw byte offset just past the char that produced each normalized char
    raw_end: Vec<usize>,
    raw_len: usize,
    /// Raw byte offset of every raw char, with the normalized index it maps to
    forward: Vec<(usize, usize)>,
}

impl OffsetTable {
    fn new(raw: &str, normalize: bool) -> Self {
        let chars: Vec<char> = if normalize {
            raw.nfkd().collect()
        } else {
            raw.chars().collect()
        };

        let mut raw_start = Vec::with_capacity(chars.len());
        let mut raw_end = Vec::with_capacity(chars.len());
        let mut forward = Vec::with_capacity(raw.len());
        let mut normalized = 0;

        for (offset, c) in raw.char_indices() {
            let width = if normalize { decomposed_len(c) } else { 1 };
            forward.push((offset, normalized));
            for _ in 0..width {
                raw_start.push(offset);
                raw_end.push(offset + c.len_utf8());
            }
            normalized += width;
        }

        Self {
            chars,
            raw_start,
            raw_end,
            raw_len: raw.len(),
            forward,
        }
    }

    fn to_normalized(&self, raw_offset: usize) -> usize {
        match self.forward.binary_search_by_key(&raw_offset, |(offset, _)| *offset) {
            Ok(i) => self.forward[i].1,
            Err(_) => self.chars.len(),
        }
    }

    fn count_before<F: Fn(char) -> bool>(&self, index: usize, filter: &F) -> usize {
        self.chars[..index.min(self.chars.len())]
            .iter()
            .filter(|c| filter(**c))
            .count()
    }

    /// Index of the passing char preceded by exactly `n` passing chars
    fn nth_start<F: Fn(char) -> bool>(&self, n: usize, filter: &F) -> usize {
        let mut seen = 0;
        for (i, c) in self.chars.iter().enumerate() {
            if filter(*c) {
                if seen == n {
                    return i;
                }
                seen += 1;
            }
        }
        self.chars.len()
    }

    /// Index just past the `n`-th passing char
    fn nth_end<F: Fn(char) -> bool>(&self, n: usize, filter: &F) -> usize {
        if n == 0 {
            return 0;
        }
        let mut seen = 0;
        for (i, c) in self.chars.iter().enumerate() {
            if filter(*c) {
                seen += 1;
                if seen == n {
                    return i + 1;
                }
            }
        }
        self.chars.len()
    }

    fn to_raw_start(&self, index: usize) -> usize {
        self.raw_start.get(index).copied().unwrap_or(self.raw_len)
    }

    fn to_raw_end(&self, index: usize) -> usize {
        match index {
            0 => 0,
            i => self.raw_end.get(i - 1).copied().unwrap_or(self.raw_len),
        }
    }
}
