//! Text-level anchoring
//!
//! Quote search and offset translation over plain strings. Nothing here
//! knows about the document tree.

pub mod approx;
mod matcher;
mod normalize;

pub use matcher::{match_quote, MatchResult, MatcherConfig, QuoteContext, QuoteMatcher};
pub use normalize::{
    floor_char_boundary, is_significant, normalize_text, search_view, translate_offsets,
    TranslateOptions,
};
