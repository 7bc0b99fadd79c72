//! Quote matching
//!
//! Finds the occurrence of an annotation's quote that best agrees with its
//! stored context. Every candidate is ranked by a composite score:
//!
//! ```text
//! (50 * quote + 20 * prefix + 20 * suffix + 2 * position) / 92
//! ```
//!
//! - `quote`: `1 - errors / quote_chars`
//! - `prefix` / `suffix`: similarity of the equally sized window of text
//!   before / after the candidate (1.0 when no context was stored)
//! - `position`: `1 - |start - hint| / text_len` (1.0 without a hint)
//!
//! The position weight is small: it only separates candidates that the
//! quote and context cannot tell apart.
//!
//! The reported score is 1.0 for an exact occurrence and the composite for
//! an approximate one, so a hint or stored context never makes an exact
//! match look fuzzy.

use serde::{Deserialize, Serialize};

use super::approx;

const QUOTE_WEIGHT: f64 = 50.0;
const PREFIX_WEIGHT: f64 = 20.0;
const SUFFIX_WEIGHT: f64 = 20.0;
const POSITION_WEIGHT: f64 = 2.0;
const MAX_SCORE: f64 = QUOTE_WEIGHT + PREFIX_WEIGHT + SUFFIX_WEIGHT + POSITION_WEIGHT;

/// Tuning for the quote matcher
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatcherConfig {
    /// Largest fraction of the quote's chars that may differ (0.0-1.0)
    pub max_error_ratio: f64,
    /// Hard cap on edits regardless of quote length
    pub max_errors: usize,
    /// Composite score a candidate needs to be returned
    pub min_score: f64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            max_error_ratio: 0.5,
            max_errors: 256,
            min_score: 0.5,
        }
    }
}

/// A located quote, in byte offsets of the searched text
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub start: usize,
    pub end: usize,
    /// 1.0 for an exact match; lower for approximate matches
    pub score: f64,
}

/// Context used to rank candidates
#[derive(Debug, Clone, Copy, Default)]
pub struct QuoteContext<'a> {
    pub prefix: Option<&'a str>,
    pub suffix: Option<&'a str>,
    /// Approximate byte offset of the quote's start
    pub position_hint: Option<usize>,
}

/// Quote matcher with its tuning
#[derive(Debug, Clone, Default)]
pub struct QuoteMatcher {
    config: MatcherConfig,
}

/// Find `quote` in `text` with the default tuning.
pub fn match_quote(
    text: &str,
    quote: &str,
    prefix: Option<&str>,
    suffix: Option<&str>,
    position_hint: Option<usize>,
) -> Option<MatchResult> {
    QuoteMatcher::default().find(
        text,
        quote,
        &QuoteContext {
            prefix,
            suffix,
            position_hint,
        },
    )
}

impl QuoteMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Best-scoring occurrence of `quote`, or `None` when nothing clears
    /// the threshold.
    pub fn find(
        &self,
        text: &str,
        quote: &str,
        context: &QuoteContext<'_>,
    ) -> Option<MatchResult> {
        let quote_chars: Vec<char> = quote.chars().collect();
        if quote_chars.is_empty() || text.is_empty() {
            return None;
        }

        let text_chars: Vec<char> = text.chars().collect();
        let byte_offsets: Vec<usize> = text
            .char_indices()
            .map(|(offset, _)| offset)
            .chain(std::iter::once(text.len()))
            .collect();

        let ratio = self.config.max_error_ratio.clamp(0.0, 1.0);
        let max_errors =
            ((quote_chars.len() as f64 * ratio).floor() as usize).min(self.config.max_errors);

        let prefix: Option<Vec<char>> = context
            .prefix
            .filter(|p| !p.is_empty())
            .map(|p| p.chars().collect());
        let suffix: Option<Vec<char>> = context
            .suffix
            .filter(|s| !s.is_empty())
            .map(|s| s.chars().collect());

        // (result, composite, distance from the hint)
        let mut best: Option<(MatchResult, f64, usize)> = None;

        for candidate in approx::search(&text_chars, &quote_chars, max_errors) {
            let quote_score = 1.0 - candidate.errors as f64 / quote_chars.len() as f64;

            let prefix_score = prefix.as_ref().map_or(1.0, |p| {
                let from = candidate.start.saturating_sub(p.len());
                approx::similarity(&text_chars[from..candidate.start], p)
            });
            let suffix_score = suffix.as_ref().map_or(1.0, |s| {
                let to = (candidate.end + s.len()).min(text_chars.len());
                approx::similarity(&text_chars[candidate.end..to], s)
            });

            let start = byte_offsets[candidate.start];
            let end = byte_offsets[candidate.end];
            let distance = context.position_hint.map_or(0, |hint| start.abs_diff(hint));
            let position_score = match context.position_hint {
                Some(_) => (1.0 - distance as f64 / text.len() as f64).max(0.0),
                None => 1.0,
            };

            let composite = (QUOTE_WEIGHT * quote_score
                + PREFIX_WEIGHT * prefix_score
                + SUFFIX_WEIGHT * suffix_score
                + POSITION_WEIGHT * position_score)
                / MAX_SCORE;

            if composite < self.config.min_score {
                continue;
            }

            let better = match &best {
                None => true,
                Some((_, current, current_distance)) => match composite.total_cmp(current) {
                    std::cmp::Ordering::Greater => true,
                    std::cmp::Ordering::Less => false,
                    // Candidates arrive in start order, so keeping the
                    // incumbent on a full tie keeps the lowest start.
                    std::cmp::Ordering::Equal => distance < *current_distance,
                },
            };
            if better {
                let score = if candidate.errors == 0 { 1.0 } else { composite };
                best = Some((MatchResult { start, end, score }, composite, distance));
            }
        }

        best.map(|(result, _, _)| result)
    }
}
