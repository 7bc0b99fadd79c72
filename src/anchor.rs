//! Anchoring: from a stored annotation target to highlighted text
//!
//! [`AnchorContext`] is the surface the rest of the application talks to.
//! It owns one document, the highlights placed in it, and the frame's
//! status sync. Locating a target runs
//!
//! 1. the quote matcher over a normalized view of the document text,
//! 2. offset translation back to the raw text,
//! 3. whitespace trimming of the span,
//! 4. highlighting,
//!
//! and reports the outcome to the status tracker.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::annotations::AnnotationTarget;
use crate::config::Config;
use crate::dom::{trim_range, TextIndex, TextPosition, TextRange, TextTree, TextTreeMut};
use crate::error::{AnchorError, Result};
use crate::html::{annotation_ids_at_point, Highlighter, HitTestProvider};
use crate::status::{AnchorStatus, StatusChange, StatusSync, Subscription};
use crate::text::{
    is_significant, search_view, translate_offsets, QuoteContext, QuoteMatcher, TranslateOptions,
};

const NORMALIZED: TranslateOptions = TranslateOptions { normalize: true };

/// Result of [`AnchorContext::locate_and_highlight`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum AnchorOutcome {
    /// Highlighted at `position` of the document text
    Anchored { position: TextPosition, score: f64 },
    /// No occurrence scored above the threshold
    NoMatch,
    /// The match held nothing but whitespace
    EmptySpan,
}

impl AnchorOutcome {
    pub fn is_anchored(&self) -> bool {
        matches!(self, AnchorOutcome::Anchored { .. })
    }
}

/// A located, trimmed span not yet highlighted
#[derive(Debug, Clone, Copy)]
struct Located {
    range: TextRange,
    position: TextPosition,
    score: f64,
}

/// Anchoring state of one document
pub struct AnchorContext<D> {
    document: D,
    matcher: QuoteMatcher,
    highlighter: Highlighter,
    status: StatusSync,
    context_window: usize,
}

impl<D: TextTreeMut> AnchorContext<D> {
    pub fn new(document: D, config: &Config, status: StatusSync) -> Self {
        Self {
            document,
            matcher: QuoteMatcher::new(config.matcher.clone()),
            highlighter: Highlighter::new(config.highlight.clone()),
            status,
            context_window: config.context_window,
        }
    }

    pub fn document(&self) -> &D {
        &self.document
    }

    pub fn into_document(self) -> D {
        self.document
    }

    pub fn highlighter(&self) -> &Highlighter {
        &self.highlighter
    }

    pub fn status(&self) -> &StatusSync {
        &self.status
    }

    /// Find `target` in the document and highlight it for `annotation_id`.
    ///
    /// Any previous highlight of `annotation_id` is removed before the search,
    /// so a failed attempt leaves the annotation without markers, matching
    /// its orphaned status. The outcome is recorded as a fresh attempt in
    /// the status tracker.
    pub fn locate_and_highlight(
        &mut self,
        target: &AnnotationTarget,
        annotation_id: &str,
    ) -> AnchorOutcome {
        self.status.register(annotation_id);

        let outcome = match self.anchor(target, annotation_id) {
            Ok(located) => {
                info!(
                    "Anchored {} at {}..{} (score {:.3})",
                    annotation_id, located.position.start, located.position.end, located.score
                );
                AnchorOutcome::Anchored {
                    position: located.position,
                    score: located.score,
                }
            }
            Err(AnchorError::EmptySpan) => {
                info!("Quote of {} matched only whitespace", annotation_id);
                AnchorOutcome::EmptySpan
            }
            Err(AnchorError::NoMatch(_)) => {
                info!("No match for {}", annotation_id);
                AnchorOutcome::NoMatch
            }
            Err(e) => {
                warn!("Failed to anchor {}: {}", annotation_id, e);
                AnchorOutcome::NoMatch
            }
        };

        self.status
            .record_attempt(annotation_id, outcome.is_anchored());
        outcome
    }

    /// Remove the highlight of `annotation_id`, if any
    pub fn unhighlight(&mut self, annotation_id: &str) {
        if !self.highlighter.unhighlight(&mut self.document, annotation_id) {
            debug!("No highlight to remove for {}", annotation_id);
        }
    }

    /// Mark the highlight of `annotation_id` as focused or not
    pub fn set_highlight_focus(&mut self, annotation_id: &str, focused: bool) {
        if !self.highlighter.set_focus(&mut self.document, annotation_id, focused) {
            debug!("No highlight to focus for {}", annotation_id);
        }
    }

    /// Annotation ids highlighted at a screen point, topmost first
    pub fn annotation_ids_at_point<P: HitTestProvider + ?Sized>(
        &self,
        provider: &P,
        x: f64,
        y: f64,
    ) -> Vec<String> {
        annotation_ids_at_point(&self.document, provider, self.highlighter.config(), x, y)
    }

    pub fn get_status(&self, annotation_id: &str) -> Option<AnchorStatus> {
        self.status.status(annotation_id)
    }

    /// Call `callback` whenever an annotation's status changes. Dropping
    /// the returned handle unsubscribes.
    pub fn subscribe_to_status_changes<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&StatusChange) + Send + Sync + 'static,
    {
        self.status.subscribe(callback)
    }

    /// Describe a live span as a target that can be stored and located later
    pub fn describe(&self, range: TextRange) -> Option<AnnotationTarget> {
        describe_range(&self.document, range, self.context_window)
    }

    /// Remove every highlight and forget all status
    pub fn reset(&mut self) {
        self.highlighter.clear(&mut self.document);
        self.status.reset();
    }

    fn anchor(&mut self, target: &AnnotationTarget, annotation_id: &str) -> Result<Located> {
        // Unwrapping old markers merges text nodes, so boundaries must be
        // resolved on the tree without them.
        self.highlighter.unhighlight(&mut self.document, annotation_id);
        let located = self.locate(target)?;
        self.highlighter
            .highlight(&mut self.document, located.range, annotation_id)?;
        Ok(located)
    }

    fn locate(&self, target: &AnnotationTarget) -> Result<Located> {
        let index = TextIndex::build(&self.document);
        let raw = index.text();
        let view = search_view(raw);

        let quote = search_view(&target.quote);
        let prefix = target.prefix.as_deref().map(search_view);
        let suffix = target.suffix.as_deref().map(search_view);
        let position_hint = target
            .position_hint
            .map(|hint| translate_offsets(raw, &view, hint, hint, is_significant, NORMALIZED).0);
        let context = QuoteContext {
            prefix: prefix.as_deref(),
            suffix: suffix.as_deref(),
            position_hint,
        };

        let found = self
            .matcher
            .find(&view, &quote, &context)
            .ok_or_else(|| AnchorError::NoMatch(target.quote.clone()))?;

        let (start, end) =
            translate_offsets(&view, raw, found.start, found.end, is_significant, NORMALIZED);
        let range = index.range(start, end).ok_or_else(|| {
            AnchorError::InvalidBoundary(format!("{}..{} is outside the document text", start, end))
        })?;
        let range = trim_range(&self.document, range);
        if range.is_collapsed() {
            return Err(AnchorError::EmptySpan);
        }
        let position = index.position_of(&range).ok_or_else(|| {
            AnchorError::InvalidBoundary("trimmed range left the document text".to_string())
        })?;

        Ok(Located {
            range,
            position,
            score: found.score,
        })
    }
}

/// Build a target for the text of `range`: the exact quote, up to `window`
/// chars of context on each side, and its start offset as position hint.
///
/// `None` for an empty span or one outside the document's content text.
pub fn describe_range<T: TextTree + ?Sized>(
    tree: &T,
    range: TextRange,
    window: usize,
) -> Option<AnnotationTarget> {
    let index = TextIndex::build(tree);
    let position = index.position_of(&range)?;
    let text = index.text();
    let quote = text.get(position.start..position.end)?;
    if quote.is_empty() {
        return None;
    }

    let prefix = last_chars(&text[..position.start], window);
    let suffix = first_chars(&text[position.end..], window);

    Some(AnnotationTarget {
        quote: quote.to_string(),
        prefix: (!prefix.is_empty()).then(|| prefix.to_string()),
        suffix: (!suffix.is_empty()).then(|| suffix.to_string()),
        position_hint: Some(position.start),
    })
}

fn last_chars(text: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    let start = text
        .char_indices()
        .rev()
        .nth(n - 1)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &text[start..]
}

fn first_chars(text: &str, n: usize) -> &str {
    let end = text
        .char_indices()
        .nth(n)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use crate::dom::Document;
    use crate::error::ChannelError;
    use crate::html::{LayoutBoxes, Rect};
    use crate::status::{StatusChannel, StatusSnapshot, StatusUpdate};

    /// A frame with nobody to talk to
    struct Offline;

    #[async_trait]
    impl StatusChannel for Offline {
        async fn push(&self, _update: StatusUpdate) -> std::result::Result<(), ChannelError> {
            Err(ChannelError::Closed)
        }

        async fn request_snapshot(&self) -> std::result::Result<StatusSnapshot, ChannelError> {
            Err(ChannelError::Closed)
        }
    }

    fn context(html: &str) -> AnchorContext<Document> {
        let document = Document::parse(html).unwrap();
        AnchorContext::new(document, &Config::default(), StatusSync::new(Arc::new(Offline)))
    }

    fn highlighted_text(ctx: &AnchorContext<Document>, id: &str) -> String {
        ctx.highlighter()
            .get(id)
            .map(|h| h.elements.iter().map(|m| ctx.document().text_content(*m)).collect())
            .unwrap_or_default()
    }

    const FOX: &str = "<p>The quick <b>brown</b> fox jumps over the lazy dog</p>";

    #[test]
    fn test_locate_exact_quote() {
        let mut ctx = context(FOX);
        let outcome = ctx.locate_and_highlight(&AnnotationTarget::new("brown fox"), "a1");

        assert_eq!(
            outcome,
            AnchorOutcome::Anchored {
                position: TextPosition { start: 10, end: 19 },
                score: 1.0
            }
        );
        assert_eq!(highlighted_text(&ctx, "a1"), "brown fox");
        assert_eq!(ctx.highlighter().get("a1").unwrap().elements.len(), 2);
        assert_eq!(ctx.get_status("a1"), Some(AnchorStatus::Anchored));
    }

    #[test]
    fn test_no_match_leaves_document_alone() {
        let mut ctx = context(FOX);
        let before = ctx.document().to_html();

        let outcome = ctx.locate_and_highlight(&AnnotationTarget::new("purple elephant"), "a1");
        assert_eq!(outcome, AnchorOutcome::NoMatch);
        assert_eq!(ctx.document().to_html(), before);
        assert_eq!(ctx.get_status("a1"), Some(AnchorStatus::Orphaned));
    }

    #[test]
    fn test_whitespace_only_quote() {
        let mut ctx = context(FOX);
        let outcome = ctx.locate_and_highlight(&AnnotationTarget::new("   "), "a1");
        assert_eq!(outcome, AnchorOutcome::EmptySpan);
        assert!(ctx.highlighter().get("a1").is_none());
        assert_eq!(ctx.get_status("a1"), Some(AnchorStatus::Orphaned));
    }

    #[test]
    fn test_normalization_and_whitespace() {
        let html = "<p>Un caf\u{e9}   au\n lait, merci</p>";
        let mut ctx = context(html);
        // Decomposed accent, single spaces
        let target = AnnotationTarget::new("cafe\u{301} au lait");
        let outcome = ctx.locate_and_highlight(&target, "a1");

        let raw = TextIndex::build(ctx.document()).text().to_string();
        let start = raw.find("caf").unwrap();
        let end = raw.find(", merci").unwrap();
        match outcome {
            AnchorOutcome::Anchored { position, score } => {
                assert_eq!(position, TextPosition { start, end });
                assert_eq!(score, 1.0);
            }
            other => panic!("expected anchored, got {:?}", other),
        }
        assert_eq!(highlighted_text(&ctx, "a1"), "caf\u{e9}   au\n lait");
    }

    #[test]
    fn test_context_and_hint_pick_occurrence() {
        let mut ctx = context("<p>The cat sat. A cat ran.</p>");
        let target = AnnotationTarget::new("cat").with_suffix(" ran");
        assert!(matches!(
            ctx.locate_and_highlight(&target, "a1"),
            AnchorOutcome::Anchored { position: TextPosition { start: 15, end: 18 }, .. }
        ));

        let mut ctx = context("<p>word word word word</p>");
        let target = AnnotationTarget::new("word").with_position_hint(10);
        assert!(matches!(
            ctx.locate_and_highlight(&target, "a1"),
            AnchorOutcome::Anchored { position: TextPosition { start: 10, end: 14 }, .. }
        ));
    }

    #[test]
    fn test_edited_content_still_anchors() {
        let mut ctx = context("<p>The quick brown fox jumped over the lazy dog</p>");
        let target = AnnotationTarget::new("quick brown fox jumps")
            .with_prefix("The ")
            .with_suffix(" over");
        match ctx.locate_and_highlight(&target, "a1") {
            AnchorOutcome::Anchored { position, score } => {
                assert_eq!(position.start, 4);
                assert!(score > 0.5 && score < 1.0);
            }
            other => panic!("expected anchored, got {:?}", other),
        }
    }

    #[test]
    fn test_reanchoring_replaces_highlight() {
        let mut ctx = context(FOX);
        ctx.locate_and_highlight(&AnnotationTarget::new("quick"), "a1");
        ctx.locate_and_highlight(&AnnotationTarget::new("lazy dog"), "a1");

        assert_eq!(ctx.highlighter().highlighted_ids(), vec!["a1"]);
        assert_eq!(highlighted_text(&ctx, "a1"), "lazy dog");
        let html = ctx.document().to_html();
        assert_eq!(html.matches("data-annotation-id").count(), 1);
    }

    #[test]
    fn test_reanchoring_same_target_keeps_highlight() {
        let mut ctx = context(FOX);
        let target = AnnotationTarget::new("quick");
        let expected = AnchorOutcome::Anchored {
            position: TextPosition { start: 4, end: 9 },
            score: 1.0,
        };

        assert_eq!(ctx.locate_and_highlight(&target, "a1"), expected);
        assert_eq!(ctx.locate_and_highlight(&target, "a1"), expected);

        assert_eq!(highlighted_text(&ctx, "a1"), "quick");
        assert_eq!(ctx.document().to_html().matches("data-annotation-id").count(), 1);
        assert_eq!(ctx.get_status("a1"), Some(AnchorStatus::Anchored));
    }

    #[test]
    fn test_reanchoring_over_own_markers() {
        let mut ctx = context(FOX);
        ctx.locate_and_highlight(&AnnotationTarget::new("quick"), "a1");
        let outcome = ctx.locate_and_highlight(&AnnotationTarget::new("The quick"), "a1");

        assert_eq!(
            outcome,
            AnchorOutcome::Anchored {
                position: TextPosition { start: 0, end: 9 },
                score: 1.0
            }
        );
        assert_eq!(highlighted_text(&ctx, "a1"), "The quick");
        assert_eq!(ctx.highlighter().get("a1").unwrap().elements.len(), 1);

        let hinted = AnnotationTarget::new("brown fox")
            .with_prefix("quick ")
            .with_position_hint(10);
        assert!(ctx.locate_and_highlight(&hinted, "a1").is_anchored());
        assert_eq!(highlighted_text(&ctx, "a1"), "brown fox");
        assert_eq!(ctx.get_status("a1"), Some(AnchorStatus::Anchored));
    }

    #[test]
    fn test_failed_reanchoring_removes_highlight() {
        let mut ctx = context(FOX);
        let before = ctx.document().to_html();
        ctx.locate_and_highlight(&AnnotationTarget::new("lazy"), "a1");
        ctx.locate_and_highlight(&AnnotationTarget::new("fox"), "a2");

        let outcome = ctx.locate_and_highlight(&AnnotationTarget::new("purple elephant"), "a1");
        assert_eq!(outcome, AnchorOutcome::NoMatch);
        assert_eq!(ctx.get_status("a1"), Some(AnchorStatus::Orphaned));
        assert!(ctx.highlighter().get("a1").is_none());
        assert_eq!(ctx.highlighter().highlighted_ids(), vec!["a2"]);

        let html = ctx.document().to_html();
        assert!(!html.contains("data-annotation-id=\"a1\""));
        ctx.unhighlight("a2");
        assert_eq!(ctx.document().to_html(), before);
    }

    #[test]
    fn test_unhighlight_restores_document() {
        let mut ctx = context(FOX);
        let before = ctx.document().to_html();
        ctx.locate_and_highlight(&AnnotationTarget::new("quick brown fox"), "a1");
        ctx.locate_and_highlight(&AnnotationTarget::new("fox jumps"), "a2");
        assert_ne!(ctx.document().to_html(), before);

        ctx.unhighlight("a1");
        ctx.unhighlight("a2");
        ctx.unhighlight("missing");
        assert_eq!(ctx.document().to_html(), before);
    }

    #[test]
    fn test_focus() {
        let mut ctx = context(FOX);
        ctx.locate_and_highlight(&AnnotationTarget::new("lazy"), "a1");
        let marker = ctx.highlighter().get("a1").unwrap().elements[0];

        ctx.set_highlight_focus("a1", true);
        assert!(ctx.document().has_class(marker, "amnesia-highlight-focused"));
        ctx.set_highlight_focus("a1", false);
        assert!(!ctx.document().has_class(marker, "amnesia-highlight-focused"));
    }

    #[test]
    fn test_ids_at_point() {
        let mut ctx = context(FOX);
        ctx.locate_and_highlight(&AnnotationTarget::new("quick brown fox"), "a1");
        ctx.locate_and_highlight(&AnnotationTarget::new("brown"), "a2");

        let mut layout = LayoutBoxes::new();
        for (i, marker) in ctx.highlighter().get("a1").unwrap().elements.iter().enumerate() {
            layout.add(*marker, Rect::new(40.0 + 50.0 * i as f64, 0.0, 50.0, 20.0));
        }
        let inner = ctx.highlighter().get("a2").unwrap().elements[0];
        layout.add(inner, Rect::new(90.0, 0.0, 50.0, 20.0));

        assert_eq!(ctx.annotation_ids_at_point(&layout, 100.0, 10.0), vec!["a2", "a1"]);
        assert_eq!(ctx.annotation_ids_at_point(&layout, 45.0, 10.0), vec!["a1"]);
        assert!(ctx.annotation_ids_at_point(&layout, 500.0, 10.0).is_empty());
    }

    #[test]
    fn test_status_lifecycle() {
        let mut ctx = context(FOX);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _subscription =
            ctx.subscribe_to_status_changes(move |change| sink.lock().push(change.status));

        ctx.locate_and_highlight(&AnnotationTarget::new("unicorn"), "a1");
        ctx.locate_and_highlight(&AnnotationTarget::new("lazy"), "a1");
        // Content changed under us: a fresh failure downgrades
        ctx.locate_and_highlight(&AnnotationTarget::new("unicorn"), "a1");

        assert_eq!(
            *seen.lock(),
            vec![
                AnchorStatus::Pending,
                AnchorStatus::Orphaned,
                AnchorStatus::Recovered,
                AnchorStatus::Orphaned,
            ]
        );
        assert_eq!(ctx.get_status("a1"), Some(AnchorStatus::Orphaned));
    }

    #[test]
    fn test_describe_then_locate() {
        let ctx = context(FOX);
        let index = TextIndex::build(ctx.document());
        let range = index.range(10, 19).unwrap();
        let target = ctx.describe(range).unwrap();
        assert_eq!(target.quote, "brown fox");
        assert_eq!(target.prefix.as_deref(), Some("The quick "));
        assert_eq!(target.suffix.as_deref(), Some(" jumps over the lazy dog"));
        assert_eq!(target.position_hint, Some(10));

        let short = describe_range(ctx.document(), range, 3).unwrap();
        assert_eq!(short.prefix.as_deref(), Some("ck "));
        assert_eq!(short.suffix.as_deref(), Some(" ju"));
        assert!(describe_range(ctx.document(), index.range(3, 3).unwrap(), 3).is_none());

        let mut ctx = context(FOX);
        assert!(matches!(
            ctx.locate_and_highlight(&target, "a1"),
            AnchorOutcome::Anchored { position: TextPosition { start: 10, end: 19 }, .. }
        ));
    }

    #[test]
    fn test_reset() {
        let mut ctx = context(FOX);
        let before = ctx.document().to_html();
        ctx.locate_and_highlight(&AnnotationTarget::new("lazy"), "a1");
        ctx.reset();

        assert_eq!(ctx.document().to_html(), before);
        assert_eq!(ctx.get_status("a1"), None);
        assert!(ctx.highlighter().highlighted_ids().is_empty());
    }
}
