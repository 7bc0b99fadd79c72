//! Annotation targets and their W3C selector form
//!
//! An [`AnnotationTarget`] is what gets persisted for a highlight: the quoted
//! text, some context on either side, and where it was last seen. The same
//! information can travel as W3C Web Annotation selectors.
//!
//! Reference: <https://www.w3.org/TR/annotation-model/#selectors>

use serde::{Deserialize, Serialize};

/// Portable description of an anchored passage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationTarget {
    /// The exact text that was selected
    pub quote: String,
    /// Text right before the selection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    /// Text right after the selection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
    /// Where the quote started in the document text (byte offset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_hint: Option<usize>,
}

/// Selector types for identifying text/positions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Selector {
    /// Fragment identifier (EPUB CFI, element id, ...)
    #[serde(rename = "FragmentSelector")]
    Fragment {
        value: String,
        #[serde(rename = "conformsTo", skip_serializing_if = "Option::is_none")]
        conforms_to: Option<String>,
    },
    /// Text quote with context
    #[serde(rename = "TextQuoteSelector")]
    TextQuote {
        /// The exact text that was highlighted
        exact: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prefix: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        suffix: Option<String>,
    },
    /// Offsets within the document text
    #[serde(rename = "TextPositionSelector")]
    TextPosition { start: usize, end: usize },
}

impl AnnotationTarget {
    pub fn new(quote: &str) -> Self {
        Self {
            quote: quote.to_string(),
            prefix: None,
            suffix: None,
            position_hint: None,
        }
    }

    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = Some(prefix.to_string());
        self
    }

    pub fn with_suffix(mut self, suffix: &str) -> Self {
        self.suffix = Some(suffix.to_string());
        self
    }

    pub fn with_position_hint(mut self, start: usize) -> Self {
        self.position_hint = Some(start);
        self
    }

    /// Build a target from W3C selectors.
    ///
    /// Needs a TextQuoteSelector; the start of a TextPositionSelector, if
    /// any, becomes the position hint. Fragment selectors are ignored.
    pub fn from_selectors(selectors: &[Selector]) -> Option<Self> {
        let mut target = selectors.iter().find_map(|s| match s {
            Selector::TextQuote {
                exact,
                prefix,
                suffix,
            } => Some(Self {
                quote: exact.clone(),
                prefix: prefix.clone(),
                suffix: suffix.clone(),
                position_hint: None,
            }),
            _ => None,
        })?;
        target.position_hint = selectors.iter().find_map(|s| match s {
            Selector::TextPosition { start, .. } => Some(*start),
            _ => None,
        });
        Some(target)
    }

    /// Express this target as W3C selectors
    pub fn to_selectors(&self) -> Vec<Selector> {
        let mut selectors = vec![Selector::TextQuote {
            exact: self.quote.clone(),
            prefix: self.prefix.clone(),
            suffix: self.suffix.clone(),
        }];
        if let Some(start) = self.position_hint {
            selectors.push(Selector::TextPosition {
                start,
                end: start + self.quote.len(),
            });
        }
        selectors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_wire_format() {
        let target = AnnotationTarget::new("brown fox")
            .with_prefix("quick ")
            .with_position_hint(10);

        let json = serde_json::to_value(&target).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"quote": "brown fox", "prefix": "quick ", "positionHint": 10})
        );

        let parsed: AnnotationTarget =
            serde_json::from_str(r#"{"quote": "fox", "suffix": " jumps"}"#).unwrap();
        assert_eq!(parsed, AnnotationTarget::new("fox").with_suffix(" jumps"));
    }

    #[test]
    fn test_from_selectors() {
        let json = r#"[
            {"type": "FragmentSelector", "value": "epubcfi(/6/4!/4/2/1:10)"},
            {"type": "TextQuoteSelector", "exact": "hello world", "prefix": "say ", "suffix": "!"},
            {"type": "TextPositionSelector", "start": 4, "end": 15}
        ]"#;
        let selectors: Vec<Selector> = serde_json::from_str(json).unwrap();
        let target = AnnotationTarget::from_selectors(&selectors).unwrap();

        assert_eq!(target.quote, "hello world");
        assert_eq!(target.prefix.as_deref(), Some("say "));
        assert_eq!(target.suffix.as_deref(), Some("!"));
        assert_eq!(target.position_hint, Some(4));
    }

    #[test]
    fn test_from_selectors_needs_quote() {
        let selectors = vec![Selector::TextPosition { start: 0, end: 5 }];
        assert!(AnnotationTarget::from_selectors(&selectors).is_none());
    }

    #[test]
    fn test_to_selectors() {
        let target = AnnotationTarget::new("hello").with_position_hint(3);
        let selectors = target.to_selectors();
        assert_eq!(selectors.len(), 2);
        assert_eq!(selectors[1], Selector::TextPosition { start: 3, end: 8 });
        assert_eq!(AnnotationTarget::from_selectors(&selectors), Some(target));

        let json = serde_json::to_string(&selectors[0]).unwrap();
        assert!(json.contains("TextQuoteSelector"));
    }
}
