//! Configuration for anchoring, highlighting and status sync

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AnchorError, Result};
use crate::html::HighlightConfig;
use crate::status::DEFAULT_HUB_CAPACITY;
use crate::text::MatcherConfig;

/// Chars of context stored on each side of a described quote
pub const DEFAULT_CONTEXT_WINDOW: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub matcher: MatcherConfig,
    pub highlight: HighlightConfig,
    pub sync: SyncConfig,
    pub context_window: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    /// Fallback snapshot polling period
    #[serde(with = "millis")]
    pub poll_interval: Duration,
    pub hub_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(5000),
            hub_capacity: DEFAULT_HUB_CAPACITY,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            matcher: MatcherConfig::default(),
            highlight: HighlightConfig::default(),
            sync: SyncConfig::default(),
            context_window: DEFAULT_CONTEXT_WINDOW,
        }
    }
}

impl Config {
    /// Defaults overridden by `ANCHOR_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Some(ratio) = parse_var::<f64>("ANCHOR_MAX_ERROR_RATIO")? {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(AnchorError::Config(format!(
                    "ANCHOR_MAX_ERROR_RATIO must be within 0..=1, got {}",
                    ratio
                )));
            }
            config.matcher.max_error_ratio = ratio;
        }
        if let Some(score) = parse_var::<f64>("ANCHOR_MIN_SCORE")? {
            config.matcher.min_score = score;
        }
        if let Some(window) = parse_var("ANCHOR_CONTEXT_WINDOW")? {
            config.context_window = window;
        }
        if let Ok(tag) = env::var("ANCHOR_MARKER_TAG") {
            config.highlight.tag = tag;
        }
        if let Ok(class) = env::var("ANCHOR_MARKER_CLASS") {
            config.highlight.focused_class = format!("{}-focused", class);
            config.highlight.class = class;
        }
        if let Some(ms) = parse_var::<u64>("ANCHOR_POLL_INTERVAL_MS")? {
            config.sync.poll_interval = Duration::from_millis(ms.max(1));
        }

        Ok(config)
    }
}

fn parse_var<T: FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| {
                AnchorError::Config(format!("{} has an invalid value: {:?}", name, value))
            }),
        Err(_) => Ok(None),
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
