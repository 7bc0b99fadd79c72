//! Amnesia Anchor CLI
//!
//! Anchors a set of stored annotation targets in one XHTML page and prints
//! the highlighted page followed by a status summary.
//!
//! Usage: `amnesia-anchor <page.xhtml> <targets.json>`
//!
//! `targets.json` is an array of `{"id": ..., "target": {...}}` entries,
//! where the target is either `{"quote", "prefix", "suffix", "positionHint"}`
//! or a list of W3C selectors.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use serde::Deserialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use amnesia_anchor::dom::Document;
use amnesia_anchor::status::{LocalHub, StatusChannel, StatusSync};
use amnesia_anchor::{AnchorContext, AnnotationTarget, Config, Selector};

#[derive(Debug, Deserialize)]
struct TargetEntry {
    id: String,
    target: TargetInput,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TargetInput {
    Quote(AnnotationTarget),
    Selectors(Vec<Selector>),
}

impl TargetInput {
    fn into_target(self) -> Option<AnnotationTarget> {
        match self {
            TargetInput::Quote(target) => Some(target),
            TargetInput::Selectors(selectors) => AnnotationTarget::from_selectors(&selectors),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "amnesia_anchor=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load configuration
    dotenvy::dotenv().ok();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from env: {}, using defaults", e);
        Config::default()
    });

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [page_path, targets_path] = args.as_slice() else {
        bail!("usage: amnesia-anchor <page.xhtml> <targets.json>");
    };
    let page_path = PathBuf::from(page_path);
    let targets_path = PathBuf::from(targets_path);

    let xhtml = std::fs::read_to_string(&page_path)
        .with_context(|| format!("reading {}", page_path.display()))?;
    let document =
        Document::parse(&xhtml).with_context(|| format!("parsing {}", page_path.display()))?;

    let entries: Vec<TargetEntry> = serde_json::from_str(
        &std::fs::read_to_string(&targets_path)
            .with_context(|| format!("reading {}", targets_path.display()))?,
    )
    .with_context(|| format!("parsing {}", targets_path.display()))?;

    tracing::info!(
        "Anchoring {} targets in {}",
        entries.len(),
        page_path.display()
    );

    let (hub, _hub_task) = LocalHub::spawn(config.sync.hub_capacity);
    let hub: Arc<dyn StatusChannel> = Arc::new(hub);
    let status = StatusSync::new(Arc::clone(&hub));
    let _logged = status.subscribe(|change| {
        tracing::debug!(
            "{}: {:?} -> {}",
            change.annotation_id,
            change.previous,
            change.status
        );
    });
    // Keeps this frame in step with statuses other frames push to the hub
    let poller = status.spawn_poller(config.sync.poll_interval);

    let mut context = AnchorContext::new(document, &config, status.clone());
    let mut outcomes = Vec::with_capacity(entries.len());
    for entry in entries {
        let Some(target) = entry.target.into_target() else {
            tracing::warn!("Target {} has no TextQuoteSelector, skipping", entry.id);
            continue;
        };
        let outcome = context.locate_and_highlight(&target, &entry.id);
        outcomes.push((entry.id, outcome));
    }

    // Pushes are fire-and-forget; give them a moment to reach the hub
    tokio::time::sleep(Duration::from_millis(50)).await;
    let hub_view = match hub.request_snapshot().await {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            tracing::warn!("Status hub unavailable: {}", e);
            None
        }
    };

    println!("{}", context.document().to_html());
    for (id, outcome) in &outcomes {
        let status = context
            .get_status(id)
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        println!("{}\t{}\t{}", id, status, serde_json::to_string(outcome)?);
    }
    if let Some(snapshot) = hub_view {
        tracing::info!(
            "Hub revision {}: {} anchored, {} orphaned, {} recovered, {} pending",
            snapshot.revision,
            snapshot.anchored.len(),
            snapshot.orphaned.len(),
            snapshot.recovered.len(),
            snapshot.pending.len()
        );
    }

    poller.abort();
    Ok(())
}
