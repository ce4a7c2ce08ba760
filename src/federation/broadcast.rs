//! Post broadcast
//!
//! When a deploy succeeds, the freshly built outbox blob is fanned out
//! to every follower: each Delete it contains, plus the newest post.
//! Sends run concurrently and are joined before returning; a failed
//! send is logged and never fails the deploy.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::data::{Actor, FOLLOWERS};
use crate::error::AppError;
use crate::AppState;

use super::delivery::is_bridge_inbox;

const MAX_CONCURRENT: usize = 10;

#[derive(Deserialize)]
struct Outbox {
    #[serde(rename = "orderedItems", default)]
    ordered_items: Vec<Value>,
}

/// Outcome of one broadcast run.
#[derive(Debug, Default)]
pub struct BroadcastSummary {
    /// Outbox items selected for delivery
    pub selected: usize,
    /// Sends that returned 2xx
    pub delivered: usize,
    /// Sends that failed (logged individually)
    pub failed: usize,
}

/// Select the outbox entries worth forwarding.
///
/// Every `Delete` is always forwarded so remote copies disappear; on
/// top of those, the first non-`Delete` item is the newest post.
fn select_items(ordered_items: &[Value]) -> Vec<&Value> {
    let mut selected = Vec::new();
    let mut newest_taken = false;
    for item in ordered_items {
        let kind = item.get("type").and_then(Value::as_str).unwrap_or_default();
        if kind == "Delete" {
            selected.push(item);
        } else if !newest_taken {
            selected.push(item);
            newest_taken = true;
        }
    }
    selected
}

/// Read the outbox blob and fan it out to all followers.
pub async fn broadcast_outbox(state: &AppState) -> Result<BroadcastSummary, AppError> {
    let outbox_path = state.config.site.static_dir.join("ap/outbox");
    let raw = tokio::fs::read(&outbox_path).await.map_err(|e| {
        AppError::Internal(anyhow::anyhow!(
            "could not read outbox at {}: {e}",
            outbox_path.display()
        ))
    })?;
    let outbox: Outbox = serde_json::from_slice(&raw)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("could not decode outbox JSON: {e}")))?;

    if outbox.ordered_items.is_empty() {
        tracing::info!("no posts in outbox");
        return Ok(BroadcastSummary::default());
    }

    let followers: Vec<Actor> = state
        .store
        .list(FOLLOWERS)
        .await?
        .into_iter()
        .filter_map(|doc| serde_json::from_value(doc).ok())
        .collect();

    let selected = select_items(&outbox.ordered_items);
    let summary_selected = selected.len();
    tracing::info!(
        items = summary_selected,
        followers = followers.len(),
        "broadcasting outbox"
    );

    let semaphore = Arc::new(Semaphore::new(MAX_CONCURRENT));
    let mut tasks = Vec::new();

    for item in selected {
        let kind = item.get("type").and_then(Value::as_str).unwrap_or_default();
        for follower in &followers {
            // the bridge rejects edits
            if kind == "Update" && is_bridge_inbox(&follower.inbox) {
                continue;
            }

            let semaphore = semaphore.clone();
            let deliverer = state.deliverer.clone();
            let activity = item.clone();
            let follower = follower.clone();

            tasks.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await;
                let result = deliverer.send_to_actor(&activity, &follower).await;
                if let Err(ref error) = result {
                    tracing::warn!(
                        follower = %follower.id,
                        error = %error,
                        "failed sending post to follower"
                    );
                }
                result.is_ok()
            }));
        }
    }

    let mut summary = BroadcastSummary {
        selected: summary_selected,
        ..Default::default()
    };
    for result in futures::future::join_all(tasks).await {
        match result {
            Ok(true) => summary.delivered += 1,
            _ => summary.failed += 1,
        }
    }

    tracing::info!(
        delivered = summary.delivered,
        failed = summary.failed,
        "broadcast complete"
    );
    Ok(summary)
}
