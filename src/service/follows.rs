//! Follower store
//!
//! Remote actors following the blog, keyed by their `user@host`
//! handle. A successful Follow also queues the outbound Accept; its
//! delivery is best-effort and never fails the inbox response.

use serde_json::Value;

use crate::data::{Actor, FOLLOWERS};
use crate::error::AppError;
use crate::federation::accept_activity;
use crate::AppState;

/// Record a new follower.
pub async fn add(state: &AppState, actor: &Actor) -> Result<(), AppError> {
    let doc = serde_json::to_value(actor.stripped())?;
    state.store.set(FOLLOWERS, &actor.handle(), &doc).await?;
    tracing::info!(follower = %actor.handle(), "added follower");
    Ok(())
}

/// Remove a follower (Undo Follow). Removing an unknown follower
/// succeeds.
pub async fn remove(state: &AppState, actor: &Actor) -> Result<(), AppError> {
    state.store.delete(FOLLOWERS, &actor.handle()).await?;
    tracing::info!(follower = %actor.handle(), "removed follower");
    Ok(())
}

/// Queue the Accept for a Follow as a fire-and-forget task.
///
/// The inbox handler returns immediately; a delivery failure is
/// logged, never surfaced to the remote sender.
pub fn queue_accept(state: &AppState, follow: Value, actor: Actor) {
    let state = state.clone();
    tokio::spawn(async move {
        if let Err(error) = send_accept(&state, &follow, &actor).await {
            tracing::error!(
                follower = %actor.handle(),
                error = %error,
                "error sending accept"
            );
        }
    });
}

/// Sign and deliver the Accept wrapping the original Follow.
///
/// Shared by the inbox path and the internal follow-service endpoint.
pub async fn send_accept(
    state: &AppState,
    follow: &Value,
    actor: &Actor,
) -> Result<(), AppError> {
    let accept = accept_activity(&state.config.site.actor_uri(), &actor.handle(), follow);
    state.deliverer.send_to_actor(&accept, actor).await
}
