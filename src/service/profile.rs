//! Profile propagation
//!
//! When a remote actor updates its profile, every embedded copy of
//! that actor across the store has to change with it: the follower
//! document and the `Actor` field of every reply, like and share.

use serde_json::{json, Value};

use crate::data::{Actor, FOLLOWERS, LIKES, REPLIES, SHARES};
use crate::error::AppError;
use crate::AppState;

/// Handle Update(Person).
///
/// Only self-updates are accepted (`activity.actor == object.id`).
/// The new profile is taken from the payload, not refetched — remote
/// servers have been seen serving stale data right after sending the
/// update.
pub async fn propagate(state: &AppState, activity: &Value) -> Result<(), AppError> {
    let object = activity.get("object").cloned().unwrap_or(Value::Null);
    let actor_field = activity.get("actor").and_then(Value::as_str);
    let object_id = object.get("id").and_then(Value::as_str);
    if actor_field.is_none() || actor_field != object_id {
        return Err(AppError::BadRequest(
            "actor must be equal to object id".to_string(),
        ));
    }

    let mut updated: Actor = serde_json::from_value(object)
        .map_err(|e| AppError::BadRequest(format!("bad actor object: {e}")))?;
    updated.validate()?;
    updated.public_key = None;

    apply(state, &updated).await
}

/// Rewrite every stored copy of `actor`.
///
/// Shared by the inbox path and the internal refresh-profile endpoint.
pub async fn apply(state: &AppState, actor: &Actor) -> Result<(), AppError> {
    let handle = actor.handle();
    tracing::info!(actor = %handle, "got profile update");

    // Followers first; an actor that interacted without following is
    // simply not there.
    if state.store.get(FOLLOWERS, &handle).await?.is_some() {
        let mut tx = state.store.begin().await?;
        tx.merge(
            FOLLOWERS,
            &handle,
            &json!({
                "Name": actor.name,
                "PreferredUsername": actor.preferred_username,
                "Inbox": actor.inbox,
                "Icon": actor.icon,
            }),
        )
        .await?;
        tx.commit().await?;
        tracing::debug!(actor = %handle, "updated follower document");
    } else {
        tracing::debug!(actor = %handle, "actor not in followers");
    }

    // Then every document embedding this actor, one bulk batch per
    // collection.
    let embedded = serde_json::to_value(actor.stripped())?;
    for collection in [REPLIES, LIKES, SHARES] {
        let keys = state.store.keys_for_actor(collection, &actor.id).await?;
        if keys.is_empty() {
            continue;
        }
        tracing::debug!(
            collection,
            documents = keys.len(),
            "rewriting embedded actor"
        );
        state
            .store
            .rewrite_actor(collection, &keys, &embedded)
            .await?;
    }

    Ok(())
}
