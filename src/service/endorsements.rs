//! Endorsement store (likes and shares)
//!
//! Each Like or Announce leaves two documents: the activity's own
//! record, and an entry in the target post's aggregator listing every
//! endorsement URI. Both change together, in one transaction.

use serde_json::{json, Value};
use url::Url;

use crate::data::{Actor, LikeOrShare};
use crate::error::AppError;
use crate::slug::sluggify;
use crate::AppState;

use super::authority;

/// Record a Like or Announce against a post on this blog.
pub async fn add(
    state: &AppState,
    actor: &Actor,
    activity: &Value,
    collection: &str,
) -> Result<(), AppError> {
    let activity_id = activity
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if activity_id.is_empty() {
        return Err(AppError::BadRequest("no activity id found".to_string()));
    }

    let Some(object) = activity.get("object").and_then(Value::as_str) else {
        return Err(AppError::BadRequest(
            "object must be URI string".to_string(),
        ));
    };
    let object_uri = Url::parse(object)
        .map_err(|e| AppError::BadRequest(format!("malformed object URI: {e}")))?;
    if authority(&object_uri) != state.config.site.host() {
        return Err(AppError::BadRequest("post not in this domain".to_string()));
    }
    let post_slug = sluggify(&object_uri);

    // First endorsement of a post: confirm the post actually exists
    // before creating its aggregator.
    if state.store.get(collection, &post_slug).await?.is_none() {
        let response = state.http_client.head(object.to_string()).send().await;
        let exists = response.map(|r| r.status().is_success()).unwrap_or(false);
        if !exists {
            return Err(AppError::BadRequest(
                "referenced post nonexistent".to_string(),
            ));
        }
    }
    tracing::debug!(post = %object, "post found");

    let entry = LikeOrShare {
        id: activity_id.to_string(),
        url: activity
            .get("url")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        object: object.to_string(),
        actor: Some(actor.stripped()),
    };
    let activity_slug = sluggify(
        &Url::parse(activity_id)
            .map_err(|e| AppError::BadRequest(format!("malformed activity id: {e}")))?,
    );

    let mut tx = state.store.begin().await?;
    tx.merge(
        collection,
        &post_slug,
        &json!({ "Id": format!("{}/{}", object.trim_end_matches('/'), collection) }),
    )
    .await?;
    tx.array_union(collection, &post_slug, &["Items"], activity_id)
        .await?;
    tx.create(collection, &activity_slug, &serde_json::to_value(&entry)?)
        .await?;
    tx.commit().await?;

    tracing::info!(activity = %activity_id, post = %object, "recorded {collection} entry");
    Ok(())
}

/// Remove an endorsement (Undo Like / Undo Announce).
///
/// The Undo carries the original activity id as its object; the stored
/// activity document tells us which post's aggregator to unlink.
pub async fn remove(
    state: &AppState,
    activity: &Value,
    collection: &str,
) -> Result<(), AppError> {
    let target = activity
        .pointer("/object/id")
        .and_then(Value::as_str)
        .or_else(|| activity.get("object").and_then(Value::as_str))
        .unwrap_or_default();
    if target.is_empty() {
        return Err(AppError::BadRequest("no ID string in request".to_string()));
    }
    let activity_slug = sluggify(
        &Url::parse(target)
            .map_err(|e| AppError::BadRequest(format!("malformed object URI: {e}")))?,
    );

    let Some(doc) = state.store.get(collection, &activity_slug).await? else {
        return Err(AppError::AlreadyDone(
            "activity document nonexistent".to_string(),
        ));
    };
    let entry: LikeOrShare = serde_json::from_value(doc)?;

    let post_slug = sluggify(&Url::parse(&entry.object).map_err(|e| {
        AppError::Internal(anyhow::anyhow!("stored object is not a URI: {e}"))
    })?);

    let removed_id = if entry.id.is_empty() {
        target
    } else {
        entry.id.as_str()
    };
    let mut tx = state.store.begin().await?;
    tx.delete(collection, &activity_slug).await?;
    let unlinked = tx
        .array_remove(collection, &post_slug, &["Items"], removed_id)
        .await?;
    tx.commit().await?;

    if !unlinked {
        tracing::warn!(post = %entry.object, "aggregator missing while removing {collection} entry");
    }
    tracing::info!(activity = %target, "removed {collection} entry");
    Ok(())
}
