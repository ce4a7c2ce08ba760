//! Reply graph
//!
//! Remote comments form a forest over blog posts: each node stores its
//! parent's id (`InReplyTo`) and its children's ids
//! (`Replies.Items`). Both directions hold ids only; traversal is
//! explicit store lookup, so the cyclic links never share ownership.

use serde_json::{json, Value};
use url::Url;

use crate::data::{Actor, Reply, REPLIES};
use crate::error::AppError;
use crate::slug::sluggify;
use crate::AppState;

use super::authority;

/// Insert a reply (Create(Note)).
///
/// The child document and the parent's link to it are written in one
/// transaction; creating an already-stored reply id fails the
/// transaction as the idempotency guard.
pub async fn insert(state: &AppState, actor: &Actor, activity: &Value) -> Result<(), AppError> {
    let object = activity.get("object").cloned().unwrap_or(Value::Null);
    let mut reply: Reply = serde_json::from_value(object)
        .map_err(|e| AppError::BadRequest(format!("bad reply object: {e}")))?;

    // validate reply properties
    if reply.in_reply_to.is_empty() {
        return Err(AppError::BadRequest("inReplyTo not provided".to_string()));
    }
    chrono::DateTime::parse_from_rfc3339(&reply.published)
        .map_err(|e| AppError::BadRequest(format!("bad published timestamp: {e}")))?;
    Url::parse(&reply.url)
        .map_err(|e| AppError::BadRequest(format!("malformed backlink URL: {e}")))?;
    if reply.attributed_to != actor.id {
        return Err(AppError::BadRequest(
            "actor and attributedTo mismatch".to_string(),
        ));
    }
    if reply.id.is_empty() || reply.content.is_empty() {
        return Err(AppError::BadRequest("missing reply details".to_string()));
    }

    let parent_uri = Url::parse(&reply.in_reply_to)
        .map_err(|e| AppError::BadRequest(format!("malformed inReplyTo URI: {e}")))?;
    let parent_slug = sluggify(&parent_uri);
    let reply_uri = Url::parse(&reply.id)
        .map_err(|e| AppError::BadRequest(format!("malformed object id: {e}")))?;
    let reply_slug = sluggify(&reply_uri);

    reply.actor = Some(actor.stripped());

    // The parent may not be in the replies collection yet. If so it
    // must be a post on this blog, confirmed to exist; accepting
    // off-host parents would let foreign threads grow the graph
    // without bound.
    if state.store.get(REPLIES, &parent_slug).await?.is_none() {
        if authority(&parent_uri) != state.config.site.host() {
            return Err(AppError::BadRequest(
                "reply not for this domain".to_string(),
            ));
        }
        let response = state
            .http_client
            .head(reply.in_reply_to.clone())
            .send()
            .await;
        let exists = response
            .map(|r| r.status().is_success())
            .unwrap_or(false);
        if !exists {
            return Err(AppError::BadRequest(
                "referenced post nonexistent".to_string(),
            ));
        }
    }
    tracing::debug!(parent = %reply.in_reply_to, "parent post found");

    // Two documents change together: the new reply, and the parent
    // (created by the merge when this is the first comment).
    let replies_id = format!("{}/replies", reply.in_reply_to.trim_end_matches('/'));
    let mut tx = state.store.begin().await?;
    tx.create(REPLIES, &reply_slug, &serde_json::to_value(&reply)?)
        .await?;
    tx.merge(
        REPLIES,
        &parent_slug,
        &json!({
            "Id": reply.in_reply_to,
            "Replies": { "Id": replies_id },
        }),
    )
    .await?;
    tx.array_union(REPLIES, &parent_slug, &["Replies", "Items"], &reply.id)
        .await?;
    tx.commit().await?;

    tracing::info!(reply = %reply.id, "linked reply under {}", reply.in_reply_to);
    Ok(())
}

/// Delete a reply.
///
/// A node with children becomes a tombstone. A leaf is removed and
/// unlinked from its parent; tombstones that lose their last child on
/// the way up are removed too.
pub async fn delete(state: &AppState, activity: &Value) -> Result<(), AppError> {
    let target = activity
        .pointer("/object/id")
        .and_then(Value::as_str)
        .or_else(|| activity.get("object").and_then(Value::as_str))
        .unwrap_or_default();
    if target.is_empty() {
        return Err(AppError::BadRequest("no ID string in request".to_string()));
    }

    let uri = Url::parse(target)
        .map_err(|e| AppError::BadRequest(format!("couldn't parse ID as URI: {e}")))?;
    let mut slug = sluggify(&uri);

    tracing::debug!(%slug, "attempting to delete reply");
    let Some(doc) = state.store.get(REPLIES, &slug).await? else {
        // Mastodon resends deletes until it sees a 2xx
        return Err(AppError::AlreadyDone(
            "reply document nonexistent".to_string(),
        ));
    };
    let mut reply: Reply = serde_json::from_value(doc)?;

    // Mid-chain nodes keep their place in the tree as tombstones.
    if reply.replies.item_ids().next().is_some() {
        reply.entomb();
        state
            .store
            .set(REPLIES, &slug, &serde_json::to_value(&reply)?)
            .await?;
        tracing::info!(%slug, "entombed reply node");
        return Ok(());
    }

    // Leaf: delete, then walk up through InReplyTo, unlinking and
    // sweeping out tombstones that just became childless. The walk is
    // not atomic; completed deletions stand even if a link upward
    // turns out broken.
    loop {
        state.store.delete(REPLIES, &slug).await?;
        tracing::info!(%slug, "deleted leaf reply");

        let parent_uri = Url::parse(&reply.in_reply_to).map_err(|e| {
            AppError::Internal(anyhow::anyhow!("malformed InReplyTo during unlink: {e}"))
        })?;
        let parent_slug = sluggify(&parent_uri);

        let mut tx = state.store.begin().await?;
        let found = tx
            .array_remove(REPLIES, &parent_slug, &["Replies", "Items"], &reply.id)
            .await?;
        tx.commit().await?;
        if !found {
            return Err(AppError::Internal(anyhow::anyhow!(
                "InReplyTo reference broken: {parent_slug}"
            )));
        }
        tracing::debug!(parent = %parent_slug, "delinked reply from parent");

        let Some(parent_doc) = state.store.get(REPLIES, &parent_slug).await? else {
            return Err(AppError::Internal(anyhow::anyhow!(
                "InReplyTo reference broken: {parent_slug}"
            )));
        };
        let parent: Reply = serde_json::from_value(parent_doc)?;
        if !parent.is_tombstone() || parent.replies.item_ids().next().is_some() {
            break;
        }

        reply = parent;
        slug = parent_slug;
    }

    Ok(())
}

/// Edit a reply (Update(Note)).
///
/// `updated` must be present and may never move backwards. Once a
/// reply has children, its content is append-only: after trailing
/// closing tags are set aside, the new content must start with the
/// old. Only `updated`, `url` and `content` are applied.
pub async fn edit(state: &AppState, actor: &Actor, activity: &Value) -> Result<(), AppError> {
    let object = activity.get("object").cloned().unwrap_or(Value::Null);
    let incoming: Reply = serde_json::from_value(object)
        .map_err(|e| AppError::BadRequest(format!("bad reply object: {e}")))?;

    if incoming.id.is_empty() {
        return Err(AppError::BadRequest("no ID string in request".to_string()));
    }
    if incoming.updated.is_empty() {
        return Err(AppError::BadRequest(
            "updated timestamp not provided".to_string(),
        ));
    }
    let uri = Url::parse(&incoming.id)
        .map_err(|e| AppError::BadRequest(format!("malformed object id: {e}")))?;
    let slug = sluggify(&uri);

    let mut tx = state.store.begin().await?;
    let Some(doc) = tx.get(REPLIES, &slug).await? else {
        return Err(AppError::BadRequest(
            "reply document nonexistent".to_string(),
        ));
    };
    let mut stored: Reply = serde_json::from_value(doc)?;

    if stored.attributed_to != actor.id {
        return Err(AppError::BadRequest(
            "actor and attributedTo mismatch".to_string(),
        ));
    }
    // RFC3339 timestamps order lexicographically
    if !stored.updated.is_empty() && incoming.updated < stored.updated {
        return Err(AppError::BadRequest(
            "updated timestamp older than stored one".to_string(),
        ));
    }

    if stored.replies.item_ids().next().is_some() {
        let old = strip_trailing_closers(&stored.content);
        let new = strip_trailing_closers(&incoming.content);
        if !new.starts_with(old) {
            return Err(AppError::BadRequest(
                "replies with children may only append content".to_string(),
            ));
        }
    }

    stored.updated = incoming.updated;
    stored.url = incoming.url;
    stored.content = incoming.content;

    tx.set(REPLIES, &slug, &serde_json::to_value(&stored)?)
        .await?;
    tx.commit().await?;

    tracing::info!(%slug, "applied reply edit");
    Ok(())
}

/// Set aside trailing closing-tag markup (`</…>` runs at the end of
/// the string) so appended text inside the outermost tags still counts
/// as an append.
fn strip_trailing_closers(content: &str) -> &str {
    let mut s = content.trim_end();
    while s.ends_with('>') {
        let Some(idx) = s.rfind("</") else { break };
        let inner = &s[idx + 2..s.len() - 1];
        if inner.contains('<') || inner.contains('>') {
            break;
        }
        s = s[..idx].trim_end();
    }
    s
}
