//! Inbox dispatch
//!
//! Parses an inbound activity, authenticates the delivery, and routes
//! on `(type, object.type)` to the handler that applies it.

use http::HeaderMap;
use serde_json::Value;

use crate::error::AppError;
use crate::federation;
use crate::AppState;

use super::{endorsements, follows, profile, replies};

/// Handle one delivery to the inbox.
///
/// Every branch authenticates the message first; even unsupported
/// activity types only learn their `NotImplemented` answer after the
/// delivery proves who sent it.
pub async fn handle(
    state: &AppState,
    headers: &HeaderMap,
    path: &str,
    body: &[u8],
) -> Result<(), AppError> {
    let activity: Value = serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(format!("bad json syntax: {e}")))?;

    let kind = activity
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let object_type = activity
        .pointer("/object/type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let actor =
        federation::authenticate("POST", path, headers, body, &activity, &state.deliverer).await?;
    tracing::info!(
        activity = %kind,
        object = %object_type,
        actor = %actor.handle(),
        "authenticated inbox delivery"
    );

    match (kind.as_str(), object_type.as_str()) {
        ("Follow", _) => {
            follows::add(state, &actor).await?;
            follows::queue_accept(state, activity, actor);
            Ok(())
        }
        ("Undo", "Follow") => follows::remove(state, &actor).await,
        ("Undo", "Like") => endorsements::remove(state, &activity, crate::data::LIKES).await,
        ("Undo", "Announce") => endorsements::remove(state, &activity, crate::data::SHARES).await,
        ("Create", "Note") => replies::insert(state, &actor, &activity).await,
        ("Delete", _) => replies::delete(state, &activity).await,
        ("Update", "Person") => profile::propagate(state, &activity).await,
        ("Update", "Note") => replies::edit(state, &actor, &activity).await,
        ("Like", _) => endorsements::add(state, &actor, &activity, crate::data::LIKES).await,
        ("Announce", _) => endorsements::add(state, &actor, &activity, crate::data::SHARES).await,
        // our own Follow requests come back as Accepts; nothing to do
        ("Accept", "Follow") => Ok(()),
        _ => Err(AppError::NotImplemented("unsupported operation".to_string())),
    }
}
