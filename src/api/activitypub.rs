//! ActivityPub endpoints
//!
//! - Inbox (activity receiving)
//! - Followers collection

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use http::HeaderMap;
use serde_json::Value;

use crate::data::FOLLOWERS;
use crate::error::AppError;
use crate::AppState;

pub const ACTIVITY_JSON: &str = "application/activity+json";

/// Create ActivityPub router
///
/// Routes:
/// - POST /ap/inbox - the single inbox
/// - GET /ap/followers - followers collection
pub fn activitypub_router() -> Router<AppState> {
    Router::new()
        .route("/ap/inbox", post(inbox))
        .route("/ap/followers", get(followers))
}

/// POST /ap/inbox
///
/// Receives incoming ActivityPub activities. The request must carry
/// `Date`, `Digest` and `Signature` headers; authentication and
/// dispatch happen in the service layer, and every error class maps
/// to its status through `AppError`.
async fn inbox(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    crate::service::inbox::handle(&state, &headers, "/ap/inbox", &body).await?;
    Ok(StatusCode::OK)
}

/// GET /ap/followers
///
/// OrderedCollection of follower actor URIs.
async fn followers(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let ids: Vec<String> = state
        .store
        .list(FOLLOWERS)
        .await?
        .iter()
        .filter_map(|doc| doc.get("Id").and_then(Value::as_str).map(str::to_string))
        .collect();

    let body = serde_json::json!({
        "@context": "https://www.w3.org/ns/activitystreams",
        "id": format!("{}/ap/followers", state.config.site.base_url()),
        "type": "OrderedCollection",
        "totalItems": ids.len(),
        "orderedItems": ids,
    });

    Ok((
        [("Content-Type", ACTIVITY_JSON)],
        serde_json::to_string(&body)?,
    ))
}
