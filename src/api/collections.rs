//! Collection renderer
//!
//! Serves the per-post `replies`, `likes` and `shares` collections,
//! either as ActivityPub collections (when the client asks for
//! ActivityStreams JSON) or as a plain JSON projection of the stored
//! documents.

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use http::HeaderMap;
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

use crate::data::{Aggregate, LikeOrShare, Reply, LIKES, REPLIES, SHARES};
use crate::error::AppError;
use crate::slug::sluggify;
use crate::AppState;

use super::activitypub::ACTIVITY_JSON;

/// Create collections router
///
/// Routes:
/// - GET /replies?id=…
/// - GET /likes?id=…
/// - GET /shares?id=…
pub fn collections_router() -> Router<AppState> {
    Router::new()
        .route("/replies", get(replies))
        .route("/likes", get(likes))
        .route("/shares", get(shares))
}

#[derive(Debug, Deserialize)]
struct CollectionQuery {
    id: String,
}

/// True when the Accept header asks for ActivityStreams JSON.
fn wants_activity_json(headers: &HeaderMap) -> bool {
    headers
        .get("accept")
        .and_then(|value| value.to_str().ok())
        .map(|accept| {
            let accept = accept.to_lowercase();
            accept.contains("activity+json") || accept.contains("ld+json")
        })
        .unwrap_or(false)
}

/// The `id` query parameter is a full post URI, or a bare post slug
/// resolved under this site's `/posts/`.
fn resolve_post_uri(state: &AppState, id: &str) -> Result<Url, AppError> {
    let uri = if id.starts_with("http://") || id.starts_with("https://") {
        id.to_string()
    } else {
        format!("{}/posts/{}", state.config.site.base_url(), id)
    };
    Url::parse(&uri).map_err(|e| AppError::BadRequest(format!("post ID is invalid URI: {e}")))
}

fn activity_json(body: Value) -> Response {
    (
        [("Content-Type", ACTIVITY_JSON)],
        body.to_string(),
    )
        .into_response()
}

/// GET /replies?id=…
///
/// ActivityPub clients get an OrderedCollection of reply URIs; others
/// get the plain URI list. A post with no replies yet yields an empty
/// collection, never a 404.
async fn replies(
    State(state): State<AppState>,
    Query(query): Query<CollectionQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let post_uri = resolve_post_uri(&state, &query.id)?;
    let slug = sluggify(&post_uri);

    let reply: Reply = match state.store.get(REPLIES, &slug).await? {
        Some(doc) => serde_json::from_value(doc)?,
        None => Reply::default(),
    };
    let items: Vec<&str> = reply.replies.item_ids().collect();
    let collection_id = if reply.replies.id.is_empty() {
        format!("{}/replies", post_uri.as_str().trim_end_matches('/'))
    } else {
        reply.replies.id.clone()
    };

    if !wants_activity_json(&headers) {
        return Ok(Json(items).into_response());
    }

    Ok(activity_json(json!({
        "@context": "https://www.w3.org/ns/activitystreams",
        "id": collection_id,
        "type": "OrderedCollection",
        "totalItems": items.len(),
        "items": items,
    })))
}

/// GET /likes?id=…
async fn likes(
    State(state): State<AppState>,
    Query(query): Query<CollectionQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    endorsement_collection(&state, &query.id, &headers, LIKES).await
}

/// GET /shares?id=…
async fn shares(
    State(state): State<AppState>,
    Query(query): Query<CollectionQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    endorsement_collection(&state, &query.id, &headers, SHARES).await
}

/// Render a likes or shares collection.
///
/// Like activities aren't dereferenceable by most servers, so likes
/// are inlined as full objects; shares are plain URI references.
async fn endorsement_collection(
    state: &AppState,
    id: &str,
    headers: &HeaderMap,
    collection: &str,
) -> Result<Response, AppError> {
    let post_uri = resolve_post_uri(state, id)?;
    let post_slug = sluggify(&post_uri);

    let aggregate: Aggregate = match state.store.get(collection, &post_slug).await? {
        Some(doc) => serde_json::from_value(doc)?,
        None => Aggregate::default(),
    };

    let keys: Vec<String> = aggregate
        .items
        .iter()
        .filter_map(|uri| Url::parse(uri).ok())
        .map(|uri| sluggify(&uri))
        .collect();

    let entries: Vec<LikeOrShare> = state
        .store
        .get_many(collection, &keys)
        .await?
        .into_iter()
        .filter_map(|doc| serde_json::from_value(doc).ok())
        .collect();

    if !wants_activity_json(headers) {
        return Ok(Json(entries).into_response());
    }

    let items: Vec<Value> = entries
        .iter()
        .map(|entry| {
            if collection == LIKES {
                json!({
                    "id": entry.id,
                    "type": "Like",
                    "actor": entry.actor.as_ref().map(|actor| actor.id.clone()),
                    "object": entry.object,
                })
            } else {
                json!(entry.id)
            }
        })
        .collect();

    let collection_id = if aggregate.id.is_empty() {
        format!(
            "{}/{}",
            post_uri.as_str().trim_end_matches('/'),
            collection
        )
    } else {
        aggregate.id.clone()
    };

    Ok(activity_json(json!({
        "@context": "https://www.w3.org/ns/activitystreams",
        "id": collection_id,
        "type": "Collection",
        "totalItems": items.len(),
        "items": items,
    })))
}
