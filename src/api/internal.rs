//! Internal endpoints
//!
//! Operations driven by the site itself rather than remote servers:
//! Accept emission, profile refresh, and the deploy broadcast
//! trigger. All are gated by the `SELF_API_KEY` shared secret in the
//! `Authorization` header, compared in constant time.

use axum::extract::{Query, State};
use axum::routing::post;
use axum::{Json, Router};
use http::HeaderMap;
use serde::Deserialize;
use serde_json::Value;
use subtle::ConstantTimeEq;

use crate::data::Actor;
use crate::error::AppError;
use crate::federation::{broadcast_outbox, fetch_actor_by_uri};
use crate::service::{follows, profile};
use crate::AppState;

/// Create internal router
///
/// Routes:
/// - POST /ap/follow-service - emit the Accept for a Follow
/// - POST /ap/refresh-profile?actorID=… - refetch and propagate a profile
/// - POST /ap/deploy-succeeded - broadcast the rebuilt outbox
pub fn internal_router() -> Router<AppState> {
    Router::new()
        .route("/ap/follow-service", post(follow_service))
        .route("/ap/refresh-profile", post(refresh_profile))
        .route("/ap/deploy-succeeded", post(deploy_succeeded))
}

/// Constant-time check of the shared secret.
///
/// An unset key rejects everything; there is no open mode.
fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let presented = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .as_bytes();
    let expected = state.config.federation.self_api_key.as_bytes();

    if expected.is_empty() || presented.ct_eq(expected).unwrap_u8() != 1 {
        tracing::warn!("authorization header did not match key");
        return Err(AppError::BadRequest(
            "authorization header did not match key".to_string(),
        ));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct FollowServiceRequest {
    /// The original Follow activity, echoed back inside the Accept
    #[serde(rename = "followObj")]
    follow_obj: Value,
    actor: Actor,
}

/// POST /ap/follow-service
///
/// Wraps an Accept emission so the inbox handler can return quickly.
/// Delivery failure is logged; the caller still gets a 200 — the
/// remote side is best-effort either way.
async fn follow_service(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<FollowServiceRequest>,
) -> Result<&'static str, AppError> {
    authorize(&state, &headers)?;
    tracing::info!(actor = %request.actor.handle(), "got accept follow request");

    if let Err(error) = follows::send_accept(&state, &request.follow_obj, &request.actor).await {
        tracing::error!(error = %error, "error sending activity");
    }
    Ok("ok")
}

#[derive(Debug, Deserialize)]
struct RefreshProfileQuery {
    #[serde(rename = "actorID")]
    actor_id: String,
}

/// POST /ap/refresh-profile?actorID=…
///
/// Force-refetches an actor document and rewrites every stored copy.
/// Responds with the refreshed icon URL.
async fn refresh_profile(
    State(state): State<AppState>,
    Query(query): Query<RefreshProfileQuery>,
    headers: HeaderMap,
) -> Result<String, AppError> {
    authorize(&state, &headers)?;

    let mut actor = fetch_actor_by_uri(&query.actor_id, &state.deliverer).await?;
    actor.public_key = None;
    profile::apply(&state, &actor).await?;

    Ok(actor.icon.unwrap_or_default())
}

/// POST /ap/deploy-succeeded
///
/// Fired after each site build: fans the rebuilt outbox out to all
/// followers. Per-send failures are logged and do not fail the
/// deploy.
async fn deploy_succeeded(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<&'static str, AppError> {
    authorize(&state, &headers)?;
    tracing::info!("broadcasting new post");

    broadcast_outbox(&state).await?;
    Ok("ok")
}
