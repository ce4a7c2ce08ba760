//! Static site surface
//!
//! The actor document, outbox, webfinger document and posts are build
//! artifacts on disk; this module serves them with the content
//! negotiation remote servers expect. The HEAD probes the inbox
//! handlers make against local posts land here too.

use std::path::{Component, Path, PathBuf};

use axum::extract::State;
use axum::http::Uri;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use http::HeaderMap;

use crate::error::AppError;
use crate::AppState;

use super::activitypub::ACTIVITY_JSON;

/// Create static-site router
///
/// Routes:
/// - GET /ap/users/:handle - content-negotiated actor document
/// - GET /ap/outbox, /.well-known/webfinger - always ActivityPub JSON
/// - GET /health - liveness probe
/// - everything else - static files, posts content-negotiated
pub fn site_router() -> Router<AppState> {
    Router::new()
        .route("/ap/users/:handle", get(actor_doc))
        .route("/ap/outbox", get(activity_doc))
        .route("/.well-known/webfinger", get(activity_doc))
        .route("/health", get(health))
        .fallback(static_fallback)
}

/// Health check endpoint
async fn health() -> &'static str {
    "OK"
}

/// True when any Accept value asks for a JSON flavor.
fn accepts_json(headers: &HeaderMap) -> bool {
    headers
        .get_all("accept")
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| {
            let value = value.to_lowercase();
            ["ld+json", "activity+json", "json"]
                .iter()
                .any(|option| value.contains(&format!("application/{option}")))
        })
}

/// GET /ap/users/:handle
///
/// ActivityPub clients get the actor document; browsers are sent to
/// the blog front page.
async fn actor_doc(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Response, AppError> {
    if accepts_json(&headers) {
        serve_file(&state.config.site.static_dir, uri.path(), Some(ACTIVITY_JSON)).await
    } else {
        Ok(Redirect::temporary("/").into_response())
    }
}

/// Serve a static document that is always ActivityPub JSON.
async fn activity_doc(State(state): State<AppState>, uri: Uri) -> Result<Response, AppError> {
    serve_file(&state.config.site.static_dir, uri.path(), Some(ACTIVITY_JSON)).await
}

/// Fallback: the static site itself.
///
/// Posts are content-negotiated; their build emits the ActivityPub
/// JSON rendition at the same path, so JSON clients get that flavor.
async fn static_fallback(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Response, AppError> {
    let content_type = if accepts_json(&headers) {
        Some(ACTIVITY_JSON)
    } else {
        None
    };
    serve_file(&state.config.site.static_dir, uri.path(), content_type).await
}

/// Read a file under the static directory and respond with it.
///
/// `content_type` overrides extension-based guessing. Directories
/// fall back to their `index.html`.
async fn serve_file(
    static_dir: &Path,
    request_path: &str,
    content_type: Option<&str>,
) -> Result<Response, AppError> {
    let relative = sanitize(request_path)
        .ok_or_else(|| AppError::BadRequest("invalid path".to_string()))?;

    let mut path = static_dir.join(&relative);
    if path.is_dir() {
        path = path.join("index.html");
    }

    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(_) => return Err(AppError::NotFound),
    };

    let content_type = content_type
        .map(str::to_string)
        .unwrap_or_else(|| guess_content_type(&path).to_string());

    Ok(([("Content-Type", content_type)], bytes).into_response())
}

/// Normalize a request path into a safe relative path, rejecting any
/// traversal outside the static directory.
fn sanitize(request_path: &str) -> Option<PathBuf> {
    let trimmed = request_path.trim_start_matches('/');
    let candidate = if trimmed.is_empty() {
        "index.html"
    } else {
        trimmed
    };

    let path = PathBuf::from(candidate);
    for component in path.components() {
        match component {
            Component::Normal(_) => {}
            _ => return None,
        }
    }
    Some(path)
}

fn guess_content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("html") => "text/html; charset=utf-8",
        Some("css") => "text/css",
        Some("js") => "text/javascript",
        Some("json") => "application/json",
        Some("xml") => "application/xml",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("ico") => "image/x-icon",
        Some("txt") => "text/plain; charset=utf-8",
        // extensionless build artifacts (posts, actor documents)
        None => "text/html; charset=utf-8",
        _ => "application/octet-stream",
    }
}
