//! Inbound message authentication
//!
//! Every activity handed to the dispatcher passes through
//! [`authenticate`] first: digest check, Date freshness, Signature
//! parsing, actor resolution, and RSA verification of the signing
//! string. Failures before key material is involved are `BadRequest`;
//! failures of the key or the signature itself are `Unauthorized`.

use chrono::{DateTime, Duration, Utc};
use http::HeaderMap;
use serde_json::Value;

use crate::data::Actor;
use crate::error::AppError;

use super::actor::fetch_actor;
use super::delivery::Deliverer;
use super::signature;

/// Maximum accepted age of the `Date` header, in hours.
const MAX_DATE_AGE_HOURS: i64 = 2;

/// Authenticate an inbound request carrying an activity.
///
/// # Arguments
/// * `method`/`path` - request line parts, for `(request-target)`
/// * `headers` - all request headers
/// * `body` - the raw activity JSON bytes
/// * `activity` - the parsed body (for the `actor` field)
///
/// # Returns
/// The resolved actor with its public key stripped, ready to be
/// embedded into stored documents.
pub async fn authenticate(
    method: &str,
    path: &str,
    headers: &HeaderMap,
    body: &[u8],
    activity: &Value,
    deliverer: &Deliverer,
) -> Result<Actor, AppError> {
    // 1. Date freshness
    let date_header = header_str(headers, "date")
        .ok_or_else(|| AppError::BadRequest("no date header".to_string()))?;
    let request_date = DateTime::parse_from_rfc2822(date_header)
        .map_err(|e| AppError::BadRequest(format!("improper date header: {e}")))?;
    if Utc::now().signed_duration_since(request_date) >= Duration::hours(MAX_DATE_AGE_HOURS) {
        return Err(AppError::BadRequest("date header too old".to_string()));
    }

    // 2. Digest over the raw body
    let digest_header = header_str(headers, "digest")
        .ok_or_else(|| AppError::BadRequest("no digest header".to_string()))?;
    signature::verify_digest(digest_header, body)?;

    // 3. Signature parameters
    let signature_header = header_str(headers, "signature")
        .ok_or_else(|| AppError::BadRequest("no signature header".to_string()))?;
    let parsed =
        signature::parse_signature_header(signature_header, signature::POST_SIGNED_HEADERS)?;

    // 4. The activity's actor must own the signing key. Embedded actor
    //    objects skip this check; their key is taken as presented.
    let actor_ref = activity
        .get("actor")
        .ok_or_else(|| AppError::BadRequest("no actor found".to_string()))?;
    if let Some(actor_url) = actor_ref.as_str() {
        let key_url = parsed.key_id.split('#').next().unwrap_or(&parsed.key_id);
        if key_url != actor_url {
            return Err(AppError::BadRequest(
                "actor does not match key in signature".to_string(),
            ));
        }
    }

    // 5. Resolve the actor and its RSA key. Anything going wrong with
    //    the fetch itself is still the sender's problem.
    let mut actor = fetch_actor(actor_ref, deliverer)
        .await
        .map_err(|e| match e {
            AppError::BadRequest(msg) => AppError::BadRequest(msg),
            other => AppError::BadRequest(format!("couldn't fetch actor: {other}")),
        })?;
    let pem = actor
        .public_key
        .as_ref()
        .map(|key| key.public_key_pem.clone())
        .unwrap_or_default();
    let public_key = signature::public_key_from_pem(&pem)?;
    // erase the public key so we don't bloat our stored objects
    actor.public_key = None;

    // 6. Rebuild the signing string from the headers the sender
    //    declared, and verify.
    let host = header_str(headers, "host").unwrap_or_default();
    let signing = signature::signing_string(host, method, path, &parsed.headers, headers);
    signature::verify(&signing, &parsed.signature, &public_key)?;

    Ok(actor)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}
