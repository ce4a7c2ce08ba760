//! Activity delivery
//!
//! Signs and POSTs activities to remote inboxes, and performs the
//! signed GETs used for actor resolution.

use std::sync::Arc;

use serde_json::Value;
use url::Url;

use crate::data::Actor;
use crate::error::AppError;

/// Outbound sender
///
/// Holds the HTTP client and the site's signing identity. The private
/// key PEM is parsed per call and never logged.
#[derive(Clone)]
pub struct Deliverer {
    http_client: Arc<reqwest::Client>,
    /// keyId advertised in Signature headers
    key_id: String,
    /// PKCS#8 PEM private key
    private_key_pem: String,
}

/// Hosts excluded from `Update` broadcasts: the Bluesky bridge does
/// not accept edits.
const BRIDGE_INBOX_PREFIX: &str = "https://bsky.brid.gy/";

/// True when an inbox lives on the Bluesky bridge.
pub fn is_bridge_inbox(inbox: &str) -> bool {
    inbox.starts_with(BRIDGE_INBOX_PREFIX)
}

impl Deliverer {
    pub fn new(
        http_client: Arc<reqwest::Client>,
        key_id: String,
        private_key_pem: String,
    ) -> Self {
        Self {
            http_client,
            key_id,
            private_key_pem,
        }
    }

    /// Sign and POST an activity to one inbox.
    ///
    /// Any 2xx is success; anything else is an error carrying the
    /// status and response body.
    pub async fn send_activity(&self, activity: &Value, inbox_uri: &str) -> Result<(), AppError> {
        let url = Url::parse(inbox_uri)
            .map_err(|e| AppError::BadRequest(format!("couldn't parse inbox URI: {e}")))?;
        let body = serde_json::to_vec(activity)?;

        let headers = super::signature::sign_request(
            "POST",
            &url,
            &body,
            &self.private_key_pem,
            &self.key_id,
        )?;

        let response = self
            .http_client
            .post(url)
            .headers(headers)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Internal(anyhow::anyhow!(
                "instance did not accept activity: {status}: {body}"
            )));
        }

        tracing::info!(inbox = %inbox_uri, "delivered activity");
        Ok(())
    }

    /// Sign and POST an activity to an actor's inbox.
    pub async fn send_to_actor(&self, activity: &Value, actor: &Actor) -> Result<(), AppError> {
        self.send_activity(activity, &actor.inbox).await
    }

    /// Signed GET returning the raw response body.
    ///
    /// Sends the ActivityStreams Accept profile; the digest covers the
    /// empty body.
    pub async fn signed_get(&self, uri: &str) -> Result<Vec<u8>, AppError> {
        let url = Url::parse(uri)
            .map_err(|e| AppError::BadRequest(format!("couldn't parse URI: {e}")))?;

        let headers =
            super::signature::sign_request("GET", &url, b"", &self.private_key_pem, &self.key_id)?;

        let response = self
            .http_client
            .get(url)
            .headers(headers)
            .header(
                "Accept",
                "application/ld+json; profile=\"https://www.w3.org/ns/activitystreams\"",
            )
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::BadRequest(format!(
                "fetch of {uri} failed: HTTP {status}"
            )));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

/// Build the Accept activity acknowledging a Follow.
///
/// The original Follow activity is embedded verbatim as the object, as
/// the remote server expects it echoed back.
pub fn accept_activity(site_actor_uri: &str, follower_handle: &str, follow: &Value) -> Value {
    serde_json::json!({
        "@context": "https://www.w3.org/ns/activitystreams",
        "id": format!("{site_actor_uri}#accepts/follows/{follower_handle}"),
        "type": "Accept",
        "actor": site_actor_uri,
        "object": follow,
    })
}
