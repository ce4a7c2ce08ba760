//! Actor resolution
//!
//! Resolves an actor reference — a URI or an object embedded in the
//! activity — to a validated [`Actor`] record.

use serde_json::Value;

use crate::data::Actor;
use crate::error::AppError;

use super::delivery::Deliverer;

/// Resolve an actor reference to a validated actor.
///
/// A URI reference is dereferenced with a signed GET; an embedded
/// object is reserialized and reparsed (rare enough that the extra
/// trip doesn't matter). The result must carry an inbox, a name or
/// preferred username, and a public key PEM.
pub async fn fetch_actor(reference: &Value, deliverer: &Deliverer) -> Result<Actor, AppError> {
    let raw = match reference {
        Value::String(uri) => deliverer.signed_get(uri).await?,
        Value::Object(_) => serde_json::to_vec(reference)?,
        _ => return Err(AppError::BadRequest("unknown actor type".to_string())),
    };

    let actor: Actor = serde_json::from_slice(&raw)
        .map_err(|e| AppError::BadRequest(format!("bad json syntax: {e}")))?;

    if actor
        .public_key
        .as_ref()
        .map(|key| key.public_key_pem.is_empty())
        .unwrap_or(true)
    {
        return Err(AppError::BadRequest(
            "no actor public key found".to_string(),
        ));
    }
    actor.validate()?;

    Ok(actor)
}

/// Resolve an actor by URI (signed GET).
pub async fn fetch_actor_by_uri(uri: &str, deliverer: &Deliverer) -> Result<Actor, AppError> {
    fetch_actor(&Value::String(uri.to_string()), deliverer).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn deliverer() -> Deliverer {
        Deliverer::new(
            Arc::new(reqwest::Client::new()),
            "https://blog.example.com/ap/user/blog#main-key".to_string(),
            String::new(),
        )
    }

    #[tokio::test]
    async fn embedded_actor_is_validated_without_network() {
        let embedded = json!({
            "id": "https://example.social/users/alice",
            "preferredUsername": "alice",
            "inbox": "https://example.social/users/alice/inbox",
            "icon": {"type": "Image", "url": "https://example.social/a.png"},
            "publicKey": {"publicKeyPem": "-----BEGIN PUBLIC KEY-----\nx\n-----END PUBLIC KEY-----"}
        });

        let actor = fetch_actor(&embedded, &deliverer()).await.unwrap();
        assert_eq!(actor.handle(), "alice@example.social");
        assert_eq!(actor.icon.as_deref(), Some("https://example.social/a.png"));
    }

    #[tokio::test]
    async fn embedded_actor_missing_key_or_inbox_is_rejected() {
        let no_key = json!({
            "id": "https://example.social/users/alice",
            "preferredUsername": "alice",
            "inbox": "https://example.social/users/alice/inbox"
        });
        assert!(matches!(
            fetch_actor(&no_key, &deliverer()).await,
            Err(AppError::BadRequest(msg)) if msg.contains("public key")
        ));

        let no_inbox = json!({
            "id": "https://example.social/users/alice",
            "preferredUsername": "alice",
            "publicKey": {"publicKeyPem": "pem"}
        });
        assert!(fetch_actor(&no_inbox, &deliverer()).await.is_err());

        let no_name = json!({
            "id": "https://example.social/users/alice",
            "inbox": "https://example.social/users/alice/inbox",
            "publicKey": {"publicKeyPem": "pem"}
        });
        assert!(fetch_actor(&no_name, &deliverer()).await.is_err());
    }

    #[tokio::test]
    async fn non_object_reference_is_rejected() {
        assert!(fetch_actor(&json!(42), &deliverer()).await.is_err());
        assert!(fetch_actor(&Value::Null, &deliverer()).await.is_err());
    }
}
