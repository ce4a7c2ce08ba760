//! Federation data models
//!
//! Structs for the documents persisted in the store and the
//! ActivityPub objects they are parsed from. Persisted documents use
//! PascalCase field names (`Id`, `Actor`, `Replies.Items`); inbound
//! wire JSON is camelCase ActivityStreams, accepted through serde
//! aliases on the same structs.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use url::Url;

use crate::error::AppError;

// =============================================================================
// Actor
// =============================================================================

/// Public key block of a fetched actor document.
///
/// Stripped before an actor is embedded into any stored document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorKey {
    #[serde(rename = "PublicKeyPem", alias = "publicKeyPem", default)]
    pub public_key_pem: String,
}

/// A federated identity document for a remote user or service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Actor {
    #[serde(alias = "id", default)]
    pub id: String,

    #[serde(alias = "name", default)]
    pub name: String,

    #[serde(alias = "preferredUsername", default)]
    pub preferred_username: String,

    #[serde(alias = "inbox", default)]
    pub inbox: String,

    /// Avatar URL. Remote servers send either a bare URL string or an
    /// Image object; the object form collapses to its `url` member.
    #[serde(alias = "icon", default, deserialize_with = "icon_url")]
    pub icon: Option<String>,

    #[serde(
        alias = "publicKey",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub public_key: Option<ActorKey>,
}

fn icon_url<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Object(map)) => map
            .get("url")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    })
}

impl Actor {
    /// Check the fields every usable actor record must carry.
    ///
    /// The public key is checked separately at fetch time; stored
    /// actors no longer have one.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.id.is_empty() || Url::parse(&self.id).is_err() {
            return Err(AppError::BadRequest("no actor id found".to_string()));
        }
        if self.inbox.is_empty() {
            return Err(AppError::BadRequest("no actor inbox found".to_string()));
        }
        if self.name.is_empty() && self.preferred_username.is_empty() {
            return Err(AppError::BadRequest("no actor name found".to_string()));
        }
        Ok(())
    }

    /// Derived `user@host` handle, the follower document key.
    ///
    /// Prefers `preferredUsername`; the host keeps an explicit port.
    pub fn handle(&self) -> String {
        let host = Url::parse(&self.id)
            .ok()
            .and_then(|u| {
                u.host_str().map(|host| match u.port() {
                    Some(port) => format!("{host}:{port}"),
                    None => host.to_string(),
                })
            })
            .unwrap_or_default();
        let name = if self.preferred_username.is_empty() {
            &self.name
        } else {
            &self.preferred_username
        };
        format!("{name}@{host}")
    }

    /// Copy of this actor without the public key, the form embedded in
    /// stored documents.
    pub fn stripped(&self) -> Actor {
        Actor {
            public_key: None,
            ..self.clone()
        }
    }
}

// =============================================================================
// Reply
// =============================================================================

/// Downward links of a reply: the ids of its direct children.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReplyCollection {
    #[serde(alias = "id", default)]
    pub id: String,

    /// Child entries. Only URI strings are ever appended locally, but
    /// remote notes may carry arbitrary collection items; non-string
    /// entries are preserved and skipped during traversal.
    #[serde(alias = "items", default)]
    pub items: Vec<Value>,
}

impl ReplyCollection {
    /// The child ids that are plain URI strings.
    pub fn item_ids(&self) -> impl Iterator<Item = &str> {
        self.items.iter().filter_map(Value::as_str)
    }
}

/// A node of the reply tree: a remote comment on a post, or the
/// tombstone left where one used to be.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Reply {
    #[serde(alias = "id", default)]
    pub id: String,

    /// "Note", or "Tombstone" once deleted with live descendants
    #[serde(rename = "Type", alias = "type", default)]
    pub kind: String,

    #[serde(alias = "inReplyTo", default)]
    pub in_reply_to: String,

    #[serde(alias = "published", default)]
    pub published: String,

    #[serde(alias = "updated", default)]
    pub updated: String,

    #[serde(alias = "url", default)]
    pub url: String,

    #[serde(alias = "attributedTo", default)]
    pub attributed_to: String,

    #[serde(alias = "to", default)]
    pub to: Vec<String>,

    #[serde(alias = "cc", default)]
    pub cc: Vec<String>,

    #[serde(alias = "content", default)]
    pub content: String,

    #[serde(alias = "replies", default)]
    pub replies: ReplyCollection,

    #[serde(alias = "actor", default)]
    pub actor: Option<Actor>,
}

impl Reply {
    /// Convert this node to a tombstone.
    ///
    /// `id` and the child links survive; everything that identified
    /// the author or carried content is cleared.
    pub fn entomb(&mut self) {
        self.kind = "Tombstone".to_string();
        self.url.clear();
        self.attributed_to.clear();
        self.to.clear();
        self.cc.clear();
        self.content.clear();
        self.actor = None;
    }

    pub fn is_tombstone(&self) -> bool {
        self.kind == "Tombstone"
    }
}

// =============================================================================
// Likes and shares
// =============================================================================

/// One Like or Announce activity, stored under the slug of its own id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LikeOrShare {
    #[serde(alias = "id", default)]
    pub id: String,

    #[serde(alias = "url", default)]
    pub url: String,

    /// The post this endorsement targets
    #[serde(alias = "object", default)]
    pub object: String,

    #[serde(alias = "actor", default)]
    pub actor: Option<Actor>,
}

/// Per-post aggregator document listing endorsement activity URIs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Aggregate {
    #[serde(alias = "id", default)]
    pub id: String,

    #[serde(alias = "items", default)]
    pub items: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn actor_parses_wire_json_and_persists_pascal_case() {
        let actor: Actor = serde_json::from_value(json!({
            "id": "https://example.social/users/alice",
            "preferredUsername": "alice",
            "name": "Alice",
            "inbox": "https://example.social/users/alice/inbox",
            "icon": {"type": "Image", "url": "https://example.social/a.png"},
            "publicKey": {"publicKeyPem": "-----BEGIN PUBLIC KEY-----"}
        }))
        .unwrap();

        assert_eq!(actor.preferred_username, "alice");
        assert_eq!(actor.icon.as_deref(), Some("https://example.social/a.png"));
        assert!(actor.public_key.is_some());

        let doc = serde_json::to_value(actor.stripped()).unwrap();
        assert_eq!(doc["Id"], "https://example.social/users/alice");
        assert_eq!(doc["PreferredUsername"], "alice");
        assert_eq!(doc["Icon"], "https://example.social/a.png");
        assert!(doc.get("PublicKey").is_none());

        // Stored documents round-trip through the same struct.
        let reparsed: Actor = serde_json::from_value(doc).unwrap();
        assert_eq!(reparsed.handle(), "alice@example.social");
    }

    #[test]
    fn handle_prefers_preferred_username_and_keeps_port() {
        let mut actor = Actor {
            id: "https://example.social:8443/users/alice".to_string(),
            name: "Alice Fullname".to_string(),
            preferred_username: "alice".to_string(),
            inbox: "https://example.social/inbox".to_string(),
            icon: None,
            public_key: None,
        };
        assert_eq!(actor.handle(), "alice@example.social:8443");

        actor.preferred_username.clear();
        assert_eq!(actor.handle(), "Alice Fullname@example.social:8443");
    }

    #[test]
    fn actor_validation_requires_id_inbox_and_a_name() {
        let valid = Actor {
            id: "https://example.social/users/alice".to_string(),
            name: String::new(),
            preferred_username: "alice".to_string(),
            inbox: "https://example.social/inbox".to_string(),
            icon: None,
            public_key: None,
        };
        assert!(valid.validate().is_ok());

        let mut no_inbox = valid.clone();
        no_inbox.inbox.clear();
        assert!(no_inbox.validate().is_err());

        let mut no_name = valid.clone();
        no_name.preferred_username.clear();
        assert!(no_name.validate().is_err());

        let mut bad_id = valid;
        bad_id.id = "not a uri".to_string();
        assert!(bad_id.validate().is_err());
    }

    #[test]
    fn reply_parses_wire_note() {
        let reply: Reply = serde_json::from_value(json!({
            "id": "https://example.social/notes/1",
            "type": "Note",
            "inReplyTo": "https://site.example/posts/p1",
            "published": "2026-05-01T10:00:00Z",
            "url": "https://example.social/@alice/1",
            "attributedTo": "https://example.social/users/alice",
            "to": ["https://www.w3.org/ns/activitystreams#Public"],
            "content": "<p>hello</p>",
            "replies": {"id": "https://example.social/notes/1/replies", "items": []}
        }))
        .unwrap();

        assert_eq!(reply.kind, "Note");
        assert_eq!(reply.in_reply_to, "https://site.example/posts/p1");
        assert!(reply.replies.items.is_empty());

        let doc = serde_json::to_value(&reply).unwrap();
        assert_eq!(doc["Type"], "Note");
        assert_eq!(doc["InReplyTo"], "https://site.example/posts/p1");
        assert_eq!(doc["Replies"]["Id"], "https://example.social/notes/1/replies");
    }

    #[test]
    fn entomb_clears_author_and_content_but_keeps_links() {
        let mut reply = Reply {
            id: "https://example.social/notes/1".to_string(),
            kind: "Note".to_string(),
            in_reply_to: "https://site.example/posts/p1".to_string(),
            url: "https://example.social/@alice/1".to_string(),
            attributed_to: "https://example.social/users/alice".to_string(),
            to: vec!["https://www.w3.org/ns/activitystreams#Public".to_string()],
            content: "<p>hello</p>".to_string(),
            replies: ReplyCollection {
                id: "https://example.social/notes/1/replies".to_string(),
                items: vec![Value::String("https://example.social/notes/2".to_string())],
            },
            actor: Some(Actor::default()),
            ..Default::default()
        };

        reply.entomb();

        assert!(reply.is_tombstone());
        assert!(reply.url.is_empty());
        assert!(reply.attributed_to.is_empty());
        assert!(reply.content.is_empty());
        assert!(reply.to.is_empty());
        assert!(reply.actor.is_none());
        assert_eq!(reply.id, "https://example.social/notes/1");
        assert_eq!(reply.replies.item_ids().count(), 1);
    }
}
