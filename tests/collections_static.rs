//! Replies collection rendering, the followers collection, and the
//! static site surface.

mod common;

use common::{TestServer, ALICE};
use serde_json::{json, Value};

const REMOTE_INBOX: &str = "https://example.social/users/alice/inbox";

#[tokio::test]
async fn replies_collection_renders_uri_references() {
    let server = TestServer::new().await;
    let post = server.post_uri();
    let note = "https://example.social/notes/1";

    let create = json!({
        "@context": "https://www.w3.org/ns/activitystreams",
        "id": format!("{note}#create"),
        "type": "Create",
        "actor": server.embedded_actor(REMOTE_INBOX),
        "object": {
            "id": note,
            "type": "Note",
            "inReplyTo": post,
            "published": "2026-05-01T10:00:00Z",
            "url": "https://example.social/@alice/1",
            "attributedTo": ALICE,
            "content": "<p>hello</p>",
        },
    });
    assert_eq!(server.deliver(&create).await.status(), 200);

    // the id parameter also accepts the full post URI
    let response = server
        .client
        .get(server.url(&format!("/replies?id={post}")))
        .header("Accept", "application/activity+json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let collection: Value = response.json().await.unwrap();
    assert_eq!(collection["type"], "OrderedCollection");
    assert_eq!(collection["id"], format!("{post}/replies"));
    assert_eq!(collection["totalItems"], 1);
    assert_eq!(collection["items"], json!([note]));

    // non-ActivityPub clients get the plain URI list
    let plain: Value = server
        .client
        .get(server.url("/replies?id=p1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(plain, json!([note]));
}

#[tokio::test]
async fn followers_collection_lists_actor_uris() {
    let server = TestServer::new().await;

    let follow = json!({
        "@context": "https://www.w3.org/ns/activitystreams",
        "id": "https://example.social/activities/follow-1",
        "type": "Follow",
        "actor": server.embedded_actor(REMOTE_INBOX),
        "object": format!("{}/ap/user/blog", server.addr),
    });
    assert_eq!(server.deliver(&follow).await.status(), 200);

    let response = server
        .client
        .get(server.url("/ap/followers"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert!(response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .contains("activity+json"));

    let collection: Value = response.json().await.unwrap();
    assert_eq!(collection["type"], "OrderedCollection");
    assert_eq!(collection["totalItems"], 1);
    assert_eq!(collection["orderedItems"], json!([ALICE]));
}

#[tokio::test]
async fn actor_document_is_content_negotiated() {
    let server = TestServer::new().await;

    // ActivityPub clients get the JSON document
    let response = server
        .client
        .get(server.url("/ap/users/blog"))
        .header(
            "Accept",
            "application/ld+json; profile=\"https://www.w3.org/ns/activitystreams\"",
        )
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert!(response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .contains("activity+json"));
    let actor: Value = response.json().await.unwrap();
    assert_eq!(actor["preferredUsername"], "blog");

    // browsers are sent to the front page
    let plain_client = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap();
    let response = plain_client
        .get(server.url("/ap/users/blog"))
        .header("Accept", "text/html")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 307);
    assert_eq!(response.headers().get("location").unwrap(), "/");
}

#[tokio::test]
async fn outbox_and_webfinger_are_always_activity_json() {
    let server = TestServer::new().await;

    for path in ["/ap/outbox", "/.well-known/webfinger"] {
        let response = server.client.get(server.url(path)).send().await.unwrap();
        assert_eq!(response.status(), 200, "path {path}");
        assert!(
            response
                .headers()
                .get("content-type")
                .unwrap()
                .to_str()
                .unwrap()
                .contains("activity+json"),
            "path {path}"
        );
    }
}

#[tokio::test]
async fn static_posts_and_health_are_served() {
    let server = TestServer::new().await;

    let response = server
        .client
        .get(server.url("/posts/p1"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "<html>a post</html>");

    // HEAD works too; the reply-graph probes depend on it
    let response = server
        .client
        .head(server.url("/posts/p1"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let response = server
        .client
        .get(server.url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.text().await.unwrap(), "OK");

    let response = server
        .client
        .get(server.url("/posts/never-written"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}
