//! E2E tests for .well-known endpoints (WebFinger, NodeInfo, host-meta)

mod common;

use common::TestServer;
use serde_json::Value;

#[tokio::test]
async fn test_webfinger_resolves_local_actor() {
    let server = TestServer::with_admin("bob").await;

    let response = server
        .client
        .get(&server.url(&format!(
            "/.well-known/webfinger?resource=acct:{}",
            server.handle("bob")
        )))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let json: Value = response.json().await.unwrap();
    assert_eq!(json["subject"], format!("acct:{}", server.handle("bob")));

    let self_link = json["links"]
        .as_array()
        .unwrap()
        .iter()
        .find(|link| link["rel"] == "self")
        .unwrap();
    assert_eq!(self_link["type"], "application/activity+json");
    assert_eq!(self_link["href"], server.actor_uri("bob"));
}

#[tokio::test]
async fn test_webfinger_foreign_domain_is_not_found() {
    let server = TestServer::with_admin("bob").await;

    // bob exists locally, but the resource names another host
    let response = server
        .client
        .get(&server.url("/.well-known/webfinger?resource=acct:bob@other.example"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_webfinger_unknown_user_is_not_found() {
    let server = TestServer::new().await;

    let response = server
        .client
        .get(&server.url(&format!(
            "/.well-known/webfinger?resource=acct:{}",
            server.handle("nobody")
        )))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_webfinger_malformed_resource() {
    let server = TestServer::new().await;

    for path in [
        "/.well-known/webfinger?resource=acct:nobody",
        "/.well-known/webfinger",
    ] {
        let response = server.client.get(&server.url(path)).send().await.unwrap();
        assert_eq!(response.status(), 400, "{path}");
    }
}

#[tokio::test]
async fn test_nodeinfo_discovery() {
    let server = TestServer::new().await;

    let links: Value = server
        .client
        .get(&server.url("/.well-known/nodeinfo"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let href = links["links"][0]["href"].as_str().unwrap();
    assert_eq!(href, server.url("/nodeinfo/2.0"));

    let nodeinfo: Value = server.client.get(href).send().await.unwrap().json().await.unwrap();
    assert_eq!(nodeinfo["version"], "2.0");
    assert_eq!(nodeinfo["protocols"][0], "activitypub");
    assert_eq!(nodeinfo["usage"]["users"]["total"], 1);
}

#[tokio::test]
async fn test_host_meta_endpoint() {
    let server = TestServer::new().await;

    let response = server
        .client
        .get(&server.url("/.well-known/host-meta"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "application/xrd+xml"
    );
    let body = response.text().await.unwrap();
    assert!(body.contains(&server.url("/.well-known/webfinger?resource={uri}")));
}
