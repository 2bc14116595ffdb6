//! Extended metadata integration tests, including a remote metadata
//! endpoint and a stand-in AI tagging model.

mod common;

use axum::{routing::post, Json, Router};
use common::{TestOptions, TestServer};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpListener;

/// Stand-in AI model answering every request with the same suggestion
async fn start_fake_ai() -> String {
    async fn generate(Json(body): Json<Value>) -> Json<Value> {
        Json(json!({
            "alt_text": format!("Photo for {}", body["media_id"].as_str().unwrap_or("")),
            "tags": ["shoe", "red", "shoe"],
            "confidence": 0.92,
            "echo_url": body["image_url"],
        }))
    }

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let app = Router::new().route("/generate", post(generate));
        let _ = axum::serve(listener, app).await;
    });
    tokio::time::sleep(Duration::from_millis(20)).await;

    format!("http://{}/generate", addr)
}

#[tokio::test]
async fn test_patch_then_get() {
    let server = TestServer::start().await;
    let client = server.client();

    let response = client
        .patch(server.url("/api/media/metadata"))
        .json(&json!({
            "media_id": "m1",
            "title": "Red running shoe",
            "focal_point": { "x": 0.5, "y": 0.25 }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let response = client
        .patch(server.url("/api/media/metadata"))
        .json(&json!({ "media_id": "m1", "caption": "Side view" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let json: Value = client
        .get(server.url("/api/media/metadata?media_id=m1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(json["title"], "Red running shoe");
    assert_eq!(json["caption"], "Side view");
    assert_eq!(json["focal_point"]["y"], 0.25);

    let response = client
        .get(server.url("/api/media/metadata?media_id=unknown"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_patch_validation() {
    let server = TestServer::start().await;
    let client = server.client();

    let response = client
        .patch(server.url("/api/media/metadata"))
        .json(&json!({ "media_id": "m1", "focal_point": { "x": 2.0, "y": 0.5 } }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let response = client
        .patch(server.url("/api/media/metadata"))
        .json(&json!({ "media_id": "m1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let response = client
        .get(server.url("/api/media/metadata"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_bulk_update_and_many_get() {
    let server = TestServer::start().await;
    let client = server.client();

    let response = client
        .put(server.url("/api/media/metadata"))
        .json(&json!({ "media_ids": ["a", "b"], "category": "footwear" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let json: Value = response.json().await.unwrap();
    assert_eq!(json["updated"], 2);

    let json: Value = client
        .get(server.url("/api/media/metadata?media_ids=a,b,c"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let entries = json.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e["category"] == "footwear"));
}

#[tokio::test]
async fn test_bulk_tags_add_then_remove() {
    let server = TestServer::start().await;
    let client = server.client();

    client
        .patch(server.url("/api/media/metadata"))
        .json(&json!({ "media_id": "a", "tags": ["product"] }))
        .send()
        .await
        .unwrap();

    let json: Value = client
        .post(server.url("/api/media/tags"))
        .json(&json!({ "media_ids": ["a", "b"], "tags": ["sale", "q4"], "action": "add" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(json["updated"], 2);

    let a: Value = client
        .get(server.url("/api/media/metadata?media_id=a"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(a["tags"], json!(["product", "sale", "q4"]));

    let json: Value = client
        .post(server.url("/api/media/tags"))
        .json(&json!({ "media_ids": ["a", "b"], "tags": ["sale", "q4"], "action": "remove" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(json["updated"], 2);

    let a: Value = client
        .get(server.url("/api/media/metadata?media_id=a"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(a["tags"], json!(["product"]));
}

#[tokio::test]
async fn test_delete_metadata() {
    let server = TestServer::start().await;
    let client = server.client();

    client
        .patch(server.url("/api/media/metadata"))
        .json(&json!({ "media_id": "a", "title": "A" }))
        .send()
        .await
        .unwrap();

    let json: Value = client
        .delete(server.url("/api/media/metadata?media_id=a"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(json["deleted"], true);

    let json: Value = client
        .delete(server.url("/api/media/metadata?media_id=a"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(json["deleted"], false);
}

#[tokio::test]
async fn test_deleting_media_drops_its_metadata() {
    let server = TestServer::start().await;
    let client = server.client();
    let uploaded = server.upload_png("a.png", 10, 10).await;
    let id = uploaded["id"].as_str().unwrap();

    client
        .patch(server.url("/api/media/metadata"))
        .json(&json!({ "media_id": id, "title": "A" }))
        .send()
        .await
        .unwrap();

    let response = client
        .delete(server.url(&format!("/api/media/items/{}", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let response = client
        .get(server.url(&format!("/api/media/metadata?media_id={}", id)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_needs_seo_listing() {
    let server = TestServer::start().await;
    let client = server.client();
    let done = server.upload_png("done.png", 10, 10).await;
    tokio::time::sleep(Duration::from_millis(2)).await;
    let pending = server.upload_png("pending.png", 10, 10).await;

    client
        .patch(server.url("/api/media/metadata"))
        .json(&json!({ "media_id": done["id"], "seo_filename": "done-shoe" }))
        .send()
        .await
        .unwrap();

    let json: Value = client
        .get(server.url("/api/media/needs-seo"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(json["total"], 1);
    assert_eq!(json["items"][0]["id"], pending["id"]);
}

#[tokio::test]
async fn test_ai_generation() {
    let ai_endpoint = start_fake_ai().await;
    let server = TestServer::start_with(TestOptions {
        ai_endpoint: Some(ai_endpoint),
        ..Default::default()
    })
    .await;
    let uploaded = server.upload_png("shoe.png", 10, 10).await;
    let id = uploaded["id"].as_str().unwrap();

    let response = server
        .client()
        .post(server.url("/api/media/metadata/ai"))
        .json(&json!({ "media_id": id }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let json: Value = response.json().await.unwrap();
    assert_eq!(json["ai_alt_text"], format!("Photo for {}", id));
    assert_eq!(json["ai_tags"], json!(["shoe", "red"]));
    assert!((json["ai_confidence"].as_f64().unwrap() - 0.92).abs() < 1e-4);
}

#[tokio::test]
async fn test_ai_generation_without_model() {
    let server = TestServer::start().await;

    let response = server
        .client()
        .post(server.url("/api/media/metadata/ai"))
        .json(&json!({ "media_id": "m1", "image_url": "http://example.com/a.png" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 500);
}

#[tokio::test]
async fn test_remote_metadata_endpoint() {
    let primary = TestServer::start().await;
    let edge = TestServer::start_with(TestOptions {
        metadata_endpoint: Some(primary.public_url.clone()),
        ..Default::default()
    })
    .await;
    let client = edge.client();

    let response = client
        .patch(edge.url("/api/media/metadata"))
        .json(&json!({ "media_id": "m1", "title": "Stored remotely" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    // Written through to the primary instance
    let json: Value = client
        .get(primary.url("/api/media/metadata?media_id=m1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(json["title"], "Stored remotely");

    let json: Value = client
        .put(edge.url("/api/media/metadata"))
        .json(&json!({ "media_ids": ["m1", "m2"], "copyright": "ACME" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(json["updated"], 2);

    let json: Value = client
        .post(edge.url("/api/media/tags"))
        .json(&json!({ "media_ids": ["m1"], "tags": ["remote"], "action": "add" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(json["updated"], 1);

    let json: Value = client
        .get(primary.url("/api/media/metadata?media_id=m1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(json["copyright"], "ACME");
    assert_eq!(json["tags"], json!(["remote"]));

    let response = client
        .get(edge.url("/api/media/metadata?media_id=missing"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    let json: Value = client
        .delete(edge.url("/api/media/metadata?media_id=m2"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(json["deleted"], true);
}
