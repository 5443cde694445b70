//! HTTP contract of the proxy: status codes, reply shapes and validation.

use project_tests::{SilentRelay, TestApp};
use serde_json::{json, Value};

#[tokio::test]
async fn test_non_post_on_action_endpoint_is_405() {
    let app = TestApp::spawn("ws://127.0.0.1:9").await.unwrap();

    for request in [
        app.client.get(app.url("/api/maritime/ais-stream")),
        app.client.put(app.url("/api/maritime/ais-stream")),
        app.client.delete(app.url("/api/maritime/ais-stream")),
    ] {
        let response = request.send().await.unwrap();
        assert_eq!(response.status().as_u16(), 405);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body, json!({ "message": "Method not allowed" }));
    }
}

#[tokio::test]
async fn test_unknown_or_missing_action_is_400() {
    let app = TestApp::spawn("ws://127.0.0.1:9").await.unwrap();

    let (status, body) = app.action(json!({ "action": "launch" })).await.unwrap();
    assert_eq!(status, 400);
    assert_eq!(body["message"], "Invalid action");

    let (status, body) = app.action(json!({})).await.unwrap();
    assert_eq!(status, 400);
    assert_eq!(body["message"], "Invalid action");
}

#[tokio::test]
async fn test_malformed_body_is_400() {
    let app = TestApp::spawn("ws://127.0.0.1:9").await.unwrap();
    let response = app
        .client
        .post(app.url("/api/maritime/ais-stream"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_connect_validation() {
    let app = TestApp::spawn("ws://127.0.0.1:9").await.unwrap();

    let (status, body) = app
        .action(json!({
            "action": "connect",
            "subscriptionConfig": { "boundingBoxes": [[[25.6, -80.2], [25.8, -79.9]]] },
        }))
        .await
        .unwrap();
    assert_eq!(status, 400);
    assert_eq!(body, json!({ "success": false, "message": "AIS API key is required" }));

    let (status, body) = app
        .action(json!({ "action": "connect", "aisApiKey": "key123", "subscriptionConfig": {} }))
        .await
        .unwrap();
    assert_eq!(status, 400);
    assert_eq!(body["message"], "Bounding boxes are required");

    let (status, _) = app
        .action(json!({
            "action": "connect",
            "aisApiKey": "key123",
            "subscriptionConfig": { "boundingBoxes": [[[125.6, -80.2], [25.8, -79.9]]] },
        }))
        .await
        .unwrap();
    assert_eq!(status, 400);

    let (_, body) = app.action(json!({ "action": "getStatus" })).await.unwrap();
    assert_eq!(body["totalConnections"], 0);
}

#[tokio::test]
async fn test_connect_then_status_is_connecting() {
    let relay = SilentRelay::start().await.unwrap();
    let app = TestApp::spawn(relay.url()).await.unwrap();

    let (status, body) = app
        .action(json!({
            "action": "connect",
            "aisApiKey": "key123",
            "subscriptionConfig": { "boundingBoxes": [[[25.6, -80.2], [25.8, -79.9]]] },
        }))
        .await
        .unwrap();
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "AIS Stream connection initiated");
    let id = body["connectionId"].as_str().unwrap().to_string();

    let (status, body) = app.status_of(&id).await.unwrap();
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    let connection = &body["connection"];
    assert_eq!(connection["id"], id.as_str());
    assert_eq!(connection["status"], "connecting");
    assert_eq!(connection["messageCount"], 0);
    assert_eq!(connection["recentMessages"], json!([]));
    assert!(connection["lastMessage"].is_null());
    assert!(connection["startTime"].is_string());
}

#[tokio::test]
async fn test_connection_ids_are_unique() {
    let relay = SilentRelay::start().await.unwrap();
    let app = TestApp::spawn(relay.url()).await.unwrap();

    let mut ids = Vec::new();
    for _ in 0..20 {
        ids.push(app.connect("key123").await.unwrap());
    }
    let total = ids.len();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), total);

    let (_, body) = app.action(json!({ "action": "getStatus" })).await.unwrap();
    assert_eq!(body["totalConnections"], 20);
    assert_eq!(body["connections"].as_array().unwrap().len(), 20);
}

#[tokio::test]
async fn test_unknown_id_is_404_for_every_action() {
    let app = TestApp::spawn("ws://127.0.0.1:9").await.unwrap();

    for action in ["getStatus", "disconnect", "updateSubscription"] {
        let (status, body) = app
            .action(json!({
                "action": action,
                "connectionId": "unknown-id",
                "subscriptionConfig": { "boundingBoxes": [[[0, 0], [1, 1]]] },
            }))
            .await
            .unwrap();
        assert_eq!(status, 404, "{} on an unknown id", action);
        assert_eq!(body, json!({ "message": "Connection not found" }));
    }
}

#[tokio::test]
async fn test_disconnect_twice_is_404() {
    let relay = SilentRelay::start().await.unwrap();
    let app = TestApp::spawn(relay.url()).await.unwrap();
    let id = app.connect("key123").await.unwrap();

    let (status, body) = app
        .action(json!({ "action": "disconnect", "connectionId": id }))
        .await
        .unwrap();
    assert_eq!(status, 200);
    assert_eq!(body, json!({ "success": true, "message": "Connection closed" }));

    let (status, _) = app
        .action(json!({ "action": "disconnect", "connectionId": id }))
        .await
        .unwrap();
    assert_eq!(status, 404);

    let (status, _) = app.status_of(&id).await.unwrap();
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_update_while_connecting_is_rejected() {
    let relay = SilentRelay::start().await.unwrap();
    let app = TestApp::spawn(relay.url()).await.unwrap();
    let id = app.connect("key123").await.unwrap();

    let (status, body) = app
        .action(json!({
            "action": "updateSubscription",
            "connectionId": id,
            "subscriptionConfig": { "boundingBoxes": [[[0, 0], [1, 1]]] },
        }))
        .await
        .unwrap();
    assert_eq!(status, 400);
    assert_eq!(body, json!({ "message": "Connection is not active" }));

    let (_, body) = app.status_of(&id).await.unwrap();
    assert_eq!(body["connection"]["status"], "connecting");
}

#[tokio::test]
async fn test_system_status_and_health() {
    let relay = SilentRelay::start().await.unwrap();
    let app = TestApp::spawn(relay.url()).await.unwrap();
    app.connect("key123").await.unwrap();
    app.connect("key123").await.unwrap();

    let body: Value = app
        .client
        .get(app.url("/api/maritime/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["success"], true);
    let data = &body["data"];
    assert_eq!(data["aisStreamStatus"]["upstreamUrl"], relay.url().as_str());
    assert_eq!(data["aisStreamStatus"]["connectionCount"], 2);
    assert_eq!(data["trackingStats"]["activeConnections"], 2);
    assert_eq!(data["trackingStats"]["messageCount"], 0);
    assert!(data["lastUpdate"].is_string());

    let response = app.client.post(app.url("/api/maritime/status")).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 405);

    let response = app.client.get(app.url("/health")).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.text().await.unwrap(), "OK");
}
