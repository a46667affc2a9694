//! Operator JSON surface, driven through the router without a socket.

mod common;

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{seed_registry, MockDelivery};
use fleetvisor::server::{router, ApiState};
use fleetvisor::{EngineConfig, RolloutEngine, Scheduler, SchedulerConfig};

async fn state(device_count: usize) -> Arc<ApiState> {
    let registry = seed_registry(device_count).await;
    let engine = Arc::new(
        RolloutEngine::new(
            EngineConfig::default(),
            Arc::clone(&registry),
            Arc::new(MockDelivery::new()),
        )
        .expect("engine"),
    );
    let scheduler = Arc::new(Scheduler::new(
        SchedulerConfig {
            tick_interval: Duration::from_secs(3600),
            max_concurrent_updates: 5,
        },
        engine,
        Arc::clone(&registry),
    ));
    Arc::new(ApiState {
        scheduler,
        registry,
    })
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).expect("request")
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

#[tokio::test]
async fn devices_are_listed_and_fetched() {
    let app = router(state(2).await);

    let response = app.clone().oneshot(get("/api/devices")).await.expect("list");
    assert_eq!(response.status(), StatusCode::OK);
    let devices = body_json(response).await;
    assert_eq!(devices.as_array().map(Vec::len), Some(2));

    let response = app.clone().oneshot(get("/api/devices/d1")).await.expect("get");
    assert_eq!(response.status(), StatusCode::OK);
    let device = body_json(response).await;
    assert_eq!(device["id"], "d1");

    let response = app.oneshot(get("/api/devices/ghost")).await.expect("get");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn schedule_status_cancel_roundtrip() {
    let app = router(state(2).await);

    let mut tmp = tempfile::NamedTempFile::new().expect("tempfile");
    tmp.write_all(b"image-bytes").expect("write payload");

    let update = json!({
        "id": "u1",
        "strategy": "immediate",
        "filter": {},
        "payload_url": tmp.path().to_str().expect("utf8 path"),
    });
    let response = app
        .clone()
        .oneshot(post_json("/api/updates/schedule", update))
        .await
        .expect("schedule");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "scheduled");

    // The scheduler's tick never fires in this test, so the update stays
    // queued and the status is synthesized.
    let response = app.clone().oneshot(get("/api/updates/u1")).await.expect("status");
    assert_eq!(response.status(), StatusCode::OK);
    let status = body_json(response).await;
    assert_eq!(status["status"], "pending");
    assert_eq!(status["total_devices"], 0);

    let response = app
        .clone()
        .oneshot(get("/api/updates"))
        .await
        .expect("list updates");
    let all = body_json(response).await;
    assert_eq!(all.as_array().map(Vec::len), Some(1));

    let response = app
        .clone()
        .oneshot(post_json("/api/updates/cancel", json!({ "update_id": "u1" })))
        .await
        .expect("cancel");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "cancelled");

    let response = app.oneshot(get("/api/updates/u1")).await.expect("status");
    assert_eq!(body_json(response).await["status"], "cancelled");
}

#[tokio::test]
async fn schedule_validation_maps_to_4xx() {
    let app = router(state(1).await);

    // Missing payload_url.
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/updates/schedule",
            json!({ "id": "u1", "strategy": "immediate", "filter": {} }),
        ))
        .await
        .expect("schedule");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Scheduled strategy without a time.
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/updates/schedule",
            json!({
                "id": "u2",
                "strategy": "scheduled",
                "filter": {},
                "payload_url": "/tmp/image.bin",
            }),
        ))
        .await
        .expect("schedule");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Unknown update id.
    let response = app
        .oneshot(post_json("/api/updates/cancel", json!({ "update_id": "nope" })))
        .await
        .expect("cancel");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_update_status_is_404() {
    let app = router(state(1).await);
    let response = app.oneshot(get("/api/updates/ghost")).await.expect("status");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
