mod common;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
};
use chrono::{Duration, Utc};
use common::TestHarness;
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;

const SONNET: &str = "claude-sonnet-4-20250514";

#[tokio::test]
async fn test_health_endpoint() {
    let harness = TestHarness::new().await;

    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = harness.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_post_event_returns_costs() {
    let harness = TestHarness::new().await;

    let (status, body) = harness
        .request(
            Method::POST,
            "/v1/events",
            Some(json!({
                "model": SONNET,
                "input_tokens": 1500,
                "output_tokens": 800,
                "user_id": "user-42",
                "feature": "summarize",
                "duration_ms": 950,
                "metadata": {"request_id": "abc"}
            })),
        )
        .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["input_cost"], "0.0045");
    assert_eq!(body["output_cost"], "0.012");
    assert_eq!(body["total_cost"], "0.0165");
    assert_eq!(body["duplicate"], false);
    assert!(Uuid::parse_str(body["id"].as_str().unwrap()).is_ok());
}

#[tokio::test]
async fn test_post_event_retry_is_acknowledged_as_duplicate() {
    let harness = TestHarness::new().await;
    let event = json!({
        "id": Uuid::new_v4(),
        "timestamp": (Utc::now() - Duration::minutes(5)).to_rfc3339(),
        "model": "gpt-4o",
        "input_tokens": 10,
        "output_tokens": 10
    });

    let (status, first) = harness.request(Method::POST, "/v1/events", Some(event.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["duplicate"], false);

    let (status, retry) = harness.request(Method::POST, "/v1/events", Some(event)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(retry["duplicate"], true);

    let (_, summary) = harness.request(Method::GET, "/v1/costs/summary?days=1", None).await;
    assert_eq!(summary["total_calls"], 1);
}

#[tokio::test]
async fn test_post_event_error_statuses() {
    let harness = TestHarness::new().await;

    let (status, body) = harness
        .request(
            Method::POST,
            "/v1/events",
            Some(json!({"model": "mystery-model", "input_tokens": 1, "output_tokens": 1})),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "unknown_model");

    let (status, body) = harness
        .request(
            Method::POST,
            "/v1/events",
            Some(json!({"model": SONNET, "input_tokens": -5, "output_tokens": 1})),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn test_batch_endpoint() {
    let harness = TestHarness::new().await;

    let (status, body) = harness
        .request(
            Method::POST,
            "/v1/events/batch",
            Some(json!({"events": [
                {"model": SONNET, "input_tokens": 1500, "output_tokens": 800},
                {"model": "gpt-4o", "input_tokens": 100, "output_tokens": 50}
            ]})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["accepted"], 2);
    assert_eq!(body["events"].as_array().unwrap().len(), 2);

    let (status, body) = harness
        .request(
            Method::POST,
            "/v1/events/batch",
            Some(json!({"events": [
                {"model": SONNET, "input_tokens": 1, "output_tokens": 1},
                {"model": "unknown", "input_tokens": 1, "output_tokens": 1}
            ]})),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["index"], 1);

    let (_, page) = harness.request(Method::GET, "/v1/events", None).await;
    assert_eq!(page["events"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_list_events_paging() {
    let harness = TestHarness::new().await;
    for _ in 0..3 {
        harness
            .request(
                Method::POST,
                "/v1/events",
                Some(json!({"model": "gpt-4o", "input_tokens": 1, "output_tokens": 1})),
            )
            .await;
    }

    let (status, first) = harness.request(Method::GET, "/v1/events?limit=2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["events"].as_array().unwrap().len(), 2);
    let cursor = first["next_cursor"].as_str().unwrap().to_string();

    let (status, second) = harness
        .request(
            Method::GET,
            &format!("/v1/events?limit=2&cursor={}", cursor),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["events"].as_array().unwrap().len(), 1);
    assert!(second["next_cursor"].is_null());

    let (status, body) = harness
        .request(Method::GET, "/v1/events?cursor=garbage", None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_cursor");
}

#[tokio::test]
async fn test_cost_endpoints() {
    let harness = TestHarness::new().await;
    for (model, user, feature) in [
        (SONNET, "alice", "chat"),
        (SONNET, "bob", "chat"),
        ("gpt-4o", "alice", "search"),
    ] {
        let (status, _) = harness
            .request(
                Method::POST,
                "/v1/events",
                Some(json!({
                    "model": model,
                    "input_tokens": 1000,
                    "output_tokens": 1000,
                    "user_id": user,
                    "feature": feature
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, summary) = harness.request(Method::GET, "/v1/costs/summary?days=7", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["total_calls"], 3);
    assert_eq!(summary["daily"].as_array().unwrap().len(), 7);

    let (status, by_model) = harness.request(Method::GET, "/v1/costs/by-model", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(by_model["items"][0]["key"], SONNET);
    assert_eq!(by_model["items"][0]["calls"], 2);

    let (_, by_user) = harness.request(Method::GET, "/v1/costs/by-user", None).await;
    assert_eq!(by_user["items"].as_array().unwrap().len(), 2);
    assert_eq!(by_user["items"][0]["key"], "alice");

    let (_, by_feature) = harness.request(Method::GET, "/v1/costs/by-feature", None).await;
    assert_eq!(by_feature["items"][0]["key"], "chat");

    let today = Utc::now().date_naive();
    let (status, rollups) = harness
        .request(
            Method::GET,
            &format!("/v1/costs/rollups?start={}&end={}&group_by=model,user_id", today, today),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rollups["rows"].as_array().unwrap().len(), 3);

    let (status, body) = harness
        .request(Method::GET, "/v1/costs/rollups?group_by=region", None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");

    let (status, _) = harness.request(Method::GET, "/v1/costs/summary?days=0", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
