use std::sync::{Arc, Mutex};

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use rusqlite::Connection;
use schoolday_core::config::SchooldayConfig;
use schoolday_gateway::app::{build_router, AppState};
use schoolday_schedule::directory::{self, EntityKind};
use serde_json::{json, Value};
use tower::ServiceExt;

fn app_with(config: SchooldayConfig) -> Router {
    let conn = Arc::new(Mutex::new(Connection::open_in_memory().unwrap()));
    let state = AppState::new(config, conn.clone()).unwrap();
    {
        let c = conn.lock().unwrap();
        directory::upsert_school(&c, "S1", "North", 1, 8).unwrap();
        directory::upsert_entity(&c, EntityKind::Teacher, "t1", "S1", "Dana").unwrap();
        directory::upsert_entity(&c, EntityKind::Teacher, "t2", "S1", "Eli").unwrap();
    }
    build_router(Arc::new(state))
}

fn app() -> Router {
    app_with(SchooldayConfig::default())
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    send_with_token(app, method, uri, body, None).await
}

async fn send_with_token(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    token: Option<&str>,
) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(t) = token {
        req = req.header("authorization", format!("Bearer {t}"));
    }
    let req = match body {
        Some(b) => req
            .header("content-type", "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn health_reports_ok() {
    let (status, body) = send(&app(), "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn cell_write_is_visible_and_notified() {
    let app = app();
    let (_, poll) = send(&app, "GET", "/sync/poll", None).await;
    let cursor = poll["latestTs"].as_u64().unwrap();

    let (status, cell) = send(
        &app,
        "PUT",
        "/schedule/S1/2024-09-01/columns/c1/hours/3",
        Some(json!({"type": "missingTeacher", "issueTeacher": "t1", "subTeacher": "t2"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cell["payload"]["subTeacher"], "t2");

    let (status, day) = send(&app, "GET", "/schedule/S1/2024-09-01", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(day["columns"][0]["columnId"], "c1");
    assert_eq!(day["columns"][0]["cells"]["3"]["payload"]["issueTeacher"], "t1");

    let (_, poll) = send(&app, "GET", &format!("/sync/poll?since={cursor}&channels=teacher"), None).await;
    assert_eq!(poll["count"], 1);
    assert_eq!(poll["items"][0]["channel"], "teacher");
    assert_eq!(poll["items"][0]["schoolId"], "S1");
    assert_eq!(poll["resync"], false);
    assert_eq!(poll["pollIntervalSecs"], 30);

    let (_, poll) = send(&app, "GET", &format!("/sync/poll?since={cursor}&channels=event"), None).await;
    assert_eq!(poll["count"], 0);
}

#[tokio::test]
async fn hour_outside_school_range_is_a_bad_request() {
    let (status, body) = send(
        &app(),
        "PUT",
        "/schedule/S1/2024-09-01/columns/c1/hours/11",
        Some(json!({"type": "event", "eventTitle": "Trip"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn malformed_date_and_channel_are_rejected() {
    let app = app();
    let (status, _) = send(&app, "GET", "/schedule/S1/2024-13-45", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, body) = send(&app, "GET", "/sync/poll?since=0&channels=gossip", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "UNKNOWN_CHANNEL");
}

#[tokio::test]
async fn push_requires_token_when_configured() {
    let mut config = SchooldayConfig::default();
    config.gateway.push_token = Some("secret".to_string());
    let app = app_with(config);

    let uri = "/sync/push?type=material&schoolId=S1";
    let (status, _) = send(&app, "POST", uri, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send_with_token(&app, "POST", uri, None, Some("secret")).await;
    assert_eq!(status, StatusCode::OK);
    let ts = body["ts"].as_u64().unwrap();

    let (_, poll) = send(&app, "GET", &format!("/sync/poll?since={}", ts - 1), None).await;
    assert_eq!(poll["items"][0]["channel"], "material");
    assert_eq!(poll["latestTs"], ts);
}

#[tokio::test]
async fn batch_write_and_column_removal() {
    let app = app();
    let (status, cells) = send(
        &app,
        "PUT",
        "/schedule/S1/2024-09-01/columns/c1",
        Some(json!({"cells": [
            {"hour": 1, "payload": {"type": "existingTeacher", "issueTeacher": "t1"}},
            {"hour": 2, "payload": {"type": "existingTeacher", "issueTeacher": "t1"}}
        ]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cells.as_array().unwrap().len(), 2);

    let (_, body) = send(&app, "DELETE", "/schedule/S1/2024-09-01/columns/c1", None).await;
    assert_eq!(body["removed"], 2);
    let (_, body) = send(&app, "DELETE", "/schedule/S1/2024-09-01/columns/c1/hours/1", None).await;
    assert_eq!(body["deleted"], false);
}

#[tokio::test]
async fn created_columns_get_distinct_server_ids() {
    let app = app();
    let batch = json!({"cells": [
        {"hour": 2, "payload": {"type": "missingTeacher", "issueTeacher": "t1"}}
    ]});
    let (status, first) = send(&app, "POST", "/schedule/S1/2024-09-01/columns", Some(batch.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let (_, second) = send(&app, "POST", "/schedule/S1/2024-09-01/columns", Some(batch)).await;

    let first_id = first["columnId"].as_str().unwrap().to_string();
    assert_ne!(first_id, second["columnId"].as_str().unwrap());
    assert_eq!(first["cells"][0]["columnId"], first_id.as_str());

    let (_, day) = send(&app, "GET", "/schedule/S1/2024-09-01", None).await;
    assert_eq!(day["columns"].as_array().unwrap().len(), 2);
    assert_eq!(day["columns"][0]["columnId"], first_id.as_str());
}

#[tokio::test]
async fn columns_can_be_reordered() {
    let app = app();
    for col in ["a", "b"] {
        send(
            &app,
            "PUT",
            &format!("/schedule/S1/2024-09-01/columns/{col}/hours/1"),
            Some(json!({"type": "event", "eventTitle": col})),
        )
        .await;
    }
    let (status, _) = send(
        &app,
        "POST",
        "/schedule/S1/2024-09-01/columns/b/move",
        Some(json!({"after": null})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, day) = send(&app, "GET", "/schedule/S1/2024-09-01", None).await;
    assert_eq!(day["columns"][0]["columnId"], "b");
    assert_eq!(day["columns"][1]["columnId"], "a");
}

#[tokio::test]
async fn publish_archive_and_recommend() {
    let app = app();
    // 2024-09-01 is a Sunday
    send(
        &app,
        "PUT",
        "/schedule/S1/2024-09-01/columns/c1/hours/3",
        Some(json!({"type": "missingTeacher", "issueTeacher": "t1", "subTeacher": "t2"})),
    )
    .await;
    let (_, body) = send(
        &app,
        "PUT",
        "/schedule/S1/2024-09-01/publish",
        Some(json!({"published": true})),
    )
    .await;
    assert_eq!(body["changed"], true);

    let (status, outcome) = send(&app, "POST", "/archive?date=2024-09-01", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["success"], true);
    assert_eq!(outcome["stats"]["schoolsUpdated"], 1);
    assert_eq!(outcome["stats"]["recordsCount"], 1);
    assert!(outcome["logs"].as_array().unwrap().len() > 1);

    let (status, recs) = send(&app, "GET", "/recommend/S1/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(recs["success"], true);
    assert_eq!(recs["data"]["3"]["Dana"], json!(["Eli"]));
}

#[tokio::test]
async fn recommend_rejects_day_out_of_range() {
    let (status, body) = send(&app(), "GET", "/recommend/S1/9", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}
