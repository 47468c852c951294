use super::*;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;
use uatu_sweeper::web::{create_router, AppState};
use uatu_sweeper::MemoryStateStore;

async fn test_app(navigator: ScriptedNavigator) -> Router {
    let (scheduler, _join) =
        spawn_scheduler(Arc::new(navigator), Arc::new(MemoryStateStore::new()), QueueSettings::default()).await;
    create_router(AppState { scheduler })
}

async fn make_request(app: &Router, method: Method, uri: &str, body: Option<String>) -> anyhow::Result<(StatusCode, Value)> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.map(Body::from).unwrap_or_else(Body::empty))?;

    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    Ok((status, serde_json::from_slice(&bytes)?))
}

#[tokio::test(start_paused = true)]
async fn test_health_check() -> anyhow::Result<()> {
    let app = test_app(ScriptedNavigator::new()).await;

    let (status, body) = make_request(&app, Method::GET, "/health", None).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "healthy");
    assert_eq!(body["data"]["phase"], "idle");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_fresh_status_is_idle() -> anyhow::Result<()> {
    let app = test_app(ScriptedNavigator::new()).await;

    let (status, body) = make_request(&app, Method::GET, "/api/v1/queue/status", None).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["phase"], "idle");
    assert_eq!(body["data"]["cursor"], 0);
    assert_eq!(body["data"]["total"], 0);
    assert_eq!(body["data"]["results"], json!({}));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_start_status_pause_workflow() -> anyhow::Result<()> {
    let (navigator, _gate) = ScriptedNavigator::gated();
    let app = test_app(navigator).await;

    let request = json!({
        "items": ["kettle", "  ", " toaster "],
        "config": { "engine": "yandex", "delay_ms": 2500 }
    });
    let (status, body) = make_request(&app, Method::POST, "/api/v1/queue/start", Some(request.to_string())).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["phase"], "running");

    let (_, body) = make_request(&app, Method::GET, "/api/v1/queue/status", None).await?;
    let data = &body["data"];
    assert_eq!(data["phase"], "running");
    assert_eq!(data["total"], 2);
    assert_eq!(data["original_items"], json!(["kettle", "toaster"]));
    assert_eq!(data["config"]["engine"], "yandex");
    assert_eq!(data["config"]["delay_ms"], 2500);

    let (status, body) = make_request(&app, Method::POST, "/api/v1/queue/pause", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["phase"], "paused");

    let (_, body) = make_request(&app, Method::POST, "/api/v1/queue/resume", None).await?;
    assert_eq!(body["data"]["phase"], "running");

    let (_, body) = make_request(&app, Method::POST, "/api/v1/queue/stop", None).await?;
    assert_eq!(body["data"]["phase"], "stopped");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_commands_on_idle_queue_are_no_ops() -> anyhow::Result<()> {
    let app = test_app(ScriptedNavigator::new()).await;

    let (_, body) = make_request(&app, Method::POST, "/api/v1/queue/pause", None).await?;
    assert_eq!(body["data"]["phase"], "idle");
    let (_, body) = make_request(&app, Method::POST, "/api/v1/queue/resume", None).await?;
    assert_eq!(body["data"]["phase"], "idle");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_malformed_start_body_is_rejected() -> anyhow::Result<()> {
    let app = test_app(ScriptedNavigator::new()).await;

    let (status, body) = make_request(
        &app,
        Method::POST,
        "/api/v1/queue/start",
        Some(r#"{"items": "kettle"}"#.to_string()),
    )
    .await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    assert!(body["data"].is_null());

    let (_, body) = make_request(&app, Method::GET, "/api/v1/queue/status", None).await?;
    assert_eq!(body["data"]["phase"], "idle");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_unknown_route_is_not_found() -> anyhow::Result<()> {
    let app = test_app(ScriptedNavigator::new()).await;

    let request = Request::builder().uri("/api/v1/products").body(Body::empty())?;
    let response = app.oneshot(request).await?;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    Ok(())
}
