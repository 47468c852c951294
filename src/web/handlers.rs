use axum::{
    extract::{rejection::JsonRejection, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        Json,
    },
};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;

use super::{ApiError, ApiResponse, AppState, CommandAck, HealthResponse};
use crate::models::{RunOptions, StatusSnapshot};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartRequest {
    pub items: Vec<String>,
    #[serde(default)]
    pub config: RunOptions,
}

pub async fn health_check(State(state): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    Json(ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        phase: state.scheduler.status().phase,
    }))
}

pub async fn start_queue(
    State(state): State<AppState>,
    payload: Result<Json<StartRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<CommandAck>>, ApiError> {
    let Json(request) = payload.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;

    let items: Vec<String> = request
        .items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect();

    tracing::info!("Start requested with {} items", items.len());
    let phase = state.scheduler.start(items, request.config).await?;
    Ok(Json(ApiResponse::success(CommandAck { phase })))
}

pub async fn pause_queue(State(state): State<AppState>) -> Result<Json<ApiResponse<CommandAck>>, ApiError> {
    let phase = state.scheduler.pause().await?;
    Ok(Json(ApiResponse::success(CommandAck { phase })))
}

pub async fn resume_queue(State(state): State<AppState>) -> Result<Json<ApiResponse<CommandAck>>, ApiError> {
    let phase = state.scheduler.resume().await?;
    Ok(Json(ApiResponse::success(CommandAck { phase })))
}

pub async fn stop_queue(State(state): State<AppState>) -> Result<Json<ApiResponse<CommandAck>>, ApiError> {
    let phase = state.scheduler.stop().await?;
    Ok(Json(ApiResponse::success(CommandAck { phase })))
}

pub async fn queue_status(State(state): State<AppState>) -> Json<ApiResponse<StatusSnapshot>> {
    Json(ApiResponse::success(state.scheduler.status()))
}

/// Streams queue events as server-sent events named after the event type.
pub async fn queue_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let receiver = state.scheduler.subscribe();

    let events = stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    let sse = Event::default().event(event.event_name()).json_data(&event);
                    return Some((sse, receiver));
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event stream lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}
