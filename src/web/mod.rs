use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::config::ServerConfig;
use crate::scheduler::SchedulerHandle;
use crate::utils::error::Result;

pub mod handlers;
pub mod responses;

pub use handlers::{
    health_check, pause_queue, queue_events, queue_status, resume_queue, start_queue, stop_queue,
    StartRequest,
};
pub use responses::*;

#[derive(Clone)]
pub struct AppState {
    pub scheduler: SchedulerHandle,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/queue/start", post(start_queue))
        .route("/queue/pause", post(pause_queue))
        .route("/queue/resume", post(resume_queue))
        .route("/queue/stop", post(stop_queue))
        .route("/queue/status", get(queue_status))
        .route("/queue/events", get(queue_events))
}

pub async fn serve<F>(config: &ServerConfig, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", config.host, config.port)).await?;

    tracing::info!("Server starting on {}:{}", config.host, config.port);

    axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;

    Ok(())
}
