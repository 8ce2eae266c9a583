use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::header,
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::config::ServeSettings;
use crate::net::error::ApiError;
use crate::net::page::render_index;
use crate::sampler::HuaweiSampler;
use crate::state::SharedState;

#[derive(Serialize, Debug)]
pub struct SpeedResponse {
    pub router: String,
    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub poll_seconds: f64,
    /// Router fields exactly as read, for diagnostics.
    pub raw: Map<String, Value>,
}

pub fn router(state: Arc<SharedState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/speed", get(speed))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(state)
}

async fn index(State(state): State<Arc<SharedState>>) -> Html<String> {
    Html(render_index(&state))
}

async fn speed(State(state): State<Arc<SharedState>>) -> Result<impl IntoResponse, ApiError> {
    let (point, reading) = state.sample().await.map_err(|err| {
        warn!(error = %err, router = %state.router_host, "Sample failed");
        ApiError::from(err)
    })?;
    debug!(download_mbps = point.download_mbps, upload_mbps = point.upload_mbps, "Sampled");
    let body = SpeedResponse {
        router: state.router_host.clone(),
        download_mbps: point.download_mbps,
        upload_mbps: point.upload_mbps,
        poll_seconds: state.cadence.poll_seconds,
        raw: reading.fields,
    };
    Ok(([(header::CACHE_CONTROL, "no-store")], Json(body)))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(?e, "Ctrl-C handler unavailable; stop the process to exit");
        std::future::pending::<()>().await;
    }
}

pub async fn run_serve(settings: ServeSettings) -> Result<()> {
    let sampler = HuaweiSampler::new(settings.sampler.clone()).context("Building router client")?;
    let state = Arc::new(SharedState::new(settings.router_host(), settings.cadence, Arc::new(sampler)));

    let listener = TcpListener::bind(settings.bind)
        .await
        .with_context(|| format!("Binding HTTP listener at {}", settings.bind))?;
    info!(
        bind = %settings.bind,
        router = %state.router_host,
        poll_seconds = settings.cadence.poll_seconds,
        authenticated = settings.sampler.password.as_deref().is_some_and(|p| !p.is_empty()),
        "Starting fwamon"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Serving HTTP")?;
    info!("Shutting down");
    Ok(())
}
