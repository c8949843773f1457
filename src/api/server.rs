use axum::{
    extract::{rejection::JsonRejection, State},
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::{
    clients::{HttpInstanceDirectory, HttpMetricsBackend},
    config::Config,
    fetcher::MetricFetcher,
    metrics,
    models::{CpuUsageRequest, CpuUsageResponse, HealthResponse},
    pipeline::CpuUsagePipeline,
    resilience::Resilient,
    resolver::InstanceResolver,
    shaper::SeriesShaper,
    MonitorError, Result,
};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<CpuUsagePipeline>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/cpu-usage", post(cpu_usage))
        .route("/health", get(health))
        .route("/metrics", get(prometheus_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn cpu_usage(
    State(state): State<AppState>,
    payload: std::result::Result<Json<CpuUsageRequest>, JsonRejection>,
) -> Result<Json<CpuUsageResponse>> {
    let Json(request) = payload.map_err(|e| MonitorError::InvalidInput(e.body_text()))?;

    let span = info_span!("cpu_usage", request_id = %Uuid::new_v4(), ip = %request.ip_address);
    async move {
        info!(
            "CPU usage requested: period={} interval={}",
            request.time_period, request.interval
        );
        let series = state.pipeline.run(&request).await?;
        Ok::<_, MonitorError>(Json(series.into_response()))
    }
    .instrument(span)
    .await
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn prometheus_metrics() -> Result<impl IntoResponse> {
    let body = metrics::gather_text()?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}

/// Wires the HTTP collaborators into a pipeline. Called once at start-up.
pub fn build_pipeline(config: &Config) -> Result<CpuUsagePipeline> {
    let directory = HttpInstanceDirectory::new(
        &config.directory_url,
        &config.region,
        config.call_policy.timeout,
    )?;
    let backend = HttpMetricsBackend::new(
        &config.metrics_url,
        &config.region,
        config.call_policy.timeout,
    )?;

    Ok(CpuUsagePipeline::new(
        InstanceResolver::new(
            Arc::new(Resilient::new(directory, config.call_policy)),
            config.ambiguity_policy,
        ),
        MetricFetcher::new(Arc::new(Resilient::new(backend, config.call_policy))),
        SeriesShaper::new(config.display_offset),
        config.pipeline,
    ))
}

pub async fn start_server(config: Config) -> Result<()> {
    let state = AppState {
        pipeline: Arc::new(build_pipeline(&config)?),
    };

    let app = router(state);
    let addr = format!("0.0.0.0:{}", config.port);
    info!(
        "Starting CPU usage monitor on {} (directory={}, metrics={})",
        addr, config.directory_url, config.metrics_url
    );

    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        MonitorError::Internal(format!("Failed to bind to address: {}", e))
    })?;

    axum::serve(listener, app)
        .await
        .map_err(|e| MonitorError::Internal(format!("Server error: {}", e)))?;

    Ok(())
}
