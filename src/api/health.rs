/// Health check endpoints for liveness and readiness probes
///
/// - Liveness: the process answers
/// - Readiness: startup finished, not shutting down, and the store answers
/// - Healthz: JSON report for humans and monitoring
use crate::{context::AppContext, health::HealthReport};
use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};

/// Build health check routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/livez", get(liveness_probe))
        .route("/api/readyz", get(readiness_probe))
        .route("/api/healthz", get(health_report))
}

/// Liveness probe
pub async fn liveness_probe() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe - 503 while not ready
pub async fn readiness_probe(State(ctx): State<AppContext>) -> Result<StatusCode, (StatusCode, &'static str)> {
    if !ctx.health.ready().await {
        tracing::warn!("readiness_probe_failed");
        return Err((StatusCode::SERVICE_UNAVAILABLE, "not ready"));
    }
    Ok(StatusCode::OK)
}

/// Overall diagnosis
pub async fn health_report(State(ctx): State<AppContext>) -> (StatusCode, Json<HealthReport>) {
    let report = ctx.health.report().await;
    let status = if report.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}
