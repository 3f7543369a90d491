//! Admin HTTP surface: liveness, readiness, and Prometheus exposition.
//! Bound to a private interface; never carries content-serving routes.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;

use super::AppState;

/// `GET /healthz` — always succeeds while the process is alive.
pub async fn healthz(State(state): State<AppState>) -> impl IntoResponse {
    match (state.liveness)() {
        None => (StatusCode::OK, "ok"),
        Some(_) => (StatusCode::SERVICE_UNAVAILABLE, "not alive"),
    }
}

/// `GET /readyz` — delegates to the composed Readiness Gate. Fails with
/// "no active snapshot" before the first load, with the drain reason
/// during shutdown, and succeeds otherwise.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    match (state.readiness)() {
        None => (StatusCode::OK, "ready".to_string()),
        Some(reason) => (StatusCode::SERVICE_UNAVAILABLE, reason),
    }
}

/// `GET /metrics` — Prometheus text exposition of the counters,
/// histogram, and gauges the watcher and HTTP surfaces publish into.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            body,
        ),
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; version=0.0.4")],
            String::new(),
        ),
    }
}
