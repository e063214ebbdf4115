//! Health check endpoint handler.
//!
//! This module provides the `/health` endpoint handler that returns
//! collection statistics and the outcome of the last cycle.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use tracing::{debug, instrument};

use crate::state::SharedState;

/// Footer text for human-readable HTTP endpoints.
pub const FOOTER_TEXT: &str = "Project: https://github.com/herakles-io/herakles-jvm-gc-exporter — More info: https://www.herakles.io — Support: jvm-gc@herakles.io";

/// Handler for the /health endpoint.
#[instrument(skip(state))]
pub async fn health_handler(State(state): State<SharedState>) -> impl IntoResponse {
    debug!("Processing /health request");

    state.health_stats.record_http_request();

    // 503 until the first cycle completes and after an aborted one
    let (status, message) = match state.health_stats.last_cycle() {
        Some(last) if last.success => (StatusCode::OK, "OK".to_string()),
        Some(last) => (
            StatusCode::SERVICE_UNAVAILABLE,
            format!(
                "Last collection cycle failed: {}",
                last.error.as_deref().unwrap_or("unknown error")
            ),
        ),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "No collection cycle completed yet".to_string(),
        ),
    };

    let table = state.health_stats.render_table();

    debug!("Health check: {} - {}", status, message);
    (
        status,
        [("Content-Type", "text/plain; charset=utf-8")],
        format!("{message}\n\n{table}\n{FOOTER_TEXT}"),
    )
}
