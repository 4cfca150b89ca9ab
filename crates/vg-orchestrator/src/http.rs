//! Ingress HTTP surface
//!
//! Local-only endpoints used by the UI shell: liveness, event injection and
//! the two independent checks that feed sequential completion.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use vg_core::ProviderError;
use vg_protocol::{EventMessage, InjectRequest, ScanState};

use crate::checks::CheckOutcome;
use crate::completion::PendingChecks;
use crate::state::AgentContext;

/// Liveness report
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub scan_state: ScanState,
    pub subscribers: usize,
    pub pending_checks: PendingChecks,
}

/// Build the router
pub fn router(ctx: Arc<AgentContext>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/events", post(inject_event))
        .route("/checks/notifications", post(notification_check))
        .route("/checks/exam-mode", post(exam_mode_check))
        .with_state(ctx)
}

/// Bind the configured HTTP address and serve until shutdown
pub async fn run(ctx: Arc<AgentContext>, shutdown: CancellationToken) -> Result<()> {
    let address = ctx.config.http_address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind HTTP server to {}", address))?;
    serve(listener, ctx, shutdown).await
}

/// Serve on an already bound listener until shutdown
pub async fn serve(
    listener: TcpListener,
    ctx: Arc<AgentContext>,
    shutdown: CancellationToken,
) -> Result<()> {
    let local_addr = listener.local_addr()?;
    tracing::info!("HTTP server listening on {}", local_addr);

    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("HTTP server failed")?;

    tracing::info!("HTTP server on {} stopped", local_addr);
    Ok(())
}

async fn health(State(ctx): State<Arc<AgentContext>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: ctx.uptime().as_secs(),
        scan_state: ctx.orchestrator.get_scan_status().state,
        subscribers: ctx.bus.subscriber_count(),
        pending_checks: ctx.completion.pending(),
    })
}

async fn inject_event(
    State(ctx): State<Arc<AgentContext>>,
    Json(request): Json<InjectRequest>,
) -> Response {
    let name = request.name.trim();
    if name.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Event name must not be empty");
    }

    tracing::debug!("Injected {} {}", request.kind, name);
    let message = ctx.bus.publish(request.kind, name, Some(request.payload));
    (StatusCode::ACCEPTED, Json(EventMessage::clone(&message))).into_response()
}

async fn notification_check(State(ctx): State<Arc<AgentContext>>) -> Response {
    check_response(ctx.checks.run_notification_check().await)
}

async fn exam_mode_check(State(ctx): State<Arc<AgentContext>>) -> Response {
    check_response(ctx.checks.run_exam_mode_check().await)
}

fn check_response(result: std::result::Result<CheckOutcome, ProviderError>) -> Response {
    match result {
        Ok(outcome) => Json(outcome).into_response(),
        Err(e) => {
            tracing::warn!("Check failed: {}", e);
            let status = match e {
                ProviderError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                ProviderError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                ProviderError::Failed { .. } => StatusCode::BAD_GATEWAY,
            };
            error_response(status, &e.to_string())
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
