use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::config::Config;
use crate::exec;
use crate::pty::default_shell;
use crate::websocket::BridgeState;

pub type SharedConfig = Arc<Config>;

/// State for the plain HTTP routes.
#[derive(Clone)]
pub struct AppContext {
    pub config: SharedConfig,
    pub bridge: BridgeState,
}

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    #[serde(default)]
    pub command: Option<String>,
}

#[derive(Debug, Serialize)]
struct ExecuteErrorBody {
    success: bool,
    error: &'static str,
}

pub async fn health_check(State(context): State<AppContext>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "atelier-term",
        "terminal_connections": context.bridge.connection_count(),
    }))
}

/// One-shot command execution: run a single command line to completion and
/// return its captured output.
pub async fn execute_command(
    State(context): State<AppContext>,
    Json(request): Json<ExecuteRequest>,
) -> Response {
    let command = request
        .command
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());
    let Some(command) = command else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ExecuteErrorBody {
                success: false,
                error: "missing command",
            }),
        )
            .into_response();
    };

    let shell = default_shell(context.config.shell.as_deref());
    let limit = Duration::from_secs(context.config.exec_timeout_seconds);
    let outcome = exec::run_command(&shell, command, limit).await;

    if outcome.success {
        (StatusCode::OK, Json(outcome)).into_response()
    } else {
        warn!("one-shot command failed: {:?}", outcome.error);
        (StatusCode::INTERNAL_SERVER_ERROR, Json(outcome)).into_response()
    }
}
