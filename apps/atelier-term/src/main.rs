mod cli;
mod config;
mod exec;
mod handlers;
mod protocol;
mod pty;
mod sandbox;
mod session;
mod websocket;

use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::{
    cli::{Cli, Commands},
    config::Config,
    handlers::{execute_command, health_check, AppContext},
    websocket::{commands_handler, terminal_handler, BridgeState, SandboxState},
};
use clap::Parser;

#[tokio::main]
async fn main() {
    // Initialize tracing with environment-based configuration
    // Default to WARN level if RUST_LOG is not set
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "warn");
    }
    tracing_subscriber::fmt::init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Check if running as debug client
    if let Some(Commands::Debug { url, input, wait }) = cli.command {
        if let Err(e) = cli::run_debug_client(url, input, wait).await {
            error!("Debug client error: {}", e);
            std::process::exit(1);
        }
        return;
    }

    // Otherwise, run as server
    let config = Config::from_env();
    info!("Starting Atelier terminal bridge on port {}", config.port);

    // The project root anchors the sandboxed command channel and is the
    // working directory of every spawned shell.
    let project_root = match config.project_root.canonicalize() {
        Ok(root) => root,
        Err(e) => {
            error!(
                "Invalid project root {}: {}",
                config.project_root.display(),
                e
            );
            std::process::exit(1);
        }
    };
    info!("Project root: {}", project_root.display());
    info!("One-shot exec timeout: {}s", config.exec_timeout_seconds);

    let config = Arc::new(config);
    let bridge_state = BridgeState::new(config.clone(), project_root.clone());
    let sandbox_state = SandboxState::new(project_root);
    let app_context = AppContext {
        config: config.clone(),
        bridge: bridge_state.clone(),
    };

    // Build the Axum router - split by state
    let http_routes = Router::new()
        .route("/health", get(health_check))
        .route("/execute", post(execute_command))
        .with_state(app_context);

    let terminal_routes = Router::new()
        .route("/ws/terminal", get(terminal_handler))
        .with_state(bridge_state);

    let command_routes = Router::new()
        .route("/ws/commands", get(commands_handler))
        .with_state(sandbox_state);

    let app = Router::new()
        .merge(http_routes)
        .merge(terminal_routes)
        .merge(command_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    // Create the listener
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    info!("Atelier terminal bridge listening on {}", addr);

    // Start the server
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Failed to start server");
}
