use axum::{
    extract::{
        ws::{Message, WebSocket},
        ConnectInfo, State, WebSocketUpgrade,
    },
    response::Response,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::protocol::{SandboxReply, SandboxRequest, TerminalClientMessage, TerminalServerMessage};
use crate::pty::{default_shell, ProcessEvent};
use crate::sandbox;
use crate::session::TerminalSession;

/// One tracked terminal connection.
#[derive(Debug, Clone)]
struct ConnectionInfo {
    remote_addr: SocketAddr,
    connected_at: DateTime<Utc>,
}

/// Global state for the terminal bridge: the sole connection-tracking
/// authority.
#[derive(Clone)]
pub struct BridgeState {
    connections: Arc<DashMap<Uuid, ConnectionInfo>>,
    config: Arc<Config>,
    project_root: PathBuf,
}

impl BridgeState {
    pub fn new(config: Arc<Config>, project_root: PathBuf) -> Self {
        Self {
            connections: Arc::new(DashMap::new()),
            config,
            project_root,
        }
    }

    fn register(&self, id: Uuid, remote_addr: SocketAddr) {
        self.connections.insert(
            id,
            ConnectionInfo {
                remote_addr,
                connected_at: Utc::now(),
            },
        );
    }

    fn remove(&self, id: Uuid) {
        if let Some((_, info)) = self.connections.remove(&id) {
            let lifetime = Utc::now() - info.connected_at;
            debug!(
                "terminal connection {} from {} closed after {}s",
                id,
                info.remote_addr,
                lifetime.num_seconds()
            );
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

/// Terminal WebSocket upgrade handler (`/ws/terminal`).
pub async fn terminal_handler(
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    ws: WebSocketUpgrade,
    State(state): State<BridgeState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_terminal_socket(socket, state, remote_addr))
}

async fn handle_terminal_socket(socket: WebSocket, state: BridgeState, remote_addr: SocketAddr) {
    let connection_id = Uuid::new_v4();
    state.register(connection_id, remote_addr);
    debug!(
        "terminal connected: connection={} remote={}",
        connection_id, remote_addr
    );

    let (mut sender, mut receiver) = socket.split();

    // All writes to the socket funnel through this channel so the shell
    // readers and exit handlers never interleave partial frames.
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<TerminalServerMessage>();
    let writer_id = connection_id;
    let writer_task = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            if let Ok(json) = serde_json::to_string(&message) {
                if sender.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
        }
        debug!("outbound writer ended for connection {}", writer_id);
    });

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ProcessEvent>();
    let mut session = TerminalSession::new(
        out_tx.clone(),
        event_tx,
        default_shell(state.config.shell.as_deref()),
        state.project_root.clone(),
    );

    loop {
        tokio::select! {
            incoming = receiver.next() => {
                let Some(result) = incoming else { break };
                let message = match result {
                    Ok(message) => message,
                    Err(err) => {
                        error!("websocket error on connection {}: {}", connection_id, err);
                        break;
                    }
                };
                match message {
                    Message::Text(text) => match serde_json::from_str::<TerminalClientMessage>(&text) {
                        Ok(client_message) => session.handle_message(client_message),
                        Err(err) => {
                            // Unknown or malformed frames are reported inline
                            // and never tear down the connection.
                            warn!("invalid terminal frame on {}: {}", connection_id, err);
                            let _ = out_tx.send(TerminalServerMessage::Output {
                                content: format!("[invalid message: {}]\r\n", err),
                            });
                        }
                    },
                    Message::Close(_) => {
                        debug!("close frame from connection {}", connection_id);
                        break;
                    }
                    // Ping/Pong are handled by axum; binary frames are not
                    // part of the protocol.
                    _ => {}
                }
            }
            Some(event) = event_rx.recv() => {
                session.handle_event(event);
            }
        }
    }

    session.close();
    state.remove(connection_id);
    drop(session);
    drop(out_tx);
    let _ = writer_task.await;

    debug!("terminal disconnected: connection={}", connection_id);
}

/// State for the sandboxed command channel.
#[derive(Clone)]
pub struct SandboxState {
    project_root: Arc<PathBuf>,
}

impl SandboxState {
    pub fn new(project_root: PathBuf) -> Self {
        Self {
            project_root: Arc::new(project_root),
        }
    }
}

/// Sandboxed command channel upgrade handler (`/ws/commands`).
pub async fn commands_handler(ws: WebSocketUpgrade, State(state): State<SandboxState>) -> Response {
    ws.on_upgrade(move |socket| handle_commands_socket(socket, state))
}

async fn handle_commands_socket(socket: WebSocket, state: SandboxState) {
    let (mut sender, mut receiver) = socket.split();

    while let Some(result) = receiver.next().await {
        let message = match result {
            Ok(message) => message,
            Err(err) => {
                debug!("command channel error: {}", err);
                break;
            }
        };
        match message {
            Message::Text(text) => {
                let reply = match serde_json::from_str::<SandboxRequest>(&text) {
                    Ok(SandboxRequest::ChatCommand(line)) => {
                        match sandbox::run(&state.project_root, &line) {
                            Ok(message) => SandboxReply::CommandSuccess(message),
                            // Errors are explicit replies; the channel stays
                            // open for subsequent commands.
                            Err(err) => SandboxReply::CommandError(err.to_string()),
                        }
                    }
                    Err(err) => SandboxReply::CommandError(format!("invalid frame: {}", err)),
                };
                if let Ok(json) = serde_json::to_string(&reply) {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bridge_state_tracks_connections() {
        let state = BridgeState::new(Arc::new(Config::default()), PathBuf::from("."));
        assert_eq!(state.connection_count(), 0);

        let id = Uuid::new_v4();
        let addr: SocketAddr = "127.0.0.1:4242".parse().unwrap();
        state.register(id, addr);
        assert_eq!(state.connection_count(), 1);

        state.remove(id);
        assert_eq!(state.connection_count(), 0);

        // Removing an unknown id is harmless
        state.remove(Uuid::new_v4());
        assert_eq!(state.connection_count(), 0);
    }
}
