use std::path::PathBuf;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::protocol::{TerminalClientMessage, TerminalServerMessage};
use crate::pty::{ProcessEvent, ShellProcess};

/// Per-connection terminal state. A session owns at most one live shell;
/// after the shell exits the session stays usable and the next input
/// triggers a respawn instead of an error.
pub struct TerminalSession {
    outbound: UnboundedSender<TerminalServerMessage>,
    events: UnboundedSender<ProcessEvent>,
    shell: Option<ShellProcess>,
    shell_path: String,
    working_dir: PathBuf,
    cols: u16,
    rows: u16,
}

impl TerminalSession {
    pub fn new(
        outbound: UnboundedSender<TerminalServerMessage>,
        events: UnboundedSender<ProcessEvent>,
        shell_path: String,
        working_dir: PathBuf,
    ) -> Self {
        Self {
            outbound,
            events,
            shell: None,
            shell_path,
            working_dir,
            cols: 80,
            rows: 24,
        }
    }

    pub fn handle_message(&mut self, message: TerminalClientMessage) {
        match message {
            TerminalClientMessage::Init => self.handle_init(),
            TerminalClientMessage::Input { content } => self.handle_input(&content),
            TerminalClientMessage::Resize { dimensions } => {
                self.handle_resize(dimensions.cols, dimensions.rows)
            }
        }
    }

    fn handle_init(&mut self) {
        if self.has_live_shell() {
            // Redundant init is a no-op; one shell per session
            return;
        }
        self.spawn_shell();
    }

    fn handle_input(&mut self, content: &str) {
        let needs_respawn = match &self.shell {
            Some(shell) => shell.write(content.as_bytes()).is_err(),
            None => true,
        };
        if needs_respawn {
            // The triggering input is dropped; the next one lands in the
            // fresh shell.
            self.send_output("\r\n[terminal unavailable, reconnecting...]\r\n");
            self.spawn_shell();
        }
    }

    fn handle_resize(&mut self, cols: u16, rows: u16) {
        self.cols = cols;
        self.rows = rows;
        if let Some(shell) = &self.shell {
            shell.resize(cols, rows);
        }
    }

    fn spawn_shell(&mut self) {
        match ShellProcess::spawn(
            &self.shell_path,
            &self.working_dir,
            self.cols,
            self.rows,
            self.events.clone(),
        ) {
            Ok(shell) => {
                debug!(
                    "spawned shell {} (pid {:?}) in {}",
                    self.shell_path,
                    shell.process_id(),
                    self.working_dir.display()
                );
                self.shell = Some(shell);
                self.send_output(format!(
                    "Connected to {} shell ({})\r\n",
                    std::env::consts::OS,
                    self.shell_path
                ));
            }
            Err(err) => {
                // Spawn failures are reported inline so the client terminal
                // can display them; they never tear down the connection.
                warn!("failed to spawn shell {}: {}", self.shell_path, err);
                self.shell = None;
                self.send_output(format!("Failed to start shell: {}\r\n", err));
            }
        }
    }

    /// Consume a process event from the supervisor channel.
    pub fn handle_event(&mut self, event: ProcessEvent) {
        match event {
            ProcessEvent::Output(bytes) => {
                self.send_output(String::from_utf8_lossy(&bytes).into_owned());
            }
            ProcessEvent::Exited { pid, code } => {
                // Only clear the slot if the event belongs to the shell we
                // currently own; a respawn may already have replaced it.
                if self.shell.as_ref().map(|s| s.process_id()) == Some(pid) {
                    self.shell = None;
                }
                let code_text = code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                self.send_output(format!("\r\n[process exited with code {}]\r\n", code_text));
            }
            ProcessEvent::Errored { pid, message } => {
                if self.shell.as_ref().map(|s| s.process_id()) == Some(pid) {
                    self.shell = None;
                }
                self.send_output(format!("\r\n[shell error: {}]\r\n", message));
            }
        }
    }

    /// Connection closed: kill the owned shell, ignoring kill errors.
    pub fn close(&mut self) {
        if let Some(shell) = self.shell.take() {
            shell.kill();
        }
    }

    pub fn has_live_shell(&self) -> bool {
        self.shell.as_ref().map(|s| s.is_alive()).unwrap_or(false)
    }

    pub fn shell_pid(&self) -> Option<u32> {
        self.shell.as_ref().and_then(|s| s.process_id())
    }

    fn send_output(&self, content: impl Into<String>) {
        // Connection gone means the output is dropped; terminal output is a
        // live stream, not a durable log.
        let _ = self.outbound.send(TerminalServerMessage::Output {
            content: content.into(),
        });
    }
}
