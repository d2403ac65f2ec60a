use portable_pty::{native_pty_system, Child, CommandBuilder, MasterPty, PtySize};
use std::io::{Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

/// Structured lifecycle events pushed by the supervisor reader onto a single
/// ordered channel consumed by the owning session.
#[derive(Debug)]
pub enum ProcessEvent {
    /// Raw bytes from the PTY master (stdout and stderr are unified by the PTY)
    Output(Vec<u8>),
    Exited { pid: Option<u32>, code: Option<u32> },
    Errored { pid: Option<u32>, message: String },
}

#[derive(Debug, Error)]
pub enum PtyError {
    #[error("shell process is not available")]
    Unavailable,
    #[error("pty backend error: {0}")]
    Backend(String),
    #[error("pty i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Resolve the shell binary for spawned terminals: explicit override first,
/// then the platform default.
pub fn default_shell(configured: Option<&str>) -> String {
    if let Some(shell) = configured {
        return shell.to_string();
    }
    if cfg!(windows) {
        "cmd.exe".to_string()
    } else {
        "/bin/bash".to_string()
    }
}

/// One spawned interactive shell in a PTY, exclusively owned by a session.
pub struct ShellProcess {
    master: Arc<Mutex<Option<Box<dyn MasterPty + Send>>>>,
    writer: Arc<Mutex<Option<Box<dyn Write + Send>>>>,
    child: Arc<Mutex<Option<Box<dyn Child + Send + Sync>>>>,
    alive: Arc<AtomicBool>,
    pid: Option<u32>,
}

impl ShellProcess {
    /// Spawn `shell` interactively (no subcommand) in `working_dir` with the
    /// inherited environment. Output and exit are delivered on `events`.
    pub fn spawn(
        shell: &str,
        working_dir: &Path,
        cols: u16,
        rows: u16,
        events: UnboundedSender<ProcessEvent>,
    ) -> Result<Self, PtyError> {
        let pty_system = native_pty_system();
        let pty_pair = pty_system
            .openpty(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| PtyError::Backend(e.to_string()))?;

        let mut cmd = CommandBuilder::new(shell);
        cmd.cwd(working_dir);
        cmd.env("TERM", "xterm-256color");

        let child = pty_pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| PtyError::Backend(e.to_string()))?;
        let pid = child.process_id();

        // Drop the slave side: keeping it open in the parent would stop the
        // master reader from ever observing the child's exit.
        let master = pty_pair.master;
        drop(pty_pair.slave);

        let mut reader = master
            .try_clone_reader()
            .map_err(|e| PtyError::Backend(e.to_string()))?;
        let writer = master
            .take_writer()
            .map_err(|e| PtyError::Backend(e.to_string()))?;

        let alive = Arc::new(AtomicBool::new(true));
        let child: Arc<Mutex<Option<Box<dyn Child + Send + Sync>>>> =
            Arc::new(Mutex::new(Some(child)));

        // Supervisor: read the master until EOF, then reap the child for its
        // exit code. A read error after kill() is the normal shutdown path.
        let reader_alive = alive.clone();
        let reader_child = child.clone();
        tokio::task::spawn_blocking(move || {
            let mut buffer = [0u8; 4096];
            loop {
                match reader.read(&mut buffer) {
                    Ok(0) => break,
                    Ok(n) => {
                        if events.send(ProcessEvent::Output(buffer[..n].to_vec())).is_err() {
                            // Session is gone; stop reading, the child gets
                            // killed by the session teardown.
                            break;
                        }
                    }
                    Err(err) => {
                        debug!("pty read ended: {}", err);
                        break;
                    }
                }
            }

            reader_alive.store(false, Ordering::SeqCst);

            let wait_result = reader_child
                .lock()
                .unwrap()
                .as_mut()
                .map(|child| child.wait());
            let event = match wait_result {
                Some(Ok(status)) => ProcessEvent::Exited {
                    pid,
                    code: Some(status.exit_code()),
                },
                Some(Err(err)) => ProcessEvent::Errored {
                    pid,
                    message: err.to_string(),
                },
                // Child already reaped by kill()
                None => ProcessEvent::Exited { pid, code: None },
            };
            let _ = events.send(event);
        });

        Ok(Self {
            master: Arc::new(Mutex::new(Some(master))),
            writer: Arc::new(Mutex::new(Some(writer))),
            child,
            alive,
            pid,
        })
    }

    /// Forward raw bytes to the shell's stdin. Fails with `Unavailable` when
    /// the process has exited; callers treat that as "needs respawn".
    pub fn write(&self, data: &[u8]) -> Result<(), PtyError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(PtyError::Unavailable);
        }
        let mut guard = self.writer.lock().unwrap();
        match guard.as_mut() {
            Some(writer) => {
                writer.write_all(data)?;
                writer.flush()?;
                Ok(())
            }
            None => Err(PtyError::Unavailable),
        }
    }

    /// Best-effort PTY resize; never raises.
    pub fn resize(&self, cols: u16, rows: u16) {
        let guard = self.master.lock().unwrap();
        if let Some(master) = guard.as_ref() {
            if let Err(err) = master.resize(PtySize {
                rows,
                cols,
                pixel_width: 0,
                pixel_height: 0,
            }) {
                debug!("pty resize ignored: {}", err);
            }
        }
    }

    /// Terminate the process. Idempotent, safe on an already-exited shell.
    pub fn kill(&self) {
        if let Some(mut child) = self.child.lock().unwrap().take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        *self.master.lock().unwrap() = None;
        *self.writer.lock().unwrap() = None;
        self.alive.store(false, Ordering::SeqCst);
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn process_id(&self) -> Option<u32> {
        self.pid
    }
}

impl Drop for ShellProcess {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    async fn collect_output_until(
        rx: &mut mpsc::UnboundedReceiver<ProcessEvent>,
        needle: &str,
    ) -> String {
        let mut collected = String::new();
        loop {
            let event = timeout(Duration::from_secs(10), rx.recv())
                .await
                .expect("timed out waiting for pty output")
                .expect("event channel closed");
            if let ProcessEvent::Output(bytes) = event {
                collected.push_str(&String::from_utf8_lossy(&bytes));
                if collected.contains(needle) {
                    return collected;
                }
            }
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn spawned_shell_echoes_output() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let shell = ShellProcess::spawn(
            &default_shell(None),
            Path::new("."),
            80,
            24,
            tx,
        )
        .expect("failed to spawn shell");

        shell.write(b"printf 'marker-%s' 'ok'\n").unwrap();
        let output = collect_output_until(&mut rx, "marker-ok").await;
        assert!(output.contains("marker-ok"));

        shell.kill();
        // Idempotent
        shell.kill();
        assert!(!shell.is_alive());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn exit_is_reported_and_write_becomes_unavailable() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let shell = ShellProcess::spawn(
            &default_shell(None),
            Path::new("."),
            80,
            24,
            tx,
        )
        .expect("failed to spawn shell");
        let pid = shell.process_id();

        shell.write(b"exit 3\n").unwrap();

        let code = loop {
            let event = timeout(Duration::from_secs(10), rx.recv())
                .await
                .expect("timed out waiting for exit")
                .expect("event channel closed");
            match event {
                ProcessEvent::Exited { pid: exited_pid, code } => {
                    assert_eq!(exited_pid, pid);
                    break code;
                }
                _ => continue,
            }
        };
        assert_eq!(code, Some(3));

        assert!(!shell.is_alive());
        assert!(matches!(
            shell.write(b"echo too late\n"),
            Err(PtyError::Unavailable)
        ));
    }

    #[test]
    fn default_shell_prefers_override() {
        assert_eq!(default_shell(Some("/bin/sh")), "/bin/sh");
        if cfg!(windows) {
            assert_eq!(default_shell(None), "cmd.exe");
        } else {
            assert_eq!(default_shell(None), "/bin/bash");
        }
    }
}
