use anyhow::Result;
use clap::{Parser, Subcommand};
use futures_util::{SinkExt, StreamExt};
use std::io::Write;
use tokio::time::{timeout, Duration, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::debug;

use crate::protocol::{TerminalClientMessage, TerminalServerMessage};

#[derive(Parser, Debug)]
#[command(name = "atelier-term")]
#[command(about = "Atelier terminal bridge server and debug client")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Run as server (default behavior if no command specified)
    #[arg(long)]
    pub server: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect to a running bridge and drive a terminal session
    Debug {
        /// Bridge URL (e.g. ws://localhost:3001)
        #[arg(short, long, default_value = "ws://localhost:3001")]
        url: String,

        /// Input line to send once the shell is up (a newline is appended)
        #[arg(short, long)]
        input: Option<String>,

        /// Seconds to keep streaming output before disconnecting
        #[arg(short, long, default_value_t = 3)]
        wait: u64,
    },
}

pub async fn run_debug_client(url: String, input: Option<String>, wait: u64) -> Result<()> {
    let ws_url = format!("{}/ws/terminal", url.trim_end_matches('/'));
    debug!("connecting to {}", ws_url);

    let (ws_stream, _) = match timeout(Duration::from_secs(5), connect_async(&ws_url)).await {
        Ok(Ok(result)) => result,
        Ok(Err(err)) => {
            return Err(anyhow::anyhow!("connection failed: {}", err));
        }
        Err(_) => {
            return Err(anyhow::anyhow!(
                "connection timeout - is the bridge running?"
            ));
        }
    };
    let (mut write, mut read) = ws_stream.split();

    let init_text = serde_json::to_string(&TerminalClientMessage::Init)?;
    write.send(Message::Text(init_text.into())).await?;

    if let Some(line) = input {
        let input_text = serde_json::to_string(&TerminalClientMessage::Input {
            content: format!("{}\n", line),
        })?;
        write.send(Message::Text(input_text.into())).await?;
    }

    // Stream output until the bridge goes quiet for the requested window
    let deadline = Instant::now() + Duration::from_secs(wait);
    loop {
        let frame = match tokio::time::timeout_at(deadline, read.next()).await {
            Ok(Some(Ok(frame))) => frame,
            Ok(Some(Err(err))) => return Err(err.into()),
            Ok(None) => break,
            Err(_) => break,
        };
        if let Message::Text(text) = frame {
            match serde_json::from_str::<TerminalServerMessage>(&text) {
                Ok(TerminalServerMessage::Output { content }) => {
                    print!("{}", content);
                    std::io::stdout().flush()?;
                }
                Err(err) => debug!("unrecognized frame: {}", err),
            }
        }
    }

    write.send(Message::Close(None)).await?;
    Ok(())
}
