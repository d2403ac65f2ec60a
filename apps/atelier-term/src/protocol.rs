use serde::{Deserialize, Serialize};

/// Messages sent from the browser terminal to the bridge
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum TerminalClientMessage {
    /// Request a shell for this connection (idempotent)
    #[serde(rename = "terminal:init")]
    Init,
    /// Raw text to forward to the shell's stdin
    #[serde(rename = "terminal:input")]
    Input { content: String },
    /// Viewport dimensions changed on the client side
    #[serde(rename = "terminal:resize")]
    Resize { dimensions: Dimensions },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Dimensions {
    pub cols: u16,
    pub rows: u16,
}

/// Messages sent from the bridge to the browser terminal
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum TerminalServerMessage {
    /// Raw shell output (stdout and stderr are not distinguished)
    #[serde(rename = "terminal:output")]
    Output { content: String },
}

/// Requests on the sandboxed command channel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum SandboxRequest {
    /// A single `<verb> <path>` command line
    ChatCommand(String),
}

/// Replies on the sandboxed command channel, both human-readable text
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum SandboxReply {
    CommandSuccess(String),
    CommandError(String),
}
