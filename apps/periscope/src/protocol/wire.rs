/// Wire types for the control channel. These shapes are shared with the
/// platform's other clients, so field names and `kind` tags must stay stable.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

/// Commands pushed to the agent side. Fire-and-forget; the backend never
/// replies to a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Command {
    /// Pause agent autonomy; the viewer drives input from here on.
    TakeControl,
    /// Hand input back to the agent.
    CedeControl,
    /// Start capturing DOM/browser events in the remote session.
    BeginExfiltration,
    /// Stop capturing.
    EndExfiltration,
}

/// A captured DOM/browser event relayed from the remote session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExfiltratedEvent {
    pub event_name: String,
    pub params: Map<String, Value>,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,
}

/// Messages the backend sends us over the control channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Message {
    /// The remote session wants our clipboard contents.
    AskForClipboard,
    /// Text copied inside the remote session, to be placed on our clipboard.
    CopiedText { text: String },
    /// One captured event from an active exfiltration.
    ExfiltratedEvent(ExfiltratedEvent),
}

impl Message {
    /// Parse one inbound text frame. Malformed JSON, an unrecognized `kind`,
    /// or missing/mistyped required fields all drop the frame with a warning;
    /// this never returns an error to the caller.
    pub fn parse(raw: &str) -> Option<Message> {
        match serde_json::from_str::<Message>(raw) {
            Ok(message) => Some(message),
            Err(err) => {
                warn!(
                    target: "periscope::protocol",
                    %err,
                    frame = raw,
                    "dropping unrecognized control frame"
                );
                None
            }
        }
    }
}

/// Replies we send in response to a [`Message`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum MessageOut {
    AskForClipboardResponse { text: String },
}
