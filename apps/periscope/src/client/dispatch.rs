use std::sync::Arc;

use tracing::warn;

use crate::channel::ControlChannel;
use crate::client::recorder::ExfiltrationRecorder;
use crate::clipboard::Clipboard;
use crate::notify::{Notice, Notifier, Severity};
use crate::protocol::{Message, MessageOut};

/// Routes inbound control messages to their handlers. The match is
/// exhaustive: a new message kind does not compile until it has an arm here.
pub struct MessageDispatcher {
    clipboard: Arc<dyn Clipboard>,
    notifier: Arc<dyn Notifier>,
    recorder: Arc<ExfiltrationRecorder>,
}

impl MessageDispatcher {
    pub fn new(
        clipboard: Arc<dyn Clipboard>,
        notifier: Arc<dyn Notifier>,
        recorder: Arc<ExfiltrationRecorder>,
    ) -> Self {
        Self {
            clipboard,
            notifier,
            recorder,
        }
    }

    pub fn handle(&self, message: Message, channel: &ControlChannel) {
        match message {
            Message::AskForClipboard => match self.clipboard.read_text() {
                Ok(text) => {
                    channel.send_response(MessageOut::AskForClipboardResponse { text });
                }
                // Read failures are silent to the remote peer.
                Err(err) => {
                    warn!(target: "periscope::client", %err, "clipboard read failed; not replying");
                }
            },
            Message::CopiedText { text } => match self.clipboard.write_text(&text) {
                Ok(()) => self.notifier.notify(Notice::new(
                    "Copied to clipboard",
                    "Text from the remote session is on your clipboard.",
                    Severity::Success,
                )),
                Err(err) => self.notifier.notify(Notice::new(
                    "Clipboard write failed",
                    err.to_string(),
                    Severity::Destructive,
                )),
            },
            Message::ExfiltratedEvent(event) => self.recorder.add(event),
        }
    }
}
