use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};
use url::Url;

use crate::protocol::{Command, Message, MessageOut};
use crate::transport::TransportError;

/// Events the control channel reports to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    Connected,
    Inbound(Message),
    /// Emitted exactly once per connection when the socket ends, however it
    /// ends. Owner-initiated teardown does not emit it.
    Disconnected,
}

/// The control WebSocket: outbound commands and clipboard replies, inbound
/// validated [`Message`]s. The channel never reconnects on its own; the
/// disconnect counter is the owner's cue to dial again.
pub struct ControlChannel {
    inner: Arc<ControlInner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

struct ControlInner {
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    connected: watch::Sender<bool>,
    disconnects: watch::Sender<u64>,
}

impl ControlInner {
    fn mark_closed(&self) {
        *self.outbound.lock() = None;
        self.connected.send_replace(false);
        self.disconnects.send_modify(|n| *n += 1);
    }
}

impl ControlChannel {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ControlInner {
                outbound: Mutex::new(None),
                connected: watch::channel(false).0,
                disconnects: watch::channel(0).0,
            }),
            task: Mutex::new(None),
        }
    }

    /// Dial the control socket. A channel that already has a live socket
    /// ignores the call. A failed dial bumps the disconnect counter so the
    /// owner's reconnect logic sees it like any other lost connection.
    pub async fn connect(
        &self,
        url: Url,
        events: mpsc::UnboundedSender<ControlEvent>,
    ) -> Result<(), TransportError> {
        if self.inner.outbound.lock().is_some() {
            warn!(target: "periscope::channel", "control channel already connected; ignoring connect");
            return Ok(());
        }

        let ws_stream = match connect_async(url.as_str()).await {
            Ok((ws_stream, _)) => ws_stream,
            Err(err) => {
                self.inner.disconnects.send_modify(|n| *n += 1);
                return Err(TransportError::Connect(err.to_string()));
            }
        };

        let (tx_out, rx_out) = mpsc::unbounded_channel::<String>();
        *self.inner.outbound.lock() = Some(tx_out);
        self.inner.connected.send_replace(true);
        let _ = events.send(ControlEvent::Connected);

        let inner = self.inner.clone();
        let handle = tokio::spawn(run_socket(inner, ws_stream, rx_out, events));
        *self.task.lock() = Some(handle);
        Ok(())
    }

    /// Fire-and-forget command. Dropped with a warning when the socket is
    /// not open; never queued, never an error.
    pub fn send(&self, command: Command) {
        self.send_frame(&command, "command");
    }

    /// Reply to an inbound message. Same drop semantics as [`send`].
    ///
    /// [`send`]: ControlChannel::send
    pub fn send_response(&self, response: MessageOut) {
        self.send_frame(&response, "response");
    }

    fn send_frame<T: Serialize + std::fmt::Debug>(&self, frame: &T, what: &str) {
        let guard = self.inner.outbound.lock();
        let Some(tx) = guard.as_ref() else {
            warn!(target: "periscope::channel", ?frame, "control channel not open; dropping {what}");
            return;
        };
        match serde_json::to_string(frame) {
            Ok(json) => {
                if tx.send(json).is_err() {
                    warn!(target: "periscope::channel", ?frame, "control socket gone; dropped {what}");
                }
            }
            Err(err) => warn!(target: "periscope::channel", %err, "failed to encode {what}"),
        }
    }

    pub fn is_connected(&self) -> bool {
        *self.inner.connected.borrow()
    }

    pub fn connected_watch(&self) -> watch::Receiver<bool> {
        self.inner.connected.subscribe()
    }

    /// Counts socket losses (including failed dials). Owners watch it to
    /// decide when to reconnect.
    pub fn disconnect_watch(&self) -> watch::Receiver<u64> {
        self.inner.disconnects.subscribe()
    }

    /// Owner-initiated teardown: drops the socket and clears state without
    /// bumping the disconnect counter or emitting an event.
    pub fn disconnect(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        *self.inner.outbound.lock() = None;
        self.inner.connected.send_replace(false);
    }
}

impl Default for ControlChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ControlChannel {
    fn drop(&mut self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

async fn run_socket(
    inner: Arc<ControlInner>,
    ws_stream: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    mut rx_out: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<ControlEvent>,
) {
    let (mut sink, mut stream) = ws_stream.split();
    loop {
        tokio::select! {
            outbound = rx_out.recv() => {
                match outbound {
                    Some(text) => {
                        if sink.send(WsMessage::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            frame = stream.next() => {
                match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        if let Some(message) = Message::parse(&text) {
                            if events.send(ControlEvent::Inbound(message)).is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Err(err)) => {
                        debug!(target: "periscope::channel", %err, "control socket errored");
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }
    inner.mark_closed();
    let _ = events.send(ControlEvent::Disconnected);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_disconnected() {
        let channel = ControlChannel::new();
        assert!(!channel.is_connected());
        assert_eq!(*channel.disconnect_watch().borrow(), 0);
    }

    #[test]
    fn send_without_socket_is_a_quiet_drop() {
        let channel = ControlChannel::new();
        channel.send(Command::TakeControl);
        channel.send_response(MessageOut::AskForClipboardResponse { text: "x".into() });
        assert!(!channel.is_connected());
    }

    #[test_timeout::tokio_timeout_test]
    async fn failed_dial_bumps_disconnect_counter() {
        let channel = ControlChannel::new();
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        // Nothing listens on this port.
        let url = Url::parse("ws://127.0.0.1:9/stream/messages/task/t-1").unwrap();
        let result = channel.connect(url, events_tx).await;
        assert!(result.is_err());
        assert_eq!(*channel.disconnect_watch().borrow(), 1);
        assert!(!channel.is_connected());
        assert!(events_rx.try_recv().is_err());
    }
}
