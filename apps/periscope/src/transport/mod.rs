//! The pixel stream is an opaque remote-framebuffer feed: frames pass through
//! untouched, and the only protocol-level fact this crate cares about is
//! whether a rendering surface has appeared yet.

pub mod mock;
pub mod websocket;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use url::Url;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("pixel transport connect failed: {0}")]
    Connect(String),
}

/// Lifecycle and data events of one pixel-stream connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PixelEvent {
    /// The transport finished its handshake.
    Connected,
    /// One opaque framebuffer frame.
    Frame(Bytes),
    /// The connection ended, cleanly or not.
    Disconnected,
}

/// Dial-out seam for the pixel stream, so orchestration code can run against
/// a scripted transport in tests.
#[async_trait]
pub trait PixelTransport: Send + Sync {
    async fn connect(&self, url: Url) -> Result<PixelConnection, TransportError>;
}

/// A live pixel-stream connection: an ordered event feed plus the pump task
/// that owns the underlying socket.
pub struct PixelConnection {
    events: mpsc::UnboundedReceiver<PixelEvent>,
    task: JoinHandle<()>,
}

impl PixelConnection {
    pub fn from_parts(events: mpsc::UnboundedReceiver<PixelEvent>, task: JoinHandle<()>) -> Self {
        Self { events, task }
    }

    pub async fn next_event(&mut self) -> Option<PixelEvent> {
        self.events.recv().await
    }

    /// Stop the pump. Safe to call more than once.
    pub fn shutdown(&mut self) {
        self.task.abort();
    }
}

impl Drop for PixelConnection {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// One-shot readiness probe for the rendering surface. The channel feeds it
/// every transport event until it reports the surface, then never calls it
/// again for that connection.
pub trait RenderSurfaceDetector: Send {
    fn observe(&mut self, event: &PixelEvent) -> bool;
}

/// Default detector: the surface exists once the first framebuffer frame
/// arrives.
#[derive(Debug, Default)]
pub struct FirstFrameDetector;

impl RenderSurfaceDetector for FirstFrameDetector {
    fn observe(&mut self, event: &PixelEvent) -> bool {
        matches!(event, PixelEvent::Frame(_))
    }
}
