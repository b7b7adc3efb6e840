use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::warn;
use url::Url;

use crate::transport::{PixelEvent, PixelTransport, RenderSurfaceDetector, TransportError};

/// Connection phase of the pixel stream. `is_connected` reports true from
/// `Connecting` onward: the channel claims the connection as soon as the dial
/// is issued and corrects itself if the transport never confirms, so
/// readiness does not flicker during the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Connecting,
    Connected,
}

/// Owns the pixel-stream transport connection and the render-surface
/// readiness signal derived from it.
pub struct PixelStreamChannel {
    transport: Arc<dyn PixelTransport>,
    inner: Arc<PixelInner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

struct PixelInner {
    phase: Mutex<Phase>,
    generation: AtomicU64,
    connected: watch::Sender<bool>,
    canvas_ready: watch::Sender<bool>,
    disconnects: watch::Sender<u64>,
}

impl PixelInner {
    fn reset(&self) {
        *self.phase.lock() = Phase::Idle;
        self.connected.send_replace(false);
        self.canvas_ready.send_replace(false);
    }
}

impl PixelStreamChannel {
    pub fn new(transport: Arc<dyn PixelTransport>) -> Self {
        Self {
            transport,
            inner: Arc::new(PixelInner {
                phase: Mutex::new(Phase::Idle),
                generation: AtomicU64::new(0),
                connected: watch::channel(false).0,
                canvas_ready: watch::channel(false).0,
                disconnects: watch::channel(0).0,
            }),
            task: Mutex::new(None),
        }
    }

    /// Dial the pixel stream. A second connect while one is in flight or
    /// live is a no-op. The detector is one-shot per connection: it sees
    /// every transport event until it reports the rendering surface.
    pub async fn connect(
        &self,
        url: Url,
        mut detector: Box<dyn RenderSurfaceDetector>,
    ) -> Result<(), TransportError> {
        let my_gen;
        {
            let mut phase = self.inner.phase.lock();
            if *phase != Phase::Idle {
                warn!(target: "periscope::channel", "pixel stream already active; ignoring connect");
                return Ok(());
            }
            *phase = Phase::Connecting;
            my_gen = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        }
        // Optimistic: report connected before the transport confirms.
        self.inner.connected.send_replace(true);

        let connection = match self.transport.connect(url).await {
            Ok(connection) => connection,
            Err(err) => {
                if self.inner.generation.load(Ordering::SeqCst) == my_gen {
                    self.inner.reset();
                    self.inner.disconnects.send_modify(|n| *n += 1);
                }
                return Err(err);
            }
        };

        // A teardown that raced the dial wins; discard the fresh connection.
        if self.inner.generation.load(Ordering::SeqCst) != my_gen {
            drop(connection);
            return Ok(());
        }

        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            let mut connection = connection;
            let mut armed = true;
            while let Some(event) = connection.next_event().await {
                if inner.generation.load(Ordering::SeqCst) != my_gen {
                    return;
                }
                if armed && detector.observe(&event) {
                    armed = false;
                    inner.canvas_ready.send_replace(true);
                }
                match event {
                    PixelEvent::Connected => {
                        *inner.phase.lock() = Phase::Connected;
                    }
                    PixelEvent::Frame(_) => {}
                    PixelEvent::Disconnected => break,
                }
            }
            if inner.generation.load(Ordering::SeqCst) == my_gen {
                inner.reset();
                inner.disconnects.send_modify(|n| *n += 1);
            }
        });
        *self.task.lock() = Some(handle);
        Ok(())
    }

    /// Single teardown path: stops the detector and pump, releases the
    /// transport connection, and clears `connected` and `canvas_ready`.
    pub fn disconnect(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        self.inner.reset();
    }

    pub fn phase(&self) -> Phase {
        *self.inner.phase.lock()
    }

    pub fn is_connected(&self) -> bool {
        self.phase() != Phase::Idle
    }

    pub fn is_canvas_ready(&self) -> bool {
        *self.inner.canvas_ready.borrow()
    }

    pub fn connected_watch(&self) -> watch::Receiver<bool> {
        self.inner.connected.subscribe()
    }

    pub fn canvas_watch(&self) -> watch::Receiver<bool> {
        self.inner.canvas_ready.subscribe()
    }

    pub fn disconnect_watch(&self) -> watch::Receiver<u64> {
        self.inner.disconnects.subscribe()
    }
}

impl Drop for PixelStreamChannel {
    fn drop(&mut self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}
