//! Scripted pixel transport for tests.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use url::Url;

use super::{PixelConnection, PixelEvent, PixelTransport, TransportError};

/// Hands out one event feed per `connect` call; tests drive connections by
/// pushing [`PixelEvent`]s through the latest feed.
#[derive(Clone, Default)]
pub struct MockPixelTransport {
    feeds: Arc<Mutex<Vec<mpsc::UnboundedSender<PixelEvent>>>>,
    dialed: Arc<Mutex<Vec<Url>>>,
    refuse: Arc<Mutex<bool>>,
}

impl MockPixelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sender for the most recent connection, if any.
    pub fn feed(&self) -> Option<mpsc::UnboundedSender<PixelEvent>> {
        self.feeds.lock().last().cloned()
    }

    pub fn connection_count(&self) -> usize {
        self.feeds.lock().len()
    }

    pub fn dialed_urls(&self) -> Vec<Url> {
        self.dialed.lock().clone()
    }

    /// Make subsequent `connect` calls fail, simulating an unreachable host.
    pub fn set_refuse(&self, refuse: bool) {
        *self.refuse.lock() = refuse;
    }
}

#[async_trait]
impl PixelTransport for MockPixelTransport {
    async fn connect(&self, url: Url) -> Result<PixelConnection, TransportError> {
        self.dialed.lock().push(url);
        if *self.refuse.lock() {
            return Err(TransportError::Connect("scripted refusal".into()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.feeds.lock().push(tx);
        let task = tokio::spawn(std::future::pending::<()>());
        Ok(PixelConnection::from_parts(rx, task))
    }
}
