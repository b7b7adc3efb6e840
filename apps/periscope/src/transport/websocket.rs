use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::debug;
use url::Url;

use super::{PixelConnection, PixelEvent, PixelTransport, TransportError};

/// WebSocket pixel transport: forwards binary framebuffer frames as-is and
/// maps socket lifecycle onto [`PixelEvent`]s.
pub struct WsPixelTransport;

#[async_trait]
impl PixelTransport for WsPixelTransport {
    async fn connect(&self, url: Url) -> Result<PixelConnection, TransportError> {
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|err| TransportError::Connect(err.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            let mut ws_stream = ws_stream;
            let _ = tx.send(PixelEvent::Connected);
            while let Some(frame) = ws_stream.next().await {
                match frame {
                    Ok(WsMessage::Binary(data)) => {
                        if tx.send(PixelEvent::Frame(Bytes::from(data))).is_err() {
                            break;
                        }
                    }
                    Ok(WsMessage::Close(_)) => break,
                    Err(err) => {
                        debug!(target: "periscope::transport", %err, "pixel stream errored");
                        break;
                    }
                    // Text and ping/pong frames carry no pixels.
                    Ok(_) => {}
                }
            }
            let _ = tx.send(PixelEvent::Disconnected);
        });

        Ok(PixelConnection::from_parts(rx, task))
    }
}
