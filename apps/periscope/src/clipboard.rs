use copypasta::{ClipboardContext, ClipboardProvider};
use parking_lot::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClipboardError {
    #[error("clipboard unavailable: {0}")]
    Unavailable(String),
    #[error("clipboard empty")]
    Empty,
}

/// Local clipboard access, injected so headless hosts and tests can swap in
/// an in-memory implementation.
pub trait Clipboard: Send + Sync {
    fn read_text(&self) -> Result<String, ClipboardError>;
    fn write_text(&self, text: &str) -> Result<(), ClipboardError>;
}

/// OS clipboard. The context is created per call; `copypasta` contexts are
/// not `Send` and must not be held across operations.
pub struct SystemClipboard;

impl Clipboard for SystemClipboard {
    fn read_text(&self) -> Result<String, ClipboardError> {
        let mut ctx =
            ClipboardContext::new().map_err(|err| ClipboardError::Unavailable(err.to_string()))?;
        let contents = ctx
            .get_contents()
            .map_err(|err| ClipboardError::Unavailable(err.to_string()))?;
        if contents.is_empty() {
            return Err(ClipboardError::Empty);
        }
        Ok(contents)
    }

    fn write_text(&self, text: &str) -> Result<(), ClipboardError> {
        let mut ctx =
            ClipboardContext::new().map_err(|err| ClipboardError::Unavailable(err.to_string()))?;
        ctx.set_contents(text.to_string())
            .map_err(|err| ClipboardError::Unavailable(err.to_string()))
    }
}

/// In-memory clipboard for tests and hosts without a windowing system.
#[derive(Default)]
pub struct InMemoryClipboard {
    contents: Mutex<Option<String>>,
}

impl InMemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(text: &str) -> Self {
        Self {
            contents: Mutex::new(Some(text.to_string())),
        }
    }
}

impl Clipboard for InMemoryClipboard {
    fn read_text(&self) -> Result<String, ClipboardError> {
        self.contents.lock().clone().ok_or(ClipboardError::Empty)
    }

    fn write_text(&self, text: &str) -> Result<(), ClipboardError> {
        *self.contents.lock() = Some(text.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_round_trip() {
        let clipboard = InMemoryClipboard::new();
        assert!(matches!(clipboard.read_text(), Err(ClipboardError::Empty)));
        clipboard.write_text("hello").unwrap();
        assert_eq!(clipboard.read_text().unwrap(), "hello");
    }
}
