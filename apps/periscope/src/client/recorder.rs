use bytes::Bytes;
use parking_lot::Mutex;
use tracing::warn;

use crate::protocol::ExfiltratedEvent;

/// Pending events are compacted into an opaque serialized chunk once this
/// many accumulate.
const CHUNK_THRESHOLD: usize = 64;

/// Buffers exfiltrated events while a recording is active. Lifecycle is
/// independent of the streaming channels: nothing here resets on reconnect,
/// only [`reset`] (called on disposal) clears the buffers.
///
/// `add` is intentionally not gated on `is_recording`: events already in
/// flight when a stop command goes out still land in the buffer, so the
/// recording contains everything the remote side captured.
///
/// [`reset`]: ExfiltrationRecorder::reset
#[derive(Default)]
pub struct ExfiltrationRecorder {
    state: Mutex<RecorderState>,
}

#[derive(Default)]
struct RecorderState {
    is_recording: bool,
    pending: Vec<ExfiltratedEvent>,
    chunks: Vec<Bytes>,
}

impl ExfiltrationRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self) {
        self.state.lock().is_recording = true;
    }

    pub fn stop(&self) {
        self.state.lock().is_recording = false;
    }

    pub fn is_recording(&self) -> bool {
        self.state.lock().is_recording
    }

    pub fn add(&self, event: ExfiltratedEvent) {
        let mut state = self.state.lock();
        state.pending.push(event);
        if state.pending.len() >= CHUNK_THRESHOLD {
            compact(&mut state);
        }
    }

    pub fn pending_events(&self) -> Vec<ExfiltratedEvent> {
        self.state.lock().pending.clone()
    }

    pub fn compressed_chunks(&self) -> Vec<Bytes> {
        self.state.lock().chunks.clone()
    }

    /// Take the recording out of the recorder: all compacted chunks plus the
    /// uncompacted tail, leaving the buffers empty.
    pub fn export(&self) -> (Vec<Bytes>, Vec<ExfiltratedEvent>) {
        let mut state = self.state.lock();
        (
            std::mem::take(&mut state.chunks),
            std::mem::take(&mut state.pending),
        )
    }

    /// Drop everything, including the recording flag. Must run on disposal
    /// so buffered events cannot leak into a later session.
    pub fn reset(&self) {
        *self.state.lock() = RecorderState::default();
    }
}

fn compact(state: &mut RecorderState) {
    match serde_json::to_vec(&state.pending) {
        Ok(serialized) => {
            state.chunks.push(Bytes::from(serialized));
            state.pending.clear();
        }
        Err(err) => {
            warn!(target: "periscope::recorder", %err, "failed to compact pending events");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn event(name: &str) -> ExfiltratedEvent {
        ExfiltratedEvent {
            event_name: name.to_string(),
            params: Map::new(),
            source: "page".into(),
            timestamp: None,
        }
    }

    #[test]
    fn records_events_and_reports_them() {
        let recorder = ExfiltrationRecorder::new();
        recorder.start();
        assert!(recorder.is_recording());
        recorder.add(event("click"));
        recorder.add(event("input"));
        let pending = recorder.pending_events();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].event_name, "click");
    }

    #[test]
    fn events_arriving_after_stop_are_kept() {
        let recorder = ExfiltrationRecorder::new();
        recorder.start();
        recorder.add(event("click"));
        recorder.stop();
        recorder.add(event("late"));
        assert_eq!(recorder.pending_events().len(), 2);
    }

    #[test]
    fn pending_events_compact_into_chunks() {
        let recorder = ExfiltrationRecorder::new();
        recorder.start();
        for i in 0..CHUNK_THRESHOLD {
            recorder.add(event(&format!("e{i}")));
        }
        assert_eq!(recorder.pending_events().len(), 0);
        let chunks = recorder.compressed_chunks();
        assert_eq!(chunks.len(), 1);
        let decoded: Vec<ExfiltratedEvent> = serde_json::from_slice(&chunks[0]).unwrap();
        assert_eq!(decoded.len(), CHUNK_THRESHOLD);
    }

    #[test]
    fn export_drains_everything() {
        let recorder = ExfiltrationRecorder::new();
        recorder.start();
        for i in 0..CHUNK_THRESHOLD + 1 {
            recorder.add(event(&format!("e{i}")));
        }
        let (chunks, tail) = recorder.export();
        assert_eq!(chunks.len(), 1);
        assert_eq!(tail.len(), 1);
        assert!(recorder.pending_events().is_empty());
        assert!(recorder.compressed_chunks().is_empty());
    }

    #[test]
    fn reset_clears_buffers_and_flag() {
        let recorder = ExfiltrationRecorder::new();
        recorder.start();
        recorder.add(event("click"));
        recorder.reset();
        assert!(!recorder.is_recording());
        assert!(recorder.pending_events().is_empty());
        assert!(recorder.compressed_chunks().is_empty());
    }
}
