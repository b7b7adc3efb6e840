use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Readiness is a pure conjunction: every input must hold, and losing any
/// one of them drops readiness on the same evaluation.
pub fn is_ready(stream_connected: bool, canvas_ready: bool, session_exists: bool) -> bool {
    stream_connected && canvas_ready && session_exists
}

/// Folds the three readiness inputs into a single output watch with no
/// hysteresis in either direction.
pub struct ReadinessGate {
    task: JoinHandle<()>,
}

impl ReadinessGate {
    pub fn spawn(
        mut stream_connected: watch::Receiver<bool>,
        mut canvas_ready: watch::Receiver<bool>,
        mut session_exists: watch::Receiver<bool>,
    ) -> (Self, watch::Receiver<bool>) {
        let initial = is_ready(
            *stream_connected.borrow(),
            *canvas_ready.borrow(),
            *session_exists.borrow(),
        );
        let (ready_tx, ready_rx) = watch::channel(initial);
        let task = tokio::spawn(async move {
            loop {
                let changed = tokio::select! {
                    r = stream_connected.changed() => r,
                    r = canvas_ready.changed() => r,
                    r = session_exists.changed() => r,
                };
                if changed.is_err() {
                    break;
                }
                let ready = is_ready(
                    *stream_connected.borrow_and_update(),
                    *canvas_ready.borrow_and_update(),
                    *session_exists.borrow_and_update(),
                );
                if ready_tx.send(ready).is_err() {
                    break;
                }
            }
        });
        (Self { task }, ready_rx)
    }

    pub fn abort(&self) {
        self.task.abort();
    }
}

impl Drop for ReadinessGate {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readiness_is_a_pure_and() {
        for a in [false, true] {
            for b in [false, true] {
                for c in [false, true] {
                    assert_eq!(is_ready(a, b, c), a && b && c);
                }
            }
        }
    }

    #[test_timeout::tokio_timeout_test]
    async fn gate_rises_when_all_inputs_hold() {
        let (a_tx, a_rx) = watch::channel(false);
        let (b_tx, b_rx) = watch::channel(false);
        let (c_tx, c_rx) = watch::channel(true);
        let (_gate, mut ready) = ReadinessGate::spawn(a_rx, b_rx, c_rx);
        assert!(!*ready.borrow());

        a_tx.send(true).unwrap();
        b_tx.send(true).unwrap();
        while !*ready.borrow_and_update() {
            ready.changed().await.unwrap();
        }
        assert!(*ready.borrow());
        drop(c_tx);
    }

    #[test_timeout::tokio_timeout_test]
    async fn any_input_dropping_kills_readiness() {
        let (a_tx, a_rx) = watch::channel(true);
        let (_b_tx, b_rx) = watch::channel(true);
        let (_c_tx, c_rx) = watch::channel(true);
        let (_gate, mut ready) = ReadinessGate::spawn(a_rx, b_rx, c_rx);
        assert!(*ready.borrow());

        a_tx.send(false).unwrap();
        while *ready.borrow_and_update() {
            ready.changed().await.unwrap();
        }
        assert!(!*ready.borrow());
    }
}
