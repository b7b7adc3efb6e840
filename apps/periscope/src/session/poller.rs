use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::debug;
use url::Url;

use crate::auth::StreamAuth;
use crate::session::backend::SessionApi;

const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Fixed-interval existence check for a browser session. Feeds the shared
/// `session exists` flag consumed by the readiness gate: `false` on any
/// transport error, 404, or a session with `completed_at` set. No backoff;
/// runs until aborted. Callers start the watch at `true` so readiness stays
/// optimistic until the backend answers.
pub struct ExistencePoller {
    handle: JoinHandle<()>,
}

impl ExistencePoller {
    pub fn spawn(
        api: Arc<dyn SessionApi>,
        api_base: Url,
        auth: Arc<StreamAuth>,
        browser_session_id: String,
        exists_tx: watch::Sender<bool>,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = interval(POLL_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let token = auth.rest_bearer().await;
                let exists = match api
                    .fetch_browser_session(&api_base, token.as_deref(), &browser_session_id)
                    .await
                {
                    Ok(record) => record.completed_at.is_none(),
                    Err(err) => {
                        debug!(
                            target: "periscope::session",
                            session = %browser_session_id,
                            %err,
                            "existence check failed"
                        );
                        false
                    }
                };
                if exists_tx.send(exists).is_err() {
                    break;
                }
            }
        });
        Self { handle }
    }

    pub fn abort(&self) {
        self.handle.abort();
    }
}

impl Drop for ExistencePoller {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Environment};
    use crate::session::backend::{BrowserSessionRecord, SessionError};
    use async_trait::async_trait;

    fn auth() -> Arc<StreamAuth> {
        let config = Config::new(
            "127.0.0.1:8700",
            "127.0.0.1:8700",
            None,
            Environment::Local,
            "client-1".into(),
        )
        .unwrap();
        Arc::new(StreamAuth::new(&config, None))
    }

    struct ScriptedApi {
        responses: parking_lot::Mutex<Vec<Result<BrowserSessionRecord, SessionError>>>,
    }

    #[async_trait]
    impl SessionApi for ScriptedApi {
        async fn fetch_browser_session(
            &self,
            _base_url: &Url,
            _auth_token: Option<&str>,
            _browser_session_id: &str,
        ) -> Result<BrowserSessionRecord, SessionError> {
            let mut responses = self.responses.lock();
            if responses.is_empty() {
                Err(SessionError::NotFound)
            } else {
                responses.remove(0)
            }
        }
    }

    async fn first_poll_result(api: ScriptedApi) -> bool {
        let (tx, mut rx) = watch::channel(true);
        let poller = ExistencePoller::spawn(
            Arc::new(api),
            Url::parse("http://127.0.0.1:8700").unwrap(),
            auth(),
            "bs-1".into(),
            tx,
        );
        rx.changed().await.expect("poller reported a result");
        let value = *rx.borrow();
        poller.abort();
        value
    }

    #[test_timeout::tokio_timeout_test]
    async fn live_session_reports_exists() {
        let api = ScriptedApi {
            responses: parking_lot::Mutex::new(vec![Ok(BrowserSessionRecord {
                browser_session_id: "bs-1".into(),
                completed_at: None,
            })]),
        };
        assert!(first_poll_result(api).await);
    }

    #[test_timeout::tokio_timeout_test]
    async fn completed_session_reports_gone() {
        let api = ScriptedApi {
            responses: parking_lot::Mutex::new(vec![Ok(BrowserSessionRecord {
                browser_session_id: "bs-1".into(),
                completed_at: Some("2026-08-01T12:00:00Z".into()),
            })]),
        };
        assert!(!first_poll_result(api).await);
    }

    #[test_timeout::tokio_timeout_test]
    async fn missing_session_reports_gone() {
        let api = ScriptedApi {
            responses: parking_lot::Mutex::new(vec![Err(SessionError::NotFound)]),
        };
        assert!(!first_poll_result(api).await);
    }
}
