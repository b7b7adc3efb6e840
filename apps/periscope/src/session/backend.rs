use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

/// Metadata the backend keeps for one live browser session. A non-null
/// `completed_at` means the session has ended even though the resource still
/// resolves.
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserSessionRecord {
    pub browser_session_id: String,
    #[serde(default)]
    pub completed_at: Option<String>,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid session endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("browser session not found")]
    NotFound,
    #[error("unexpected http status {0}")]
    HttpStatus(StatusCode),
}

/// REST surface the existence poller depends on.
#[async_trait]
pub trait SessionApi: Send + Sync {
    async fn fetch_browser_session(
        &self,
        base_url: &Url,
        auth_token: Option<&str>,
        browser_session_id: &str,
    ) -> Result<BrowserSessionRecord, SessionError>;
}

pub struct ReqwestSessionApi {
    client: reqwest::Client,
}

impl ReqwestSessionApi {
    pub fn new() -> Result<Self, SessionError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(3))
            .timeout(Duration::from_secs(8))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SessionApi for ReqwestSessionApi {
    async fn fetch_browser_session(
        &self,
        base_url: &Url,
        auth_token: Option<&str>,
        browser_session_id: &str,
    ) -> Result<BrowserSessionRecord, SessionError> {
        let endpoint = base_url
            .join(&format!("browser_sessions/{browser_session_id}"))
            .map_err(|err| SessionError::InvalidEndpoint(err.to_string()))?;
        let mut builder = self.client.get(endpoint);
        if let Some(token) = auth_token {
            builder = builder.bearer_auth(token);
        }
        let response = builder.send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(SessionError::NotFound),
            status if !status.is_success() => Err(SessionError::HttpStatus(status)),
            _ => Ok(response.json::<BrowserSessionRecord>().await?),
        }
    }
}
