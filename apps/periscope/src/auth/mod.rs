//! Credential resolution for the stream sockets and the REST backend.
//!
//! Two modes exist: a deployment with an identity service injects a
//! [`CredentialProvider`] that mints short-lived bearer tokens, while local
//! deployments use a static api key (or nothing at all). Resolution failures
//! downgrade to credential-less requests with a warning; they never abort a
//! connection attempt.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use crate::config::{Config, Environment};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("credential provider failed: {0}")]
    Provider(String),
}

/// Mints bearer tokens for the streaming endpoints. Implementations are
/// expected to cache/refresh internally; callers resolve per connection
/// attempt.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn bearer_token(&self) -> Result<Option<String>, AuthError>;
}

/// Assembles the auth material both stream sockets and the REST poller use.
#[derive(Clone)]
pub struct StreamAuth {
    provider: Option<Arc<dyn CredentialProvider>>,
    api_key: Option<String>,
    environment: Environment,
}

impl StreamAuth {
    pub fn new(config: &Config, provider: Option<Arc<dyn CredentialProvider>>) -> Self {
        Self {
            provider,
            api_key: config.api_key.clone(),
            environment: config.environment,
        }
    }

    /// Query string for a stream socket URL: `client_id` always, then either
    /// `token=Bearer {token}` (provider mode) or `apikey={key}` (static
    /// mode). A failed or empty token resolution falls back to no credential.
    pub async fn query_string(&self, client_id: &str) -> String {
        let mut parts = vec![format!("client_id={client_id}")];
        match self.resolve_token().await {
            Some(token) => parts.push(format!("token=Bearer {token}")),
            None => match (&self.provider, &self.api_key) {
                (None, Some(key)) => parts.push(format!("apikey={key}")),
                _ => {
                    if !self.environment.is_local() {
                        warn!(target: "periscope::auth", "connecting without credentials outside a local deployment");
                    }
                }
            },
        }
        parts.join("&")
    }

    /// Bearer token for REST calls: the provider token when one is
    /// configured, otherwise the static api key.
    pub async fn rest_bearer(&self) -> Option<String> {
        match self.resolve_token().await {
            Some(token) => Some(token),
            None if self.provider.is_none() => self.api_key.clone(),
            None => None,
        }
    }

    async fn resolve_token(&self) -> Option<String> {
        let provider = self.provider.as_ref()?;
        match provider.bearer_token().await {
            Ok(token) => token,
            Err(err) => {
                warn!(target: "periscope::auth", %err, "token resolution failed; continuing without credentials");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;

    fn config_with_key(api_key: Option<&str>) -> Config {
        Config::new(
            "127.0.0.1:8700",
            "127.0.0.1:8700",
            api_key.map(str::to_string),
            Environment::Local,
            "client-1".into(),
        )
        .unwrap()
    }

    struct FixedToken(Option<String>);

    #[async_trait]
    impl CredentialProvider for FixedToken {
        async fn bearer_token(&self) -> Result<Option<String>, AuthError> {
            Ok(self.0.clone())
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl CredentialProvider for FailingProvider {
        async fn bearer_token(&self) -> Result<Option<String>, AuthError> {
            Err(AuthError::Provider("identity service unreachable".into()))
        }
    }

    #[test_timeout::tokio_timeout_test]
    async fn api_key_mode_appends_apikey() {
        let auth = StreamAuth::new(&config_with_key(Some("k-42")), None);
        assert_eq!(
            auth.query_string("client-1").await,
            "client_id=client-1&apikey=k-42"
        );
    }

    #[test_timeout::tokio_timeout_test]
    async fn provider_mode_appends_bearer_token() {
        let auth = StreamAuth::new(
            &config_with_key(Some("k-42")),
            Some(Arc::new(FixedToken(Some("tok-9".into())))),
        );
        assert_eq!(
            auth.query_string("client-1").await,
            "client_id=client-1&token=Bearer tok-9"
        );
    }

    #[test_timeout::tokio_timeout_test]
    async fn missing_credentials_leave_only_client_id() {
        let auth = StreamAuth::new(&config_with_key(None), None);
        assert_eq!(auth.query_string("client-1").await, "client_id=client-1");
    }

    #[test_timeout::tokio_timeout_test]
    async fn provider_failure_downgrades_to_no_credentials() {
        let auth = StreamAuth::new(
            &config_with_key(Some("k-42")),
            Some(Arc::new(FailingProvider)),
        );
        // Provider mode never falls back to the api key.
        assert_eq!(auth.query_string("client-1").await, "client_id=client-1");
    }

    #[test_timeout::tokio_timeout_test]
    async fn rest_bearer_prefers_provider_token() {
        let auth = StreamAuth::new(
            &config_with_key(Some("k-42")),
            Some(Arc::new(FixedToken(Some("tok-9".into())))),
        );
        assert_eq!(auth.rest_bearer().await.as_deref(), Some("tok-9"));

        let auth = StreamAuth::new(&config_with_key(Some("k-42")), None);
        assert_eq!(auth.rest_bearer().await.as_deref(), Some("k-42"));
    }
}
