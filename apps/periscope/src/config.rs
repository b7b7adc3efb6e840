use std::env;

use thiserror::Error;
use url::Url;
use uuid::Uuid;

const DEFAULT_API_BASE: &str = "http://127.0.0.1:8700";
const DEFAULT_STREAM_BASE: &str = "ws://127.0.0.1:8700";

/// Which deployment the client is pointed at. Local deployments may run
/// without any credentials at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Local,
    Cloud,
}

impl Environment {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "cloud" | "prod" | "production" => Environment::Cloud,
            _ => Environment::Local,
        }
    }

    pub fn is_local(self) -> bool {
        matches!(self, Environment::Local)
    }
}

/// Client configuration: backend endpoints, credentials, and the stable
/// client id both stream sockets present to the backend.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_base: Url,
    pub stream_base: Url,
    pub api_key: Option<String>,
    pub environment: Environment,
    pub client_id: String,
}

impl Config {
    /// Load configuration from `PERISCOPE_*` environment variables, falling
    /// back to a local deployment on the default port.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_base = env_or("PERISCOPE_API_BASE", DEFAULT_API_BASE);
        let stream_base = env_or("PERISCOPE_STREAM_BASE", DEFAULT_STREAM_BASE);
        let api_key = env::var("PERISCOPE_API_KEY")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        let environment = env::var("PERISCOPE_ENV")
            .map(|v| Environment::parse(&v))
            .unwrap_or(Environment::Local);
        let client_id = env::var("PERISCOPE_CLIENT_ID")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Self::new(&api_base, &stream_base, api_key, environment, client_id)
    }

    pub fn new(
        api_base: &str,
        stream_base: &str,
        api_key: Option<String>,
        environment: Environment,
        client_id: String,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            api_base: parse_base(api_base, "https://", "http://")?,
            stream_base: parse_base(stream_base, "wss://", "ws://")?,
            api_key,
            environment,
            client_id,
        })
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("base url cannot be empty")]
    EmptyBaseUrl,
    #[error("invalid base url '{raw}': {source}")]
    InvalidBaseUrl {
        raw: String,
        #[source]
        source: url::ParseError,
    },
}

fn env_or(var: &str, default: &str) -> String {
    env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_base(raw: &str, secure: &str, plain: &str) -> Result<Url, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::EmptyBaseUrl);
    }
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        let scheme = if is_private_host(trimmed) { plain } else { secure };
        format!("{scheme}{trimmed}")
    };
    Url::parse(&with_scheme).map_err(|source| ConfigError::InvalidBaseUrl {
        raw: raw.to_string(),
        source,
    })
}

/// Loopback and RFC1918 hosts get plaintext schemes; everything else is
/// assumed to sit behind TLS.
fn is_private_host(base: &str) -> bool {
    let authority = base.split('/').next().unwrap_or(base);
    // Bracketed hosts are IPv6 literals; everything else may carry a port.
    let host = if let Some(bracketed) = authority.strip_prefix('[') {
        bracketed.split(']').next().unwrap_or(bracketed)
    } else {
        authority.split(':').next().unwrap_or(authority)
    };
    let host = host.to_ascii_lowercase();
    host == "localhost"
        || host == "0.0.0.0"
        || host == "::1"
        || host.starts_with("127.")
        || host.starts_with("10.")
        || host.starts_with("192.168.")
        || host
            .strip_prefix("172.")
            .and_then(|rest| rest.split('.').next())
            .and_then(|octet| octet.parse::<u8>().ok())
            .map(|octet| (16..32).contains(&octet))
            .unwrap_or(false)
}
