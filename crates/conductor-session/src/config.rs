use std::env;
use std::time::Duration;

use url::Url;

use crate::backoff::{DEFAULT_BASE, DEFAULT_CAP};
use crate::error::ConfigError;

pub const ENV_URL: &str = "CONDUCTOR_CHAT_URL";
pub const ENV_BACKOFF_BASE_MS: &str = "CONDUCTOR_BACKOFF_BASE_MS";
pub const ENV_BACKOFF_CAP_MS: &str = "CONDUCTOR_BACKOFF_CAP_MS";
pub const ENV_USER_LABEL: &str = "CONDUCTOR_USER_LABEL";

pub const DEFAULT_ADDRESS: &str = "ws://127.0.0.1:8080/chat";
pub const DEFAULT_USER_LABEL: &str = "User";

/// Session configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Full peer address, scheme included (`ws://host/chat`)
    pub address: String,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    /// Participant name recorded in history for the user's own inquiries
    pub user_label: String,
}

impl SessionConfig {
    pub fn new(address: impl Into<String>) -> Result<Self, ConfigError> {
        let address = address.into();
        validate_address(&address)?;
        Ok(Self {
            address,
            backoff_base: DEFAULT_BASE,
            backoff_cap: DEFAULT_CAP,
            user_label: DEFAULT_USER_LABEL.to_string(),
        })
    }

    /// Load configuration from environment variables, falling back to the
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let address = env::var(ENV_URL).unwrap_or_else(|_| DEFAULT_ADDRESS.to_string());
        let mut config = Self::new(address)?;
        if let Some(base) = env_millis(ENV_BACKOFF_BASE_MS)? {
            config.backoff_base = base;
        }
        if let Some(cap) = env_millis(ENV_BACKOFF_CAP_MS)? {
            config.backoff_cap = cap;
        }
        if let Ok(label) = env::var(ENV_USER_LABEL) {
            if !label.trim().is_empty() {
                config.user_label = label;
            }
        }
        Ok(config)
    }

    pub fn with_backoff(mut self, base: Duration, cap: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_cap = cap;
        self
    }

    pub fn with_user_label(mut self, label: impl Into<String>) -> Self {
        self.user_label = label.into();
        self
    }
}

/// Build the chat endpoint for a host. Picking `secure` to match the page or
/// service the client runs alongside is up to the caller.
pub fn endpoint_for(host: &str, secure: bool) -> String {
    let scheme = if secure { "wss" } else { "ws" };
    format!("{scheme}://{}/chat", host.trim_end_matches('/'))
}

fn validate_address(address: &str) -> Result<(), ConfigError> {
    let url = Url::parse(address).map_err(|source| ConfigError::InvalidAddress {
        address: address.to_string(),
        source,
    })?;
    match url.scheme() {
        "ws" => Ok(()),
        "wss" if cfg!(feature = "tls") => Ok(()),
        "wss" => Err(ConfigError::TlsUnavailable(address.to_string())),
        other => Err(ConfigError::UnsupportedScheme(other.to_string())),
    }
}

fn env_millis(key: &'static str) -> Result<Option<Duration>, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .map(|ms| Some(Duration::from_millis(ms)))
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        Err(_) => Ok(None),
    }
}
