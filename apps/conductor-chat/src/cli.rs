use std::time::Duration;

use clap::Parser;
use conductor_session::config::{
    DEFAULT_ADDRESS, ENV_BACKOFF_BASE_MS, ENV_BACKOFF_CAP_MS, ENV_URL, ENV_USER_LABEL,
};
use conductor_session::{endpoint_for, ConfigError, SessionConfig};

#[derive(Parser, Debug)]
#[command(name = "conductor-chat")]
#[command(about = "Chat with the Conductor experts from a terminal")]
pub struct Cli {
    /// Chat endpoint (e.g., ws://localhost:8080/chat)
    #[arg(long, env = ENV_URL)]
    pub url: Option<String>,

    /// Build the endpoint from a host instead (`ws://{host}/chat`); takes
    /// precedence over --url
    #[arg(long)]
    pub host: Option<String>,

    /// Use wss:// with --host
    #[arg(long, requires = "host")]
    pub secure: bool,

    /// Base reconnect delay in milliseconds
    #[arg(long, env = ENV_BACKOFF_BASE_MS)]
    pub backoff_base_ms: Option<u64>,

    /// Upper bound on the reconnect delay in milliseconds
    #[arg(long, env = ENV_BACKOFF_CAP_MS)]
    pub backoff_cap_ms: Option<u64>,

    /// Name recorded in the conversation for your own messages
    #[arg(long, env = ENV_USER_LABEL)]
    pub user_label: Option<String>,
}

impl Cli {
    pub fn session_config(&self) -> Result<SessionConfig, ConfigError> {
        let address = match (&self.host, &self.url) {
            (Some(host), _) => endpoint_for(host, self.secure),
            (None, Some(url)) => url.clone(),
            (None, None) => DEFAULT_ADDRESS.to_string(),
        };

        let mut config = SessionConfig::new(address)?;
        if let Some(ms) = self.backoff_base_ms {
            config.backoff_base = Duration::from_millis(ms);
        }
        if let Some(ms) = self.backoff_cap_ms {
            config.backoff_cap = Duration::from_millis(ms);
        }
        if let Some(label) = self.user_label.as_deref().filter(|l| !l.trim().is_empty()) {
            config = config.with_user_label(label);
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_builds_endpoint() {
        let cli = Cli::try_parse_from(["conductor-chat", "--host", "chat.example.com"]).unwrap();
        let config = cli.session_config().unwrap();
        assert_eq!(config.address, "ws://chat.example.com/chat");
    }

    #[test]
    fn secure_host_follows_tls_support() {
        let cli = Cli::try_parse_from(["conductor-chat", "--host", "chat.example.com", "--secure"])
            .unwrap();
        let result = cli.session_config();
        if cfg!(feature = "tls") {
            assert_eq!(result.unwrap().address, "wss://chat.example.com/chat");
        } else {
            assert!(matches!(result, Err(ConfigError::TlsUnavailable(_))));
        }
    }

    #[test]
    fn explicit_url_and_tuning() {
        let cli = Cli::try_parse_from([
            "conductor-chat",
            "--url",
            "ws://10.1.2.3:9000/chat",
            "--backoff-base-ms",
            "50",
            "--backoff-cap-ms",
            "2000",
            "--user-label",
            "Visitor",
        ])
        .unwrap();
        let config = cli.session_config().unwrap();
        assert_eq!(config.address, "ws://10.1.2.3:9000/chat");
        assert_eq!(config.backoff_base, Duration::from_millis(50));
        assert_eq!(config.backoff_cap, Duration::from_millis(2000));
        assert_eq!(config.user_label, "Visitor");
    }

    #[test]
    fn secure_requires_host() {
        assert!(Cli::try_parse_from(["conductor-chat", "--secure"]).is_err());
    }

    #[test]
    fn rejects_http_url() {
        let cli = Cli::try_parse_from(["conductor-chat", "--url", "http://example.com/chat"])
            .unwrap();
        assert!(matches!(
            cli.session_config(),
            Err(ConfigError::UnsupportedScheme(_))
        ));
    }
}
