use thiserror::Error;

use crate::transport::ReadyState;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport is not open (state: {0:?})")]
    NotOpen(ReadyState),
    #[error("transport channel closed")]
    ChannelClosed,
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid peer address {address}: {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: url::ParseError,
    },
    #[error("unsupported scheme {0:?}; expected ws or wss")]
    UnsupportedScheme(String),
    #[error("{0} needs TLS support; build with the `tls` feature")]
    TlsUnavailable(String),
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}
