//! Client-side session layer for the Conductor expert chat.
//!
//! A [`SessionClient`] keeps one logical conversation alive over a sequence
//! of transports. Sends made while disconnected are queued behind a replay of
//! the conversation so far, and go out in order once a transport opens.
//! Failed connections are retried with capped, fully jittered exponential
//! backoff.
//!
//! ```no_run
//! use conductor_session::{SessionClient, SessionConfig, SessionHandler};
//!
//! struct Quiet;
//! impl SessionHandler for Quiet {}
//!
//! # async fn run() -> Result<(), conductor_session::ConfigError> {
//! let config = SessionConfig::new("ws://127.0.0.1:8080/chat")?;
//! let (mut client, mut events) = SessionClient::builder(config, Quiet).build();
//! client.connect();
//! client.send_message("What is a borrow checker?");
//! while let Some(event) = events.recv().await {
//!     client.handle_event(event);
//! }
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod config;
pub mod error;
pub mod history;
pub mod protocol;
pub mod queue;
pub mod session;
pub mod timer;
pub mod transport;

pub use backoff::Backoff;
pub use config::{endpoint_for, SessionConfig};
pub use error::{ConfigError, ProtocolError, TransportError};
pub use history::{ConversationHistory, HistoryEntry};
pub use protocol::{ChatDataItem, Expert, InboundEvent, MessageId, MessageKind, OutboundMessage};
pub use queue::{OutboundQueue, QueuedFrame};
pub use session::{
    EventSender, SessionClient, SessionClientBuilder, SessionEvent, SessionEvents, SessionHandler,
};
pub use timer::{ManualScheduler, ReconnectScheduler, TokioScheduler};
pub use transport::{
    Connector, EventSink, MockConnector, ReadyState, Transport, TransportEvent, TransportId,
    WebSocketConnector,
};
