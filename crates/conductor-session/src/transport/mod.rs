use std::fmt;

use crate::error::TransportError;
use crate::session::{EventSender, SessionEvent};

pub mod mock;
pub mod websocket;

pub use mock::{MockConnector, MockTransport};
pub use websocket::{WebSocketConnector, WebSocketTransport};

/// Identity of one transport handle. The session hands out a fresh id on
/// every connect so late events from a replaced handle can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransportId(pub u64);

impl fmt::Display for TransportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Lifecycle of a single transport handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Events a transport reports back to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Open,
    Message(String),
    /// Connection refused or dropped. The transport updates its ready state
    /// before emitting this.
    Error(String),
    Closed,
}

/// Handle used by a transport to post events into the session channel
#[derive(Debug, Clone)]
pub struct EventSink {
    transport: TransportId,
    tx: EventSender,
}

impl EventSink {
    pub fn new(transport: TransportId, tx: EventSender) -> Self {
        Self { transport, tx }
    }

    pub fn transport(&self) -> TransportId {
        self.transport
    }

    /// Returns false once the session side has gone away.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx
            .send(SessionEvent::Transport {
                transport: self.transport,
                event,
            })
            .is_ok()
    }
}

/// A single duplex, text-frame connection to the chat peer. Implementations
/// carry no protocol knowledge.
pub trait Transport: Send {
    fn id(&self) -> TransportId;

    fn ready_state(&self) -> ReadyState;

    /// Queue a text frame for delivery. Only valid while [`ReadyState::Open`].
    fn send_text(&self, frame: &str) -> Result<(), TransportError>;

    /// Begin an orderly shutdown. Idempotent.
    fn close(&mut self);
}

/// Opens transports. `open` must return immediately in the
/// [`ReadyState::Connecting`] state and report the outcome through the sink.
pub trait Connector: Send {
    fn open(&mut self, address: &str, sink: EventSink) -> Box<dyn Transport>;
}
