//! In-memory transport for driving a session without a network. The
//! [`MockConnector`] is cheap to clone; every clone sees the same opened
//! transports, so a test keeps one clone and hands the other to the session.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{Connector, EventSink, ReadyState, Transport, TransportEvent, TransportId};
use crate::error::TransportError;

struct MockEndpoint {
    address: String,
    state: Arc<Mutex<ReadyState>>,
    sent: Arc<Mutex<Vec<String>>>,
    sink: EventSink,
}

#[derive(Clone, Default)]
pub struct MockConnector {
    endpoints: Arc<Mutex<Vec<MockEndpoint>>>,
    send_limit: Arc<Mutex<Option<usize>>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transports opened from now on drop after accepting `limit` frames,
    /// the way a socket dies in the middle of a flush. `None` lifts the limit.
    pub fn drop_after_sends(&self, limit: Option<usize>) {
        *self.send_limit.lock() = limit;
    }

    /// Number of transports opened so far
    pub fn opened(&self) -> usize {
        self.endpoints.lock().len()
    }

    pub fn address(&self, index: usize) -> String {
        self.with_endpoint(index, |e| e.address.clone())
    }

    pub fn transport_id(&self, index: usize) -> TransportId {
        self.with_endpoint(index, |e| e.sink.transport())
    }

    pub fn state(&self, index: usize) -> ReadyState {
        self.with_endpoint(index, |e| *e.state.lock())
    }

    /// Frames written to the transport, in order
    pub fn sent(&self, index: usize) -> Vec<String> {
        self.with_endpoint(index, |e| e.sent.lock().clone())
    }

    pub fn set_state(&self, index: usize, state: ReadyState) {
        self.with_endpoint(index, |e| *e.state.lock() = state);
    }

    /// Complete the handshake: the transport becomes open and reports it.
    pub fn accept(&self, index: usize) {
        self.with_endpoint(index, |e| {
            *e.state.lock() = ReadyState::Open;
            e.sink.emit(TransportEvent::Open);
        });
    }

    /// Refuse or drop the connection the way a browser socket does: the state
    /// flips to closed before the error is reported.
    pub fn fail(&self, index: usize, reason: &str) {
        self.with_endpoint(index, |e| {
            *e.state.lock() = ReadyState::Closed;
            e.sink.emit(TransportEvent::Error(reason.to_string()));
            e.sink.emit(TransportEvent::Closed);
        });
    }

    /// Push a raw inbound frame from the peer
    pub fn deliver(&self, index: usize, frame: &str) {
        self.with_endpoint(index, |e| {
            e.sink.emit(TransportEvent::Message(frame.to_string()));
        });
    }

    /// Emit an arbitrary event without touching the ready state
    pub fn emit(&self, index: usize, event: TransportEvent) {
        self.with_endpoint(index, |e| {
            e.sink.emit(event);
        });
    }

    fn with_endpoint<T>(&self, index: usize, f: impl FnOnce(&MockEndpoint) -> T) -> T {
        let endpoints = self.endpoints.lock();
        let endpoint = endpoints
            .get(index)
            .unwrap_or_else(|| panic!("no mock transport at index {index}"));
        f(endpoint)
    }
}

impl Connector for MockConnector {
    fn open(&mut self, address: &str, sink: EventSink) -> Box<dyn Transport> {
        let transport = MockTransport {
            id: sink.transport(),
            state: Arc::new(Mutex::new(ReadyState::Connecting)),
            sent: Arc::new(Mutex::new(Vec::new())),
            send_limit: *self.send_limit.lock(),
        };
        self.endpoints.lock().push(MockEndpoint {
            address: address.to_string(),
            state: transport.state.clone(),
            sent: transport.sent.clone(),
            sink,
        });
        Box::new(transport)
    }
}

pub struct MockTransport {
    id: TransportId,
    state: Arc<Mutex<ReadyState>>,
    sent: Arc<Mutex<Vec<String>>>,
    send_limit: Option<usize>,
}

impl Transport for MockTransport {
    fn id(&self) -> TransportId {
        self.id
    }

    fn ready_state(&self) -> ReadyState {
        *self.state.lock()
    }

    fn send_text(&self, frame: &str) -> Result<(), TransportError> {
        let state = self.ready_state();
        if state != ReadyState::Open {
            return Err(TransportError::NotOpen(state));
        }
        let mut sent = self.sent.lock();
        if self.send_limit.is_some_and(|limit| sent.len() >= limit) {
            *self.state.lock() = ReadyState::Closed;
            return Err(TransportError::NotOpen(ReadyState::Closed));
        }
        sent.push(frame.to_string());
        Ok(())
    }

    fn close(&mut self) {
        *self.state.lock() = ReadyState::Closed;
    }
}
