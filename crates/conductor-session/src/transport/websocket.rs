use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use super::{Connector, EventSink, ReadyState, Transport, TransportEvent, TransportId};
use crate::error::TransportError;

/// Opens [`WebSocketTransport`]s. Needs a Tokio runtime.
#[derive(Debug, Default, Clone)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for WebSocketConnector {
    fn open(&mut self, address: &str, sink: EventSink) -> Box<dyn Transport> {
        Box::new(WebSocketTransport::spawn(address.to_string(), sink))
    }
}

/// WebSocket implementation of the Transport trait. The socket is driven by
/// a background task that reports through the [`EventSink`].
pub struct WebSocketTransport {
    id: TransportId,
    state: Arc<RwLock<ReadyState>>,
    outbound: Option<mpsc::UnboundedSender<String>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl WebSocketTransport {
    pub fn spawn(address: String, sink: EventSink) -> Self {
        let id = sink.transport();
        let state = Arc::new(RwLock::new(ReadyState::Connecting));
        let (tx_out, rx_out) = mpsc::unbounded_channel::<String>();

        let task_state = state.clone();
        let task = tokio::spawn(async move {
            run_socket(address, rx_out, task_state, sink).await;
        });

        Self {
            id,
            state,
            outbound: Some(tx_out),
            task: Some(task),
        }
    }
}

impl Transport for WebSocketTransport {
    fn id(&self) -> TransportId {
        self.id
    }

    fn ready_state(&self) -> ReadyState {
        *self.state.read()
    }

    fn send_text(&self, frame: &str) -> Result<(), TransportError> {
        let state = self.ready_state();
        if state != ReadyState::Open {
            return Err(TransportError::NotOpen(state));
        }
        let tx = self.outbound.as_ref().ok_or(TransportError::ChannelClosed)?;
        tx.send(frame.to_string())
            .map_err(|_| TransportError::ChannelClosed)
    }

    fn close(&mut self) {
        {
            let mut state = self.state.write();
            if matches!(*state, ReadyState::Connecting | ReadyState::Open) {
                *state = ReadyState::Closing;
            }
        }
        // Dropping the sender tells the socket task to send a close frame.
        self.outbound.take();
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        // A transport that was closed winds down on its own; anything else
        // is torn down immediately.
        if self.outbound.is_some() {
            if let Some(task) = self.task.take() {
                task.abort();
            }
        }
    }
}

async fn run_socket(
    address: String,
    rx_out: mpsc::UnboundedReceiver<String>,
    state: Arc<RwLock<ReadyState>>,
    sink: EventSink,
) {
    let ws_stream = match connect_async(address.as_str()).await {
        Ok((ws_stream, _)) => ws_stream,
        Err(err) => {
            debug!(transport = %sink.transport(), address = %address, error = %err, "websocket connect failed");
            *state.write() = ReadyState::Closed;
            sink.emit(TransportEvent::Error(err.to_string()));
            sink.emit(TransportEvent::Closed);
            return;
        }
    };

    let superseded = {
        let mut guard = state.write();
        if *guard == ReadyState::Closing {
            true
        } else {
            *guard = ReadyState::Open;
            false
        }
    };
    if superseded {
        // close() raced the handshake; the session no longer wants this socket.
        let mut ws_stream = ws_stream;
        let _ = ws_stream.close(None).await;
        *state.write() = ReadyState::Closed;
        sink.emit(TransportEvent::Closed);
        return;
    }
    sink.emit(TransportEvent::Open);

    let failure = handle_websocket(ws_stream, rx_out, &state, &sink).await;

    *state.write() = ReadyState::Closed;
    if let Some(reason) = failure {
        sink.emit(TransportEvent::Error(reason));
    }
    sink.emit(TransportEvent::Closed);
}

/// Pump frames both ways until either side goes away. Returns the failure
/// reason when the connection ended abnormally.
async fn handle_websocket(
    ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut rx_out: mpsc::UnboundedReceiver<String>,
    state: &RwLock<ReadyState>,
    sink: &EventSink,
) -> Option<String> {
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    loop {
        tokio::select! {
            outbound = rx_out.recv() => match outbound {
                Some(frame) => {
                    if let Err(err) = ws_sender.send(Message::Text(frame)).await {
                        return Some(format!("websocket write failed: {err}"));
                    }
                }
                None => {
                    *state.write() = ReadyState::Closing;
                    let _ = ws_sender.send(Message::Close(None)).await;
                    return None;
                }
            },
            inbound = ws_receiver.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    if !sink.emit(TransportEvent::Message(text)) {
                        return None;
                    }
                }
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                    Ok(text) => {
                        if !sink.emit(TransportEvent::Message(text)) {
                            return None;
                        }
                    }
                    Err(err) => {
                        warn!(transport = %sink.transport(), error = %err, "dropping non-utf8 binary frame");
                    }
                },
                Some(Ok(Message::Close(_))) | None => return None,
                Some(Ok(_)) => {} // Ping/Pong are answered by tungstenite
                Some(Err(err)) => return Some(format!("websocket read failed: {err}")),
            },
        }
    }
}
