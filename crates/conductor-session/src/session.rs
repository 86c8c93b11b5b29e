//! The session client: owns one transport at a time and keeps a logical chat
//! session alive across reconnects.
//!
//! Transports and timers never call into the session directly. They post
//! [`SessionEvent`]s into a channel, and the owner feeds every event back
//! through [`SessionClient::handle_event`]. All session state is therefore
//! touched from a single task, one event at a time.

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::backoff::Backoff;
use crate::config::SessionConfig;
use crate::history::ConversationHistory;
use crate::protocol::{ChatDataItem, Expert, InboundEvent, MessageId, MessageKind, OutboundMessage};
use crate::queue::{OutboundQueue, QueuedFrame};
use crate::timer::{ReconnectScheduler, TokioScheduler};
use crate::transport::{
    Connector, EventSink, ReadyState, Transport, TransportEvent, TransportId, WebSocketConnector,
};

pub type EventSender = mpsc::UnboundedSender<SessionEvent>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Transport {
        transport: TransportId,
        event: TransportEvent,
    },
    /// A scheduled backoff delay elapsed
    ReconnectDue,
}

/// Receiving end of the session's event channel
#[derive(Debug)]
pub struct SessionEvents {
    rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl SessionEvents {
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<SessionEvent> {
        self.rx.try_recv().ok()
    }
}

/// Callbacks invoked as the peer pushes events. Every method defaults to a
/// no-op so implementors only override what they display.
pub trait SessionHandler {
    fn on_chat_message(
        &mut self,
        _id: MessageId,
        _from: &str,
        _text: &str,
        _avatar: Option<&str>,
        _data: &[ChatDataItem],
    ) {
    }

    fn on_system_message(&mut self, _id: MessageId, _text: &str) {}

    fn on_members_list(&mut self, _experts: &[Expert]) {}

    fn on_preparing_response(&mut self, _from: &str, _greeting: &str) {}

    /// The peer reported a failure. `id` is absent when the peer could not
    /// read the request at all.
    fn on_peer_error(&mut self, _id: Option<MessageId>, _text: &str) {}

    fn on_connected(&mut self) {}

    /// Called once for every send that had to be queued
    fn on_disconnected(&mut self) {}
}

pub struct SessionClientBuilder<H> {
    config: SessionConfig,
    handler: H,
    connector: Option<Box<dyn Connector>>,
    scheduler: Option<Box<dyn ReconnectScheduler>>,
    rng_seed: Option<u64>,
}

impl<H: SessionHandler> SessionClientBuilder<H> {
    /// Defaults to [`WebSocketConnector`]
    pub fn connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Some(Box::new(connector));
        self
    }

    /// Defaults to [`TokioScheduler`]
    pub fn scheduler(mut self, scheduler: impl ReconnectScheduler + 'static) -> Self {
        self.scheduler = Some(Box::new(scheduler));
        self
    }

    /// Seed the jitter source for reproducible delays
    pub fn rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    pub fn build(self) -> (SessionClient<H>, SessionEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        let rng = match self.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let backoff = Backoff::new(self.config.backoff_base, self.config.backoff_cap);

        let client = SessionClient {
            connector: self
                .connector
                .unwrap_or_else(|| Box::new(WebSocketConnector::new())),
            scheduler: self
                .scheduler
                .unwrap_or_else(|| Box::new(TokioScheduler)),
            config: self.config,
            handler: self.handler,
            transport: None,
            next_transport_id: 0,
            backoff,
            rng,
            queue: OutboundQueue::new(),
            replay_pending: false,
            history: ConversationHistory::new(),
            next_message_id: MessageId(0),
            shut_down: false,
            events: tx,
        };
        (client, SessionEvents { rx })
    }
}

pub struct SessionClient<H> {
    config: SessionConfig,
    connector: Box<dyn Connector>,
    scheduler: Box<dyn ReconnectScheduler>,
    handler: H,
    transport: Option<Box<dyn Transport>>,
    next_transport_id: u64,
    backoff: Backoff,
    rng: StdRng,
    queue: OutboundQueue,
    /// A reconnect frame is sitting in the queue
    replay_pending: bool,
    history: ConversationHistory,
    next_message_id: MessageId,
    /// Set by `close()`; stale reconnect timers must not revive the session
    shut_down: bool,
    events: EventSender,
}

impl<H: SessionHandler> SessionClient<H> {
    pub fn builder(config: SessionConfig, handler: H) -> SessionClientBuilder<H> {
        SessionClientBuilder {
            config,
            handler,
            connector: None,
            scheduler: None,
            rng_seed: None,
        }
    }

    /// Open a fresh transport to the configured address, closing the current
    /// one first if it is still alive.
    pub fn connect(&mut self) {
        if let Some(mut previous) = self.transport.take() {
            if previous.ready_state() != ReadyState::Closed {
                debug!(transport = %previous.id(), "closing transport before replacing it");
                previous.close();
            }
        }

        let id = TransportId(self.next_transport_id);
        self.next_transport_id += 1;
        self.shut_down = false;

        debug!(transport = %id, address = %self.config.address, "opening transport");
        let sink = EventSink::new(id, self.events.clone());
        self.transport = Some(self.connector.open(&self.config.address, sink));
    }

    /// Send an inquiry, queueing it behind a history replay when the
    /// transport is not open. Always returns the id assigned to the inquiry.
    pub fn send_message(&mut self, text: impl Into<String>) -> MessageId {
        let text = text.into();
        let id = self.next_message_id;
        self.next_message_id = MessageId(id.0 + 1);

        if let Some(frame) = encode(&OutboundMessage::inquiry(id, text.as_str())) {
            let delivered = self.state() == ReadyState::Open && self.transmit(&frame);
            if !delivered {
                if self.state() != ReadyState::Connecting {
                    self.connect();
                }
                self.defer(frame);
            }
        }

        self.history.push(self.config.user_label.as_str(), text);
        id
    }

    /// Tear down the connection for good. A later `send_message` or
    /// `connect` starts over.
    pub fn close(&mut self) {
        self.shut_down = true;
        if let Some(mut transport) = self.transport.take() {
            info!(transport = %transport.id(), "closing session");
            transport.close();
        }
    }

    /// Apply a single event from the session channel
    pub fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::ReconnectDue => self.on_reconnect_due(),
            SessionEvent::Transport { transport, event } => {
                if self.current_transport() != Some(transport) {
                    trace!(transport = %transport, ?event, "dropping event from replaced transport");
                    return;
                }
                match event {
                    TransportEvent::Open => self.on_open(transport),
                    TransportEvent::Message(frame) => self.on_message(&frame),
                    TransportEvent::Error(reason) => self.on_error(transport, &reason),
                    TransportEvent::Closed => {
                        debug!(transport = %transport, "transport closed");
                    }
                }
            }
        }
    }

    /// Apply every event already waiting in the channel. Returns how many
    /// were handled.
    pub fn process_pending(&mut self, events: &mut SessionEvents) -> usize {
        let mut handled = 0;
        while let Some(event) = events.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Ready state of the current transport; `Closed` when there is none
    pub fn state(&self) -> ReadyState {
        self.transport
            .as_ref()
            .map_or(ReadyState::Closed, |t| t.ready_state())
    }

    /// Consecutive failed connection attempts since the last open
    pub fn failure_count(&self) -> u32 {
        self.backoff.failures()
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    pub fn address(&self) -> &str {
        &self.config.address
    }

    fn current_transport(&self) -> Option<TransportId> {
        self.transport.as_ref().map(|t| t.id())
    }

    fn transmit(&self, frame: &QueuedFrame) -> bool {
        let Some(transport) = self.transport.as_ref() else {
            return false;
        };
        match transport.send_text(&frame.frame) {
            Ok(()) => true,
            Err(err) => {
                debug!(transport = %transport.id(), kind = ?frame.kind, error = %err, "send rejected");
                false
            }
        }
    }

    fn defer(&mut self, inquiry: QueuedFrame) {
        if !self.replay_pending {
            if let Some(replay) = encode(&OutboundMessage::reconnect(self.history.entries())) {
                self.queue.push(replay);
                self.replay_pending = true;
            }
        }
        self.queue.push(inquiry);
        debug!(queued = self.queue.len(), "transport unavailable; inquiry queued");
        self.handler.on_disconnected();
    }

    fn on_open(&mut self, transport: TransportId) {
        self.backoff.reset();
        self.replay_pending = false;

        let mut frames = self.queue.drain().into_iter();
        let mut flushed = 0usize;
        let mut unsent = Vec::new();
        while let Some(frame) = frames.next() {
            if self.transmit(&frame) {
                flushed += 1;
                continue;
            }
            unsent.push(frame);
            unsent.extend(frames.by_ref());
        }

        if unsent.is_empty() {
            info!(transport = %transport, flushed, "transport open");
            self.handler.on_connected();
            return;
        }

        warn!(transport = %transport, flushed, requeued = unsent.len(), "transport dropped during flush");
        self.requeue(unsent);
    }

    /// Put frames that never went out back into the queue, order intact. When
    /// their replay already left on the dead socket, a fresh one goes in front
    /// so the next transport still sees the history before the inquiries.
    fn requeue(&mut self, unsent: Vec<QueuedFrame>) {
        let starts_with_replay = unsent
            .first()
            .is_some_and(|frame| frame.kind == MessageKind::Reconnect);

        if starts_with_replay {
            self.replay_pending = true;
        } else {
            // Queued inquiries are always the newest history entries.
            let inquiries = unsent
                .iter()
                .filter(|frame| frame.kind == MessageKind::Inquiry)
                .count();
            let entries = self.history.entries();
            let replayed = &entries[..entries.len().saturating_sub(inquiries)];
            if let Some(replay) = encode(&OutboundMessage::reconnect(replayed)) {
                self.queue.push(replay);
                self.replay_pending = true;
            }
        }

        for frame in unsent {
            self.queue.push(frame);
        }
    }

    fn on_error(&mut self, transport: TransportId, reason: &str) {
        let state = self.state();
        if state != ReadyState::Closed {
            debug!(transport = %transport, ?state, error = %reason, "ignoring transport error");
            return;
        }

        let delay = self.backoff.next_delay(&mut self.rng);
        warn!(
            transport = %transport,
            error = %reason,
            failures = self.backoff.failures(),
            delay_ms = delay.as_millis() as u64,
            "transport failed; scheduling reconnect"
        );
        self.scheduler.schedule(delay, self.events.clone());
    }

    fn on_reconnect_due(&mut self) {
        if self.shut_down {
            debug!("session closed; ignoring reconnect timer");
            return;
        }
        match self.state() {
            ReadyState::Open | ReadyState::Connecting => {
                debug!("transport already up; ignoring reconnect timer");
            }
            ReadyState::Closing | ReadyState::Closed => self.connect(),
        }
    }

    fn on_message(&mut self, frame: &str) {
        let event = match InboundEvent::decode(frame) {
            Ok(event) => event,
            Err(err) => {
                warn!(error = %err, frame = %frame, "dropping malformed frame");
                return;
            }
        };
        trace!(message_type = event.message_type(), "inbound frame");

        match event {
            InboundEvent::BotMessage {
                id,
                from,
                text,
                avatar,
                data,
            } => {
                self.history.push(from.as_str(), text.as_str());
                self.handler
                    .on_chat_message(id, &from, &text, avatar.as_deref(), &data);
            }
            InboundEvent::SystemMessage { id, text } => {
                self.handler.on_system_message(id, &text);
            }
            InboundEvent::ExpertsList { experts } => {
                self.handler.on_members_list(&experts);
            }
            InboundEvent::PreparingResponse { from, greeting } => {
                self.handler.on_preparing_response(&from, &greeting);
            }
            InboundEvent::Error { id, text } => {
                warn!(id = ?id, error = %text, "peer reported an error");
                self.handler.on_peer_error(id, &text);
            }
            InboundEvent::Unrecognized => {
                debug!(frame = %frame, "ignoring unrecognized message type");
            }
        }
    }
}

fn encode(message: &OutboundMessage) -> Option<QueuedFrame> {
    match message.encode() {
        Ok(frame) => Some(QueuedFrame::new(message.kind(), frame)),
        Err(err) => {
            warn!(kind = ?message.kind(), error = %err, "failed to encode outbound message");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::ManualScheduler;
    use crate::transport::MockConnector;
    use serde_json::{json, Value};
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Chat { id: u64, from: String, text: String },
        System { id: u64, text: String },
        Members(Vec<String>),
        Preparing { from: String, greeting: String },
        PeerError { id: Option<u64>, text: String },
        /// Frames already written to the newest transport when the callback ran
        Connected { flushed: usize },
        Disconnected,
    }

    struct Recorder {
        connector: MockConnector,
        calls: Vec<Call>,
    }

    impl SessionHandler for Recorder {
        fn on_chat_message(
            &mut self,
            id: MessageId,
            from: &str,
            text: &str,
            _avatar: Option<&str>,
            _data: &[ChatDataItem],
        ) {
            self.calls.push(Call::Chat {
                id: id.0,
                from: from.into(),
                text: text.into(),
            });
        }

        fn on_system_message(&mut self, id: MessageId, text: &str) {
            self.calls.push(Call::System {
                id: id.0,
                text: text.into(),
            });
        }

        fn on_members_list(&mut self, experts: &[Expert]) {
            self.calls
                .push(Call::Members(experts.iter().map(|e| e.name.clone()).collect()));
        }

        fn on_preparing_response(&mut self, from: &str, greeting: &str) {
            self.calls.push(Call::Preparing {
                from: from.into(),
                greeting: greeting.into(),
            });
        }

        fn on_peer_error(&mut self, id: Option<MessageId>, text: &str) {
            self.calls.push(Call::PeerError {
                id: id.map(|id| id.0),
                text: text.into(),
            });
        }

        fn on_connected(&mut self) {
            let newest = self.connector.opened() - 1;
            let flushed = self.connector.sent(newest).len();
            self.calls.push(Call::Connected { flushed });
        }

        fn on_disconnected(&mut self) {
            self.calls.push(Call::Disconnected);
        }
    }

    struct Harness {
        client: SessionClient<Recorder>,
        events: SessionEvents,
        connector: MockConnector,
        scheduler: ManualScheduler,
    }

    impl Harness {
        fn new() -> Self {
            let connector = MockConnector::new();
            let scheduler = ManualScheduler::new();
            let config = SessionConfig::new("ws://127.0.0.1:8080/chat").unwrap();
            let recorder = Recorder {
                connector: connector.clone(),
                calls: Vec::new(),
            };
            let (client, events) = SessionClient::builder(config, recorder)
                .connector(connector.clone())
                .scheduler(scheduler.clone())
                .rng_seed(7)
                .build();
            Self {
                client,
                events,
                connector,
                scheduler,
            }
        }

        fn pump(&mut self) -> usize {
            self.client.process_pending(&mut self.events)
        }

        fn newest(&self) -> usize {
            self.connector.opened() - 1
        }

        /// Connect and complete the handshake
        fn open(&mut self) -> usize {
            self.client.connect();
            let index = self.newest();
            self.connector.accept(index);
            self.pump();
            index
        }

        fn calls(&self) -> &[Call] {
            &self.client.handler().calls
        }

        fn clear_calls(&mut self) {
            self.client.handler_mut().calls.clear();
        }

        fn sent_json(&self, index: usize) -> Vec<Value> {
            self.connector
                .sent(index)
                .iter()
                .map(|frame| serde_json::from_str(frame).unwrap())
                .collect()
        }
    }

    #[test]
    fn sends_while_open_go_out_in_call_order() {
        let mut h = Harness::new();
        let index = h.open();

        let ids: Vec<MessageId> = ["one", "two", "three"]
            .into_iter()
            .map(|text| h.client.send_message(text))
            .collect();

        assert_eq!(ids, [MessageId(0), MessageId(1), MessageId(2)]);
        assert_eq!(
            h.sent_json(index),
            [
                json!({"type": "inquiry", "id": 0, "text": "one"}),
                json!({"type": "inquiry", "id": 1, "text": "two"}),
                json!({"type": "inquiry", "id": 2, "text": "three"}),
            ]
        );
        assert_eq!(h.client.queued_len(), 0);
        assert!(!h.calls().contains(&Call::Disconnected));
    }

    #[test]
    fn send_while_closed_queues_replay_then_inquiry() {
        let mut h = Harness::new();

        let id = h.client.send_message("hello");

        assert_eq!(id, MessageId(0));
        assert_eq!(h.connector.opened(), 1);
        assert_eq!(h.client.state(), ReadyState::Connecting);
        assert_eq!(h.client.queued_len(), 2);
        assert_eq!(h.calls(), [Call::Disconnected]);

        h.connector.accept(0);
        h.pump();
        assert_eq!(
            h.sent_json(0),
            [
                json!({"type": "reconnect", "history": []}),
                json!({"type": "inquiry", "id": 0, "text": "hello"}),
            ]
        );
    }

    #[test]
    fn sends_while_connecting_share_one_replay() {
        let mut h = Harness::new();
        h.client.connect();

        h.client.send_message("a");
        h.client.send_message("b");

        assert_eq!(h.connector.opened(), 1);
        assert_eq!(h.client.queued_len(), 3);
        assert_eq!(h.calls(), [Call::Disconnected, Call::Disconnected]);

        h.connector.accept(0);
        h.pump();
        assert_eq!(
            h.sent_json(0),
            [
                json!({"type": "reconnect", "history": []}),
                json!({"type": "inquiry", "id": 0, "text": "a"}),
                json!({"type": "inquiry", "id": 1, "text": "b"}),
            ]
        );
    }

    #[test]
    fn open_flushes_queue_before_connected_and_resets_failures() {
        let mut h = Harness::new();
        h.client.send_message("first");
        h.connector.fail(0, "connection refused");
        h.pump();
        assert_eq!(h.client.failure_count(), 1);

        h.client.handle_event(SessionEvent::ReconnectDue);
        h.connector.fail(1, "connection refused");
        h.pump();
        assert_eq!(h.client.failure_count(), 2);

        h.client.handle_event(SessionEvent::ReconnectDue);
        h.client.send_message("second");
        h.connector.accept(2);
        h.pump();

        assert_eq!(h.client.failure_count(), 0);
        assert_eq!(h.client.queued_len(), 0);
        assert_eq!(
            h.sent_json(2),
            [
                json!({"type": "reconnect", "history": []}),
                json!({"type": "inquiry", "id": 0, "text": "first"}),
                json!({"type": "inquiry", "id": 1, "text": "second"}),
            ]
        );
        assert_eq!(h.calls().last(), Some(&Call::Connected { flushed: 3 }));
    }

    #[test]
    fn replay_carries_history_after_a_drop() {
        let mut h = Harness::new();
        h.open();
        h.client.send_message("hi");
        h.connector
            .deliver(0, r#"{"type":"bot-message","id":0,"from":"Ada","text":"hello"}"#);
        h.pump();

        h.connector.fail(0, "connection reset");
        h.pump();
        assert_eq!(h.scheduler.delays().len(), 1);

        let id = h.client.send_message("again");
        assert_eq!(id, MessageId(1));
        assert_eq!(h.connector.opened(), 2);

        // The backoff timer fires after the send already reconnected.
        h.client.handle_event(SessionEvent::ReconnectDue);
        assert_eq!(h.connector.opened(), 2);

        h.connector.accept(1);
        h.pump();
        assert_eq!(
            h.sent_json(1),
            [
                json!({
                    "type": "reconnect",
                    "history": [
                        {"from": "User", "text": "hi"},
                        {"from": "Ada", "text": "hello"}
                    ]
                }),
                json!({"type": "inquiry", "id": 1, "text": "again"}),
            ]
        );
    }

    #[test]
    fn five_failures_then_sixth_delay_is_bounded() {
        let mut h = Harness::new();
        h.client.connect();

        for attempt in 0..5 {
            h.connector.fail(attempt, "connection refused");
            h.pump();
            h.client.handle_event(SessionEvent::ReconnectDue);
        }
        assert_eq!(h.client.failure_count(), 5);

        h.connector.fail(5, "connection refused");
        h.pump();

        let delays = h.scheduler.delays();
        assert_eq!(delays.len(), 6);
        for (n, delay) in delays.iter().enumerate() {
            let ceiling = (100u64 << n).min(10_000);
            assert!(*delay < Duration::from_millis(ceiling), "delay {n} was {delay:?}");
        }
        assert!(delays[5] < Duration::from_millis(3200));
    }

    #[test]
    fn experts_list_reaches_handler_without_touching_history() {
        let mut h = Harness::new();
        h.open();
        h.clear_calls();

        h.connector.deliver(
            0,
            r#"{"type":"experts-list","experts":[{"name":"Ada","greeting":"hi"}]}"#,
        );
        h.pump();

        assert_eq!(h.calls(), [Call::Members(vec!["Ada".into()])]);
        assert!(h.client.history().is_empty());
    }

    #[test]
    fn history_keeps_interleaved_order() {
        let mut h = Harness::new();
        h.open();
        h.clear_calls();

        h.client.send_message("q1");
        h.connector
            .deliver(0, r#"{"type":"bot-message","id":0,"from":"Ada","text":"a1"}"#);
        h.connector
            .deliver(0, r#"{"type":"system-message","id":0,"text":"Grace is thinking"}"#);
        h.connector
            .deliver(0, r#"{"type":"bot-message","id":0,"from":"Grace","text":"a2"}"#);
        h.pump();
        h.client.send_message("q2");

        let entries: Vec<(&str, &str)> = h
            .client
            .history()
            .iter()
            .map(|e| (e.from.as_str(), e.text.as_str()))
            .collect();
        assert_eq!(
            entries,
            [("User", "q1"), ("Ada", "a1"), ("Grace", "a2"), ("User", "q2")]
        );
        assert_eq!(
            h.calls(),
            [
                Call::Chat {
                    id: 0,
                    from: "Ada".into(),
                    text: "a1".into()
                },
                Call::System {
                    id: 0,
                    text: "Grace is thinking".into()
                },
                Call::Chat {
                    id: 0,
                    from: "Grace".into(),
                    text: "a2".into()
                },
            ]
        );
    }

    #[test]
    fn events_from_replaced_transport_are_dropped() {
        let mut h = Harness::new();
        h.client.connect();
        h.client.connect();

        assert_eq!(h.connector.opened(), 2);
        assert_eq!(h.connector.state(0), ReadyState::Closed);
        assert_ne!(h.connector.transport_id(0), h.connector.transport_id(1));

        h.connector.emit(0, TransportEvent::Open);
        h.connector
            .deliver(0, r#"{"type":"bot-message","id":0,"from":"Ada","text":"late"}"#);
        h.connector.emit(0, TransportEvent::Error("stale".into()));
        h.pump();

        assert!(h.calls().is_empty());
        assert!(h.client.history().is_empty());
        assert!(h.scheduler.delays().is_empty());
        assert_eq!(h.client.state(), ReadyState::Connecting);
    }

    #[test]
    fn reconnect_timer_is_ignored_while_connected() {
        let mut h = Harness::new();
        h.open();

        h.client.handle_event(SessionEvent::ReconnectDue);

        assert_eq!(h.connector.opened(), 1);
        assert_eq!(h.client.state(), ReadyState::Open);
    }

    #[test]
    fn errors_while_not_closed_do_not_schedule() {
        let mut h = Harness::new();
        h.client.connect();

        h.connector.emit(0, TransportEvent::Error("flaky".into()));
        h.pump();

        assert!(h.scheduler.delays().is_empty());
        assert_eq!(h.client.failure_count(), 0);
    }

    #[test]
    fn malformed_frames_are_dropped_and_session_continues() {
        let mut h = Harness::new();
        h.open();
        h.clear_calls();

        h.connector.deliver(0, "not json at all");
        h.connector.deliver(0, r#"{"text":"missing type"}"#);
        h.connector
            .deliver(0, r#"{"type":"bot-message","id":"zero","from":"Ada","text":"x"}"#);
        h.connector.deliver(0, r#"{"type":"typing","from":"Ada"}"#);
        h.pump();
        assert!(h.calls().is_empty());
        assert!(h.client.history().is_empty());

        h.connector
            .deliver(0, r#"{"type":"bot-message","id":4,"from":"Ada","text":"still here"}"#);
        h.pump();
        assert_eq!(
            h.calls(),
            [Call::Chat {
                id: 4,
                from: "Ada".into(),
                text: "still here".into()
            }]
        );
        assert_eq!(h.client.state(), ReadyState::Open);
    }

    #[test]
    fn peer_errors_and_preparing_notices_are_dispatched() {
        let mut h = Harness::new();
        h.open();
        h.clear_calls();

        h.connector
            .deliver(0, r#"{"type":"preparing-response","from":"Ada","greeting":"hi"}"#);
        h.connector
            .deliver(0, r#"{"type":"error","text":"I could not understand"}"#);
        h.connector
            .deliver(0, r#"{"type":"error","id":3,"text":"no expert available"}"#);
        h.pump();

        assert_eq!(
            h.calls(),
            [
                Call::Preparing {
                    from: "Ada".into(),
                    greeting: "hi".into()
                },
                Call::PeerError {
                    id: None,
                    text: "I could not understand".into()
                },
                Call::PeerError {
                    id: Some(3),
                    text: "no expert available".into()
                },
            ]
        );
    }

    #[test]
    fn clean_close_reconnects_lazily_on_next_send() {
        let mut h = Harness::new();
        h.open();

        h.connector.set_state(0, ReadyState::Closed);
        h.connector.emit(0, TransportEvent::Closed);
        h.pump();
        assert!(h.scheduler.delays().is_empty());
        assert_eq!(h.connector.opened(), 1);

        h.client.send_message("wake up");
        assert_eq!(h.connector.opened(), 2);
        assert_eq!(h.client.queued_len(), 2);
    }

    #[test]
    fn close_stops_reconnect_timers() {
        let mut h = Harness::new();
        h.client.connect();
        h.connector.fail(0, "connection refused");
        h.pump();

        h.client.close();
        h.client.handle_event(SessionEvent::ReconnectDue);

        assert_eq!(h.connector.opened(), 1);
        assert_eq!(h.client.state(), ReadyState::Closed);
    }

    #[test]
    fn close_shuts_the_live_transport() {
        let mut h = Harness::new();
        h.open();

        h.client.close();

        assert_eq!(h.connector.state(0), ReadyState::Closed);
        assert_eq!(h.client.state(), ReadyState::Closed);
        assert_eq!(h.connector.address(0), h.client.address());
    }

    #[test]
    fn drop_mid_flush_requeues_unsent_frames_behind_a_fresh_replay() {
        let mut h = Harness::new();
        h.connector.drop_after_sends(Some(1));
        h.client.connect();
        h.client.send_message("a");
        h.client.send_message("b");
        h.clear_calls();

        h.connector.accept(0);
        h.pump();

        // Only the replay made it out before the socket died.
        assert_eq!(h.sent_json(0), [json!({"type": "reconnect", "history": []})]);
        assert_eq!(h.client.state(), ReadyState::Closed);
        assert_eq!(h.client.queued_len(), 3);
        assert!(h.client.replay_pending);
        assert!(h.calls().is_empty());

        h.connector.drop_after_sends(None);
        h.client.send_message("c");
        h.connector.accept(1);
        h.pump();

        assert_eq!(
            h.sent_json(1),
            [
                json!({"type": "reconnect", "history": []}),
                json!({"type": "inquiry", "id": 0, "text": "a"}),
                json!({"type": "inquiry", "id": 1, "text": "b"}),
                json!({"type": "inquiry", "id": 2, "text": "c"}),
            ]
        );
        assert_eq!(h.client.queued_len(), 0);
        assert_eq!(h.calls().last(), Some(&Call::Connected { flushed: 4 }));
    }

    #[test]
    fn replay_after_partial_flush_keeps_delivered_inquiries() {
        let mut h = Harness::new();
        h.connector.drop_after_sends(Some(2));
        h.client.connect();
        h.client.send_message("a");
        h.client.send_message("b");

        h.connector.accept(0);
        h.pump();

        assert_eq!(
            h.sent_json(0),
            [
                json!({"type": "reconnect", "history": []}),
                json!({"type": "inquiry", "id": 0, "text": "a"}),
            ]
        );
        assert_eq!(h.client.queued_len(), 2);
        assert!(h.client.replay_pending);

        h.connector.drop_after_sends(None);
        h.client.connect();
        h.connector.accept(1);
        h.pump();

        assert_eq!(
            h.sent_json(1),
            [
                json!({"type": "reconnect", "history": [{"from": "User", "text": "a"}]}),
                json!({"type": "inquiry", "id": 1, "text": "b"}),
            ]
        );
        assert!(!h.client.replay_pending);
    }
}
