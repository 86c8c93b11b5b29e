use std::collections::HashSet;

use conductor_session::MessageId;
use metrics::counter;
use tracing::info;

/// Tracks which inquiries are still waiting for their first response and
/// counts requests and initial responses for the life of the process.
#[derive(Debug, Default)]
pub struct Measurement {
    awaiting_response: HashSet<MessageId>,
    requests_sent: u64,
    initial_responses: u64,
}

impl Measurement {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call after every `send_message`
    pub fn on_chat_message_sent(&mut self, id: MessageId) {
        self.awaiting_response.insert(id);
        self.requests_sent += 1;

        counter!("conductor_chat_requests_sent_total", 1);
        info!(
            id = %id,
            event = %format!("SentChatMessage{}", self.requests_sent),
            "chat message sent"
        );
    }

    /// Call after a response has been shown to the user. Only the first
    /// response to each inquiry counts; returns whether this was it.
    pub fn on_chat_message_response_delivered(&mut self, id: MessageId) -> bool {
        if !self.awaiting_response.remove(&id) {
            return false;
        }
        self.initial_responses += 1;

        counter!("conductor_chat_initial_responses_total", 1);
        info!(
            id = %id,
            event = %format!("ReceivedChatInitialResponse{}", self.initial_responses),
            "first response delivered"
        );
        true
    }

    pub fn requests_sent(&self) -> u64 {
        self.requests_sent
    }

    pub fn initial_responses(&self) -> u64 {
        self.initial_responses
    }

    pub fn awaiting_response(&self) -> usize {
        self.awaiting_response.len()
    }
}
