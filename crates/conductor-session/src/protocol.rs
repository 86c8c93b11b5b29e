//! Wire models for the chat peer. Every frame is a single JSON object whose
//! `type` field selects the variant.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::history::HistoryEntry;

/// Identifier the client assigns to each inquiry. The peer echoes it on the
/// responses it produces for that inquiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Inquiry,
    Reconnect,
}

/// Messages sent from the client to the chat peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OutboundMessage {
    Inquiry {
        id: MessageId,
        text: String,
    },
    /// Replays the conversation so a fresh connection can rebuild context
    Reconnect {
        history: Vec<HistoryEntry>,
    },
}

impl OutboundMessage {
    pub fn inquiry(id: MessageId, text: impl Into<String>) -> Self {
        OutboundMessage::Inquiry {
            id,
            text: text.into(),
        }
    }

    pub fn reconnect(history: &[HistoryEntry]) -> Self {
        OutboundMessage::Reconnect {
            history: history.to_vec(),
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            OutboundMessage::Inquiry { .. } => MessageKind::Inquiry,
            OutboundMessage::Reconnect { .. } => MessageKind::Reconnect,
        }
    }

    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Attachment carried by a bot message (e.g. a base64 image)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatDataItem {
    pub content: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub encoding: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expert {
    pub name: String,
    pub greeting: String,
}

/// Messages received from the chat peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum InboundEvent {
    BotMessage {
        id: MessageId,
        from: String,
        text: String,
        #[serde(default)]
        avatar: Option<String>,
        #[serde(default)]
        data: Vec<ChatDataItem>,
    },
    SystemMessage {
        id: MessageId,
        text: String,
    },
    ExpertsList {
        experts: Vec<Expert>,
    },
    PreparingResponse {
        from: String,
        greeting: String,
    },
    /// The peer could not process a request. It omits `id` when the request
    /// itself was unreadable.
    Error {
        #[serde(default)]
        id: Option<MessageId>,
        text: String,
    },
    #[serde(other)]
    Unrecognized,
}

impl InboundEvent {
    pub fn decode(frame: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(frame)?)
    }

    pub fn message_type(&self) -> &'static str {
        match self {
            InboundEvent::BotMessage { .. } => "bot-message",
            InboundEvent::SystemMessage { .. } => "system-message",
            InboundEvent::ExpertsList { .. } => "experts-list",
            InboundEvent::PreparingResponse { .. } => "preparing-response",
            InboundEvent::Error { .. } => "error",
            InboundEvent::Unrecognized => "unrecognized",
        }
    }
}
