use std::fmt;
use std::io::Write;

use conductor_session::{ChatDataItem, Expert, MessageId, SessionHandler};
use tracing::debug;

use crate::measurement::Measurement;

pub const MEDIATOR_NAME: &str = "Brain Conductor";

const WELCOME: &str = "Welcome to Brain Conductor. I'm the Main Brain. \
Ask any question, and it will be answered by an AI expert.";

/// One line typed by the user
#[derive(Debug, PartialEq, Eq)]
pub enum Input<'a> {
    Empty,
    Quit,
    Message(&'a str),
}

impl<'a> Input<'a> {
    pub fn parse(line: &'a str) -> Self {
        match line.trim() {
            "" => Input::Empty,
            "/quit" | "/exit" => Input::Quit,
            text => Input::Message(text),
        }
    }
}

/// Prints session events as plain text lines and feeds the measurement
/// counters.
pub struct ConsoleHandler<W> {
    out: W,
    members: Vec<String>,
    connection_issue: bool,
    measurement: Measurement,
}

impl<W: Write> ConsoleHandler<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            members: Vec::new(),
            connection_issue: false,
            measurement: Measurement::new(),
        }
    }

    pub fn welcome(&mut self) {
        self.line(format_args!("[{MEDIATOR_NAME}] {WELCOME}"));
    }

    /// Record an inquiry the session just accepted
    pub fn message_sent(&mut self, id: MessageId) {
        self.measurement.on_chat_message_sent(id);
    }

    pub fn members(&self) -> &[String] {
        &self.members
    }

    pub fn measurement(&self) -> &Measurement {
        &self.measurement
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    fn announce(&mut self, name: &str, greeting: &str) {
        self.members.push(name.to_string());
        self.line(format_args!("* {name} has entered the chat"));
        self.line(format_args!("  {greeting}"));
    }

    fn line(&mut self, args: fmt::Arguments<'_>) {
        if let Err(err) = writeln!(self.out, "{args}").and_then(|_| self.out.flush()) {
            debug!(error = %err, "console write failed");
        }
    }
}

impl<W: Write> SessionHandler for ConsoleHandler<W> {
    fn on_chat_message(
        &mut self,
        id: MessageId,
        from: &str,
        text: &str,
        _avatar: Option<&str>,
        data: &[ChatDataItem],
    ) {
        self.line(format_args!("[{from}] {text}"));
        for item in data {
            self.line(format_args!(
                "  ({} attachment, {}, {} bytes {})",
                item.kind,
                item.mime_type,
                item.content.len(),
                item.encoding
            ));
        }
        self.measurement.on_chat_message_response_delivered(id);
    }

    fn on_system_message(&mut self, id: MessageId, text: &str) {
        self.line(format_args!("[{MEDIATOR_NAME}] {text}"));
        self.measurement.on_chat_message_response_delivered(id);
    }

    fn on_members_list(&mut self, experts: &[Expert]) {
        // A reconnect resends the list; only the first one is announced.
        if !self.members.is_empty() {
            return;
        }
        for expert in experts {
            self.announce(&expert.name, &expert.greeting);
        }
    }

    fn on_preparing_response(&mut self, from: &str, greeting: &str) {
        if !self.members.iter().any(|m| m == from) {
            self.announce(from, greeting);
        }
        self.line(format_args!("  {from} is typing a response..."));
    }

    fn on_peer_error(&mut self, _id: Option<MessageId>, text: &str) {
        self.line(format_args!("[{MEDIATOR_NAME}] error: {text}"));
    }

    fn on_connected(&mut self) {
        if self.connection_issue {
            self.connection_issue = false;
            self.line(format_args!("(connection restored)"));
        }
    }

    fn on_disconnected(&mut self) {
        if !self.connection_issue {
            self.connection_issue = true;
            self.line(format_args!(
                "(connection issue: your messages will be sent once it is restored)"
            ));
        }
    }
}
