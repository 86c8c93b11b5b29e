use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::session::{EventSender, SessionEvent};

/// Defers a [`SessionEvent::ReconnectDue`] by the given delay. Scheduled
/// reconnects are never cancelled; the session ignores the ones that arrive
/// after it has already reconnected.
pub trait ReconnectScheduler: Send {
    fn schedule(&mut self, delay: Duration, events: EventSender);
}

/// Spawns a sleeping task on the current Tokio runtime.
#[derive(Debug, Default, Clone)]
pub struct TokioScheduler;

impl ReconnectScheduler for TokioScheduler {
    fn schedule(&mut self, delay: Duration, events: EventSender) {
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(SessionEvent::ReconnectDue);
        });
    }
}

/// Records requested delays and never fires on its own. Tests deliver
/// `ReconnectDue` themselves when they want the timer to expire.
#[derive(Debug, Default, Clone)]
pub struct ManualScheduler {
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().clone()
    }
}

impl ReconnectScheduler for ManualScheduler {
    fn schedule(&mut self, delay: Duration, _events: EventSender) {
        self.delays.lock().push(delay);
    }
}
