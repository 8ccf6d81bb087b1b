use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::session::{SessionReport, SessionState};

/// Events pushed to the host application independently of any request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum UssdEvent {
    /// A new, distinct dialog message (`onUssdMessageReceived`).
    #[serde(rename_all = "camelCase")]
    MessageReceived {
        session_id: Option<Uuid>,
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    SessionStateChanged {
        session_id: Uuid,
        from: SessionState,
        to: SessionState,
    },
    SessionFinished(SessionReport),
}

/// Fan-out of [`UssdEvent`]s. Sends with no subscribers are dropped.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<UssdEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _rx) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: UssdEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UssdEvent> {
        self.sender.subscribe()
    }
}
