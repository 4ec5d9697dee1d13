//! Session event bus
//!
//! Every transition, progress update and playback descriptor is published on a
//! single broadcast channel. Subscribers pick the events of one client.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

use crate::error::ErrorReport;
use crate::models::{ClientId, PlaybackDescriptor};
use crate::stream::session::SessionState;

/// Default number of events buffered per subscriber
pub const DEFAULT_CAPACITY: usize = 256;

/// Notification pushed to the UI layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEvent {
    pub client_id: ClientId,
    pub session_id: Uuid,
    pub kind: SessionEventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEventKind {
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    Progress {
        percent: u8,
        message: Option<String>,
    },
    Ready {
        descriptor: PlaybackDescriptor,
    },
    Failed {
        report: ErrorReport,
    },
    /// The engine download could not be released while tearing the session down
    CleanupFailed {
        report: ErrorReport,
    },
}

/// Broadcast bus shared by all sessions
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event; having no subscribers is fine
    pub fn publish(&self, event: SessionEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to the events of one client
    pub fn subscribe(&self, client_id: ClientId) -> SessionEvents {
        SessionEvents {
            client_id: Some(client_id),
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe to every client's events
    pub fn subscribe_all(&self) -> SessionEvents {
        SessionEvents {
            client_id: None,
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver side of a subscription
#[derive(Debug)]
pub struct SessionEvents {
    client_id: Option<ClientId>,
    receiver: broadcast::Receiver<SessionEvent>,
}

impl SessionEvents {
    /// Next event for this subscription, `None` once the bus is gone
    ///
    /// A subscriber that fell behind skips the dropped events.
    pub async fn next(&mut self) -> Option<SessionEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.matches(&event) {
                        return Some(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "session event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    fn matches(&self, event: &SessionEvent) -> bool {
        self.client_id
            .as_ref()
            .map_or(true, |id| *id == event.client_id)
    }
}
