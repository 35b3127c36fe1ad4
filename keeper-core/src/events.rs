//! Vault event channel.
//!
//! State-changing operations publish an [`Event`] on the [`EventBus`]; the
//! bridge server forwards each one to its client, where it is delivered to the
//! listeners registered for that [`EventName`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};
use tokio::sync::broadcast;

/// Default number of events buffered per subscriber.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// The fixed set of event tags.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum EventName {
    /// The session was unlocked (payload: lock status).
    Login,
    /// The session was locked (payload: lock status).
    Logout,
    /// The active identity changed (payload: `{ commitment }`).
    IdentityChanged,
    /// A credential was stored (payload: `{ hash, name }`).
    CredentialAdded,
    /// A credential request was rejected.
    CredentialRejected,
    /// A host permission changed (payload: `{ host, approved, canSkipApprove }`).
    HostApprovalChanged,
    /// The active identity commitment was revealed to a host (payload: `{ commitment }`).
    RevealCommitment,
}

/// A published event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Event tag.
    pub name: EventName,
    /// Event-specific JSON payload.
    pub payload: Value,
}

/// Broadcast channel shared by every vault service.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventBus {
    /// Creates a bus buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes `payload` under `name`. Events with no subscriber are dropped.
    pub fn publish(&self, name: EventName, payload: impl Serialize) {
        let payload = serde_json::to_value(payload).unwrap_or_else(|err| {
            tracing::warn!(event = %name, error = %err, "unserializable event payload");
            Value::Null
        });
        match self.sender.send(Event { name, payload }) {
            Ok(receivers) => tracing::debug!(event = %name, receivers, "event published"),
            Err(_) => tracing::trace!(event = %name, "event dropped, no subscriber"),
        }
    }

    /// Subscribes to every event published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
