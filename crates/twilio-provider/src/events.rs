//! Event bus between the provider and the bot framework
//!
//! The framework subscribes to a broadcast channel and receives the events
//! the provider publishes. Event names and payloads are the stable contract.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::types::{HostInfo, NormalizedMessage, Notice};

const CHANNEL_CAPACITY: usize = 256;

/// Events published to the framework
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum ProviderEvent {
    /// Normalized inbound message
    Message(NormalizedMessage),
    /// Identity of the active channel
    Host(HostInfo),
    /// Something the operator should know about
    Notice(Notice),
    /// Twilio rejected the account credentials
    AuthFailure(serde_json::Value),
    /// The webhook server is accepting requests
    Ready(bool),
}

impl ProviderEvent {
    /// Stable event name
    pub fn name(&self) -> &'static str {
        match self {
            ProviderEvent::Message(_) => "message",
            ProviderEvent::Host(_) => "host",
            ProviderEvent::Notice(_) => "notice",
            ProviderEvent::AuthFailure(_) => "auth_failure",
            ProviderEvent::Ready(_) => "ready",
        }
    }
}

/// Cloneable handle to the provider's event channel
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ProviderEvent>,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Subscribe to all subsequent events
    pub fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.tx.subscribe()
    }

    /// Publish an event; dropped if nobody is listening
    pub fn emit(&self, event: ProviderEvent) {
        let name = event.name();
        if self.tx.send(event).is_err() {
            debug!("No subscribers for '{}' event", name);
        }
    }

    /// Publish a notice
    pub fn notice(&self, title: &str, instructions: Vec<String>) {
        self.emit(ProviderEvent::Notice(Notice {
            title: title.to_string(),
            instructions,
        }));
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        let host = ProviderEvent::Host(HostInfo {
            phone: "14155238886".to_string(),
        });
        assert_eq!(host.name(), "host");
        assert_eq!(ProviderEvent::Ready(true).name(), "ready");
        assert_eq!(
            ProviderEvent::AuthFailure(serde_json::Value::Null).name(),
            "auth_failure"
        );
    }

    #[test]
    fn test_event_serialization() {
        let event = ProviderEvent::Host(HostInfo {
            phone: "14155238886".to_string(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "host");
        assert_eq!(json["payload"]["phone"], "14155238886");
    }

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.notice("INFO", vec!["hello".to_string()]);

        match rx.recv().await.unwrap() {
            ProviderEvent::Notice(notice) => {
                assert_eq!(notice.title, "INFO");
                assert_eq!(notice.instructions, vec!["hello".to_string()]);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new();
        bus.emit(ProviderEvent::Ready(true));
    }
}
