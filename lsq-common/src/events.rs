//! Event types for the LSQ event system
//!
//! Provides the shared event definitions and EventBus used for SSE streaming
//! and in-process observers. Events describe state changes that already
//! happened; emitting is never part of a persistence transaction.

use crate::model::Tier;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// LSQ event types
///
/// Broadcast via EventBus and serialized for SSE transmission. All state
/// changes that dashboards care about go through this one enum so matching
/// stays exhaustive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LsqEvent {
    /// A new lead profile was created (first identity-bearing event)
    ProfileCreated {
        lead_id: Uuid,
        identity_key: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// An interaction event was applied to a profile
    ///
    /// Not emitted for duplicate deliveries; the first application wins.
    InteractionRecorded {
        lead_id: Uuid,
        event_id: String,
        category: String,
        /// Points credited by this event (0 for unweighted categories)
        points: i64,
        /// Profile total after application
        total: i64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A profile's qualification tier changed
    ///
    /// Mirrors the payload delivered to the notification callback.
    TierChanged {
        lead_id: Uuid,
        identity_key: String,
        from_tier: Tier,
        to_tier: Tier,
        triggering_event_id: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// An anonymous session profile was merged into an identified profile
    ProfilesMerged {
        source_lead_id: Uuid,
        target_lead_id: Uuid,
        identity_key: String,
        /// Combined total after the component-wise merge
        merged_total: i64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A profile was removed by an explicit admin/GDPR delete
    ProfileDeleted {
        lead_id: Uuid,
        identity_key: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl LsqEvent {
    /// Event type name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            LsqEvent::ProfileCreated { .. } => "ProfileCreated",
            LsqEvent::InteractionRecorded { .. } => "InteractionRecorded",
            LsqEvent::TierChanged { .. } => "TierChanged",
            LsqEvent::ProfilesMerged { .. } => "ProfilesMerged",
            LsqEvent::ProfileDeleted { .. } => "ProfileDeleted",
        }
    }
}

/// Broadcast bus for LsqEvent
///
/// Thin wrapper over `tokio::sync::broadcast` so emit semantics (lossy vs.
/// checked) live in one place instead of at every call site.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<LsqEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a new EventBus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<LsqEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists,
    /// `Err` otherwise.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: LsqEvent) -> Result<usize, broadcast::error::SendError<LsqEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring delivery failures
    ///
    /// Use for events where having no subscribers is normal (e.g. no SSE
    /// client connected).
    pub fn emit_lossy(&self, event: LsqEvent) {
        let _ = self.tx.send(event);
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tier_changed() -> LsqEvent {
        LsqEvent::TierChanged {
            lead_id: Uuid::new_v4(),
            identity_key: "ada@example.com".to_string(),
            from_tier: Tier::Candidate,
            to_tier: Tier::HotLead,
            triggering_event_id: "evt-1".to_string(),
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_eventbus_new() {
        let bus = EventBus::new(100);
        assert_eq!(bus.capacity(), 100);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_eventbus_emit() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();

        bus.emit(tier_changed()).expect("emit should succeed");

        let received = rx.try_recv().expect("Should receive event");
        assert_eq!(received.event_type(), "TierChanged");
    }

    #[test]
    fn test_eventbus_emit_lossy_without_subscribers() {
        let bus = EventBus::new(2);
        // No subscribers; must not panic or error
        for _ in 0..5 {
            bus.emit_lossy(tier_changed());
        }
    }

    #[test]
    fn test_eventbus_multiple_subscribers() {
        let bus = EventBus::new(10);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        assert_eq!(bus.subscriber_count(), 2);

        bus.emit(tier_changed()).expect("emit should succeed");

        assert_eq!(rx1.try_recv().unwrap().event_type(), "TierChanged");
        assert_eq!(rx2.try_recv().unwrap().event_type(), "TierChanged");
    }

    #[test]
    fn test_event_serialization_has_type_tag() {
        let json = serde_json::to_string(&tier_changed()).unwrap();
        assert!(json.contains("\"type\":\"TierChanged\""));
        assert!(json.contains("\"from_tier\":\"candidate\""));
        assert!(json.contains("\"to_tier\":\"hot_lead\""));
    }
}
