//! Shared service state
//!
//! Event bus handle plus lock-free counters surfaced by the health endpoint.

use lsq_common::events::{EventBus, LsqEvent};
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared state accessible by all handlers
pub struct SharedState {
    /// Event broadcaster for SSE and in-process observers
    pub event_bus: EventBus,

    /// Interaction events applied (first delivery only)
    events_applied_total: AtomicU64,

    /// Duplicate deliveries absorbed by the idempotency contract
    duplicates_total: AtomicU64,

    /// Accepted tier transitions
    tier_changes_total: AtomicU64,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            event_bus: EventBus::new(1000),
            events_applied_total: AtomicU64::new(0),
            duplicates_total: AtomicU64::new(0),
            tier_changes_total: AtomicU64::new(0),
        }
    }

    /// Broadcast an event, ignoring the no-subscriber case
    pub fn broadcast_event(&self, event: LsqEvent) {
        self.event_bus.emit_lossy(event);
    }

    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<LsqEvent> {
        self.event_bus.subscribe()
    }

    pub fn record_applied(&self) {
        self.events_applied_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self) {
        self.duplicates_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tier_change(&self) {
        self.tier_changes_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn events_applied(&self) -> u64 {
        self.events_applied_total.load(Ordering::Relaxed)
    }

    pub fn duplicates(&self) -> u64 {
        self.duplicates_total.load(Ordering::Relaxed)
    }

    pub fn tier_changes(&self) -> u64 {
        self.tier_changes_total.load(Ordering::Relaxed)
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let state = SharedState::new();
        assert_eq!(state.events_applied(), 0);

        state.record_applied();
        state.record_applied();
        state.record_duplicate();
        state.record_tier_change();

        assert_eq!(state.events_applied(), 2);
        assert_eq!(state.duplicates(), 1);
        assert_eq!(state.tier_changes(), 1);
    }

    #[test]
    fn test_broadcast_without_subscribers_is_ok() {
        let state = SharedState::new();
        state.broadcast_event(LsqEvent::ProfileCreated {
            lead_id: uuid::Uuid::new_v4(),
            identity_key: "ada@example.com".to_string(),
            timestamp: chrono::Utc::now(),
        });
    }
}
