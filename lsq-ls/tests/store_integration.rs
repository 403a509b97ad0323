//! Profile store property tests
//!
//! Exercises the store directly (no HTTP): idempotence, replay determinism,
//! monotonic tier progression, and concurrent apply safety.

mod helpers;

use chrono::Utc;
use helpers::test_server::test_store;
use lsq_common::model::{
    EventCategory, EventPayload, InteractionEvent, Tier, WebinarInteractions,
};
use serde_json::Value;

fn event(id: &str, key: &str, category: EventCategory) -> InteractionEvent {
    InteractionEvent {
        event_id: id.to_string(),
        identity_key: key.to_string(),
        category,
        timestamp: Utc::now(),
        payload: None,
        metadata: Value::Null,
    }
}

#[tokio::test]
async fn test_applying_twice_equals_applying_once() {
    let (store, _state, _pool) = test_store().await;
    let e = event("evt-1", "ada@example.com", EventCategory::ToolCompletion);

    let first = store.apply_event(e.clone()).await.unwrap();
    assert!(!first.duplicate);
    assert_eq!(first.points, 10);

    let second = store.apply_event(e).await.unwrap();
    assert!(second.duplicate);
    assert_eq!(second.points, 0);
    assert_eq!(second.profile.score_breakdown, first.profile.score_breakdown);
    assert_eq!(second.profile.tier, first.profile.tier);
}

#[tokio::test]
async fn test_replay_reproduces_live_state_exactly() {
    let (store, _state, _pool) = test_store().await;
    let key = "ada@example.com";

    // A mixed history: weighted events, a webinar attendance, an unknown
    // category, and an admin override
    store
        .apply_event(event("evt-1", key, EventCategory::PageVisit))
        .await
        .unwrap();
    store
        .apply_event(event("evt-2", key, EventCategory::WebinarRegistration))
        .await
        .unwrap();

    let mut attendance = event("evt-3", key, EventCategory::WebinarAttendance);
    attendance.payload = Some(EventPayload::WebinarAttendance {
        webinar_id: Some("web-1".to_string()),
        attended: true,
        join_time: None,
        leave_time: None,
        duration_minutes: Some(55),
        interactions: WebinarInteractions {
            chat_messages: 1,
            questions_asked: 1,
            poll_responses: 1,
            reactions_used: 0,
        },
    });
    store.apply_event(attendance).await.unwrap();

    store
        .apply_event(event(
            "evt-4",
            key,
            EventCategory::Unknown("newsletter_open".to_string()),
        ))
        .await
        .unwrap();

    let mut override_event = event("evt-5", key, EventCategory::AdminOverride);
    override_event.payload = Some(EventPayload::AdminOverride {
        tier: Some(Tier::Candidate),
        score_adjustment: Some(-2),
        notes: None,
        clear_sticky: false,
    });
    store.apply_event(override_event).await.unwrap();

    let live = store.get(key).await.unwrap().unwrap();
    let replayed = store.replay(key).await.unwrap();

    assert_eq!(replayed.score_breakdown, live.score_breakdown);
    assert_eq!(replayed.tier, live.tier);
    assert_eq!(replayed.sticky, live.sticky);
}

#[tokio::test]
async fn test_tier_is_monotonic_without_admin_events() {
    let (store, _state, _pool) = test_store().await;
    let key = "ada@example.com";

    let categories = [
        EventCategory::PageVisit,
        EventCategory::CtaClick,
        EventCategory::ToolCompletion,
        EventCategory::WebinarRegistration,
        EventCategory::PageVisit,
        EventCategory::OfficeVisitBooked,
        EventCategory::PageVisit,
    ];

    let mut previous = Tier::Visitor;
    for (i, category) in categories.into_iter().enumerate() {
        let outcome = store
            .apply_event(event(&format!("evt-{}", i), key, category))
            .await
            .unwrap();
        assert!(
            outcome.profile.tier >= previous,
            "tier regressed from {} to {}",
            previous,
            outcome.profile.tier
        );
        previous = outcome.profile.tier;
    }
}

#[tokio::test]
async fn test_concurrent_applies_for_same_lead_all_land_once() {
    let (store, _state, _pool) = test_store().await;
    let key = "ada@example.com";

    let mut handles = Vec::new();
    for i in 0..20 {
        let store = std::sync::Arc::clone(&store);
        let e = event(&format!("evt-{}", i), key, EventCategory::ToolCompletion);
        handles.push(tokio::spawn(async move { store.apply_event(e).await }));
    }

    let mut applied = 0;
    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        if !outcome.duplicate {
            applied += 1;
        }
    }

    assert_eq!(applied, 20);
    let profile = store.get(key).await.unwrap().unwrap();
    assert_eq!(profile.score_breakdown.total, 200);
    assert_eq!(profile.score_breakdown.tool_completion_score, 200);
}

#[tokio::test]
async fn test_concurrent_retries_of_one_event_apply_once() {
    let (store, _state, _pool) = test_store().await;
    let key = "ada@example.com";

    // Simulated network retries: the same event id raced from 8 callers
    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = std::sync::Arc::clone(&store);
        let e = event("evt-retried", key, EventCategory::OfficeVisitBooked);
        handles.push(tokio::spawn(async move { store.apply_event(e).await }));
    }

    let mut applied = 0;
    for handle in handles {
        if !handle.await.unwrap().unwrap().duplicate {
            applied += 1;
        }
    }

    assert_eq!(applied, 1);
    let profile = store.get(key).await.unwrap().unwrap();
    assert_eq!(profile.score_breakdown.total, 50);
}

#[tokio::test]
async fn test_distinct_leads_do_not_interfere() {
    let (store, _state, _pool) = test_store().await;

    let mut handles = Vec::new();
    for i in 0..10 {
        let store = std::sync::Arc::clone(&store);
        let key = format!("lead{}@example.com", i);
        handles.push(tokio::spawn(async move {
            store
                .apply_event(event("evt-1", &key, EventCategory::CtaClick))
                .await
        }));
    }
    for handle in handles {
        assert!(!handle.await.unwrap().unwrap().duplicate);
    }

    for i in 0..10 {
        let profile = store
            .get(&format!("lead{}@example.com", i))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(profile.score_breakdown.total, 3);
    }
}

#[tokio::test]
async fn test_merge_preserves_sticky_side() {
    let (store, _state, _pool) = test_store().await;

    store
        .apply_event(event("evt-1", "session:anon", EventCategory::ToolCompletion))
        .await
        .unwrap();

    store
        .apply_event(event("evt-2", "ada@example.com", EventCategory::ToolCompletion))
        .await
        .unwrap();
    let mut pin = event("evt-3", "ada@example.com", EventCategory::AdminOverride);
    pin.payload = Some(EventPayload::AdminOverride {
        tier: Some(Tier::HotLead),
        score_adjustment: None,
        notes: None,
        clear_sticky: false,
    });
    store.apply_event(pin).await.unwrap();

    let merged = store.merge("session:anon", "ada@example.com").await.unwrap();
    assert_eq!(merged.score_breakdown.total, 20);
    assert_eq!(merged.tier, Tier::HotLead);
    assert!(merged.sticky);
}

#[tokio::test]
async fn test_get_or_create_is_stable() {
    let (store, _state, _pool) = test_store().await;

    let first = store.get_or_create("ada@example.com").await.unwrap();
    let second = store.get_or_create("ada@example.com").await.unwrap();
    assert_eq!(first.lead_id, second.lead_id);
    assert_eq!(second.tier, Tier::Visitor);
}

#[tokio::test]
async fn test_out_of_order_timestamps_keep_latest_interaction() {
    let (store, _state, _pool) = test_store().await;
    let key = "ada@example.com";

    let now = Utc::now();
    let mut late = event("evt-late", key, EventCategory::PageVisit);
    late.timestamp = now;
    let mut early = event("evt-early", key, EventCategory::PageVisit);
    early.timestamp = now - chrono::Duration::hours(2);

    // Arrives newest first; an older event must not roll last_interaction back
    store.apply_event(late).await.unwrap();
    let outcome = store.apply_event(early).await.unwrap();

    assert_eq!(outcome.profile.last_interaction, Some(now));
    assert_eq!(outcome.profile.score_breakdown.total, 2);
}
