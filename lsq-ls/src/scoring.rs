//! Scoring engine
//!
//! Pure score-breakdown arithmetic: no I/O, no state. Given the current
//! breakdown and a normalized event, produces the new breakdown and the
//! points credited. Idempotency (not crediting the same event_id twice) is
//! enforced by the profile store, not here.

use lsq_common::model::{
    EventCategory, EventPayload, InteractionEvent, ScoreBreakdown, WebinarInteractions,
};

/// Base weight per recognized category
pub const PAGE_VISIT_WEIGHT: i64 = 1;
pub const CTA_CLICK_WEIGHT: i64 = 3;
pub const TOOL_COMPLETION_WEIGHT: i64 = 10;
pub const WEBINAR_REGISTRATION_WEIGHT: i64 = 15;
pub const OFFICE_VISIT_WEIGHT: i64 = 50;

/// Flat base credited for a completed webinar attendance
pub const ATTENDANCE_BASE_POINTS: i64 = 15;
/// Engagement bonus is capped before being added to the base
pub const ENGAGEMENT_BONUS_CAP: i64 = 10;

/// Result of applying one event to a breakdown
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub breakdown: ScoreBreakdown,
    /// Points credited by this event (signed for admin adjustments, 0 for
    /// unweighted categories)
    pub points: i64,
}

/// Base weight for a category
///
/// Categories that influence tier but not score (membership events, admin
/// overrides) and unrecognized categories weigh 0.
pub fn base_weight(category: &EventCategory) -> i64 {
    match category {
        EventCategory::PageVisit => PAGE_VISIT_WEIGHT,
        EventCategory::CtaClick => CTA_CLICK_WEIGHT,
        EventCategory::ToolCompletion => TOOL_COMPLETION_WEIGHT,
        EventCategory::WebinarRegistration => WEBINAR_REGISTRATION_WEIGHT,
        EventCategory::OfficeVisitBooked => OFFICE_VISIT_WEIGHT,
        EventCategory::WebinarAttendance
        | EventCategory::MembershipRegistration
        | EventCategory::MembershipApproved
        | EventCategory::AdminOverride
        | EventCategory::Unknown(_) => 0,
    }
}

/// Raw (uncapped) webinar engagement bonus
pub fn engagement_bonus(interactions: &WebinarInteractions) -> i64 {
    interactions.chat_messages as i64 * 2
        + interactions.questions_asked as i64 * 5
        + interactions.poll_responses as i64 * 3
        + interactions.reactions_used as i64
}

/// Points credited for a completed webinar attendance
pub fn attendance_points(interactions: &WebinarInteractions) -> i64 {
    ATTENDANCE_BASE_POINTS + engagement_bonus(interactions).min(ENGAGEMENT_BONUS_CAP)
}

/// Attendance duration in whole minutes
///
/// An explicit duration wins; otherwise derived from join/leave times,
/// rounded to the nearest minute and floored at 0. Duration is reported in
/// the breakdown but never scores.
pub fn derive_duration_minutes(
    explicit: Option<i64>,
    join_time: Option<chrono::DateTime<chrono::Utc>>,
    leave_time: Option<chrono::DateTime<chrono::Utc>>,
) -> Option<i64> {
    if let Some(d) = explicit {
        return Some(d.max(0));
    }
    match (join_time, leave_time) {
        (Some(join), Some(leave)) => {
            let seconds = (leave - join).num_seconds();
            let minutes = (seconds as f64 / 60.0).round() as i64;
            Some(minutes.max(0))
        }
        _ => None,
    }
}

/// Apply one normalized event to a score breakdown
///
/// Automatic categories only ever add non-negative points, which is what
/// keeps `total` monotonically non-decreasing outside admin adjustments.
pub fn apply_event(current: &ScoreBreakdown, event: &InteractionEvent) -> Applied {
    let mut breakdown = current.clone();

    let points = match &event.category {
        EventCategory::PageVisit => {
            breakdown.page_visit_score += PAGE_VISIT_WEIGHT;
            PAGE_VISIT_WEIGHT
        }
        EventCategory::CtaClick => {
            breakdown.cta_click_score += CTA_CLICK_WEIGHT;
            CTA_CLICK_WEIGHT
        }
        EventCategory::ToolCompletion => {
            breakdown.tool_completion_score += TOOL_COMPLETION_WEIGHT;
            TOOL_COMPLETION_WEIGHT
        }
        EventCategory::WebinarRegistration => {
            breakdown.webinar_registration_score += WEBINAR_REGISTRATION_WEIGHT;
            WEBINAR_REGISTRATION_WEIGHT
        }
        EventCategory::OfficeVisitBooked => {
            breakdown.office_visit_score += OFFICE_VISIT_WEIGHT;
            OFFICE_VISIT_WEIGHT
        }
        EventCategory::WebinarAttendance => apply_attendance(&mut breakdown, event),
        EventCategory::AdminOverride => apply_admin_adjustment(&mut breakdown, event),
        // Tier-only and unrecognized categories are recorded for audit with
        // zero scoring weight
        EventCategory::MembershipRegistration
        | EventCategory::MembershipApproved
        | EventCategory::Unknown(_) => 0,
    };

    breakdown.recompute_total();
    Applied { breakdown, points }
}

fn apply_attendance(breakdown: &mut ScoreBreakdown, event: &InteractionEvent) -> i64 {
    let (attended, interactions, duration) = match &event.payload {
        Some(EventPayload::WebinarAttendance {
            attended,
            interactions,
            duration_minutes,
            join_time,
            leave_time,
            ..
        }) => (
            *attended,
            *interactions,
            derive_duration_minutes(*duration_minutes, *join_time, *leave_time),
        ),
        // Attendance event without a payload: count it as a bare attendance
        _ => (true, WebinarInteractions::default(), None),
    };

    if let Some(minutes) = duration {
        breakdown.attendance_duration_minutes = Some(minutes);
    }

    if !attended {
        return 0;
    }

    let points = attendance_points(&interactions);
    breakdown.engagement_score += points;
    points
}

fn apply_admin_adjustment(breakdown: &mut ScoreBreakdown, event: &InteractionEvent) -> i64 {
    let delta = match &event.payload {
        Some(EventPayload::AdminOverride {
            score_adjustment: Some(delta),
            ..
        }) => *delta,
        _ => return 0,
    };

    breakdown.admin_adjustment_score += delta;

    // Admin adjustments may reduce the total, but never below zero
    let floor_shortfall = -breakdown.component_sum();
    if floor_shortfall > 0 {
        breakdown.admin_adjustment_score += floor_shortfall;
        delta + floor_shortfall
    } else {
        delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use lsq_common::model::EventCategory;

    fn event(category: EventCategory) -> InteractionEvent {
        InteractionEvent {
            event_id: "evt-1".to_string(),
            identity_key: "ada@example.com".to_string(),
            category,
            timestamp: Utc::now(),
            payload: None,
            metadata: serde_json::Value::Null,
        }
    }

    fn attendance_event(interactions: WebinarInteractions) -> InteractionEvent {
        let mut e = event(EventCategory::WebinarAttendance);
        e.payload = Some(EventPayload::WebinarAttendance {
            webinar_id: Some("web-1".to_string()),
            attended: true,
            join_time: None,
            leave_time: None,
            duration_minutes: None,
            interactions,
        });
        e
    }

    #[test]
    fn test_tool_completion_scores_ten() {
        let applied = apply_event(
            &ScoreBreakdown::default(),
            &event(EventCategory::ToolCompletion),
        );
        assert_eq!(applied.points, 10);
        assert_eq!(applied.breakdown.tool_completion_score, 10);
        assert_eq!(applied.breakdown.total, 10);
    }

    #[test]
    fn test_engagement_bonus_is_capped() {
        // 2*2 + 1*5 + 0*3 + 3*1 = 12, capped at 10 -> 15 + 10 = 25
        let applied = apply_event(
            &ScoreBreakdown::default(),
            &attendance_event(WebinarInteractions {
                chat_messages: 2,
                questions_asked: 1,
                poll_responses: 0,
                reactions_used: 3,
            }),
        );
        assert_eq!(applied.points, 25);
        assert_eq!(applied.breakdown.engagement_score, 25);
        assert_eq!(applied.breakdown.total, 25);
    }

    #[test]
    fn test_bonus_below_cap_not_clamped() {
        // 1*2 + 0 + 1*3 + 2*1 = 7 -> 15 + 7 = 22
        let applied = apply_event(
            &ScoreBreakdown::default(),
            &attendance_event(WebinarInteractions {
                chat_messages: 1,
                questions_asked: 0,
                poll_responses: 1,
                reactions_used: 2,
            }),
        );
        assert_eq!(applied.points, 22);
    }

    #[test]
    fn test_non_attendance_credits_nothing() {
        let mut e = event(EventCategory::WebinarAttendance);
        e.payload = Some(EventPayload::WebinarAttendance {
            webinar_id: None,
            attended: false,
            join_time: None,
            leave_time: None,
            duration_minutes: Some(3),
            interactions: WebinarInteractions::default(),
        });

        let applied = apply_event(&ScoreBreakdown::default(), &e);
        assert_eq!(applied.points, 0);
        assert_eq!(applied.breakdown.engagement_score, 0);
        // Duration is still reported
        assert_eq!(applied.breakdown.attendance_duration_minutes, Some(3));
    }

    #[test]
    fn test_duration_derived_from_join_leave() {
        let join = Utc::now();
        let leave = join + Duration::seconds(45 * 60 + 20);
        assert_eq!(derive_duration_minutes(None, Some(join), Some(leave)), Some(45));

        // Explicit duration wins
        assert_eq!(derive_duration_minutes(Some(30), Some(join), Some(leave)), Some(30));

        // Leave before join floors at zero
        assert_eq!(derive_duration_minutes(None, Some(leave), Some(join)), Some(0));
    }

    #[test]
    fn test_unknown_category_scores_zero() {
        let applied = apply_event(
            &ScoreBreakdown::default(),
            &event(EventCategory::Unknown("newsletter_open".to_string())),
        );
        assert_eq!(applied.points, 0);
        assert_eq!(applied.breakdown.total, 0);
    }

    #[test]
    fn test_components_accumulate_independently() {
        let mut breakdown = ScoreBreakdown::default();
        for _ in 0..3 {
            breakdown = apply_event(&breakdown, &event(EventCategory::PageVisit)).breakdown;
        }
        breakdown = apply_event(&breakdown, &event(EventCategory::CtaClick)).breakdown;

        assert_eq!(breakdown.page_visit_score, 3);
        assert_eq!(breakdown.cta_click_score, 3);
        assert_eq!(breakdown.total, 6);
    }

    #[test]
    fn test_admin_adjustment_is_signed() {
        let mut e = event(EventCategory::AdminOverride);
        e.payload = Some(EventPayload::AdminOverride {
            tier: None,
            score_adjustment: Some(-4),
            notes: None,
            clear_sticky: false,
        });

        let mut breakdown = ScoreBreakdown::default();
        breakdown.tool_completion_score = 10;
        breakdown.recompute_total();

        let applied = apply_event(&breakdown, &e);
        assert_eq!(applied.points, -4);
        assert_eq!(applied.breakdown.total, 6);
    }

    #[test]
    fn test_admin_adjustment_floors_total_at_zero() {
        let mut e = event(EventCategory::AdminOverride);
        e.payload = Some(EventPayload::AdminOverride {
            tier: None,
            score_adjustment: Some(-100),
            notes: None,
            clear_sticky: false,
        });

        let mut breakdown = ScoreBreakdown::default();
        breakdown.page_visit_score = 5;
        breakdown.recompute_total();

        let applied = apply_event(&breakdown, &e);
        assert_eq!(applied.breakdown.total, 0);
        assert_eq!(applied.points, -5);
    }
}
