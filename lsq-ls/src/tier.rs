//! Tier classifier
//!
//! Pure tier computation: score-band lookup with an event-mix sub-split,
//! the forced soft-member rule, and the never-downgrade transition applied
//! after each event. Sticky profiles (admin-overridden) keep their tier
//! while automatic transitions are computed but not applied.

use lsq_common::model::{EventCategory, EventPayload, InteractionEvent, ScoreBreakdown, Tier};

/// Lower bound of the candidate band (inclusive)
pub const CANDIDATE_THRESHOLD: i64 = 31;
/// Lower bound of the hot-lead band (inclusive)
pub const HOT_LEAD_THRESHOLD: i64 = 71;
/// Completed webinar attendance plus a total at or above this forces
/// soft_member within the hot-lead band
pub const SOFT_MEMBER_SCORE: i64 = 70;

/// Tier floor implied by a score breakdown
///
/// Within the low band, any engagement beyond page views promotes visitor to
/// cold_lead. Within the high band, a completed webinar attendance forces
/// soft_member even where a pure range lookup would stop at hot_lead.
pub fn tier_from_score(breakdown: &ScoreBreakdown) -> Tier {
    let total = breakdown.total;
    if total >= HOT_LEAD_THRESHOLD {
        if breakdown.has_webinar_attendance() && total >= SOFT_MEMBER_SCORE {
            Tier::SoftMember
        } else {
            Tier::HotLead
        }
    } else if total >= CANDIDATE_THRESHOLD {
        Tier::Candidate
    } else if breakdown.has_engagement_beyond_visits() {
        Tier::ColdLead
    } else {
        Tier::Visitor
    }
}

/// Tier and sticky flag a profile should carry after an event
///
/// Automatic transitions are `max(current, tier_from_score)` and never
/// downgrade. Membership events propose their target state through the same
/// rule. An admin override with an explicit tier wins unconditionally and
/// sets the sticky flag; clearing the flag re-enables automatic
/// classification immediately.
pub fn classify_after_event(
    current: Tier,
    sticky: bool,
    breakdown: &ScoreBreakdown,
    event: &InteractionEvent,
) -> (Tier, bool) {
    if let EventCategory::AdminOverride = event.category {
        return classify_admin(current, sticky, breakdown, event);
    }

    let proposed = match event.category {
        EventCategory::MembershipRegistration => Tier::PendingApproval,
        EventCategory::MembershipApproved => Tier::SoftMember,
        _ => tier_from_score(breakdown),
    };

    if sticky {
        // Computed but not applied until an admin clears the flag
        (current, true)
    } else {
        (current.max(proposed), false)
    }
}

fn classify_admin(
    current: Tier,
    sticky: bool,
    breakdown: &ScoreBreakdown,
    event: &InteractionEvent,
) -> (Tier, bool) {
    let Some(EventPayload::AdminOverride {
        tier, clear_sticky, ..
    }) = &event.payload
    else {
        return (current, sticky);
    };

    if let Some(target) = tier {
        // Unconditional set; automatic transitions freeze until cleared
        return (*target, true);
    }

    if *clear_sticky {
        // Flag cleared: automatic classification resumes right away
        return (current.max(tier_from_score(breakdown)), false);
    }

    // Score-adjustment-only override keeps the current tier policy
    if sticky {
        (current, true)
    } else {
        (current.max(tier_from_score(breakdown)), false)
    }
}

/// Tier and sticky flag for a merged profile
///
/// Recomputed from the merged breakdown; a sticky side wins outright, and
/// when both sides are sticky the target profile's tier is kept.
pub fn merged_tier(
    target: (Tier, bool),
    source: (Tier, bool),
    merged: &ScoreBreakdown,
) -> (Tier, bool) {
    match (target, source) {
        ((tier, true), _) => (tier, true),
        (_, (tier, true)) => (tier, true),
        _ => (tier_from_score(merged), false),
    }
}
