//! Core domain model for lead scoring
//!
//! Shared by the scoring service and its tests: qualification tiers,
//! score breakdowns, normalized interaction events, and the derived
//! tier-change record consumed by notification dispatch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ========================================
// Qualification Tier
// ========================================

/// Lead qualification tier
///
/// Variant order is the progression order: automatic transitions only ever
/// move rightward (`max(current, computed)`), so `Ord` on this enum is the
/// never-downgrade comparison used by the classifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Anonymous or barely-engaged browser
    #[default]
    Visitor,
    /// Identified lead with some engagement beyond page views
    ColdLead,
    /// Mid-band engagement (score 31-70)
    Candidate,
    /// High-band engagement (score 71+)
    HotLead,
    /// Applied for membership, awaiting approval
    PendingApproval,
    /// Approved soft member (also forced by webinar attendance + score >= 70)
    SoftMember,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Visitor => "visitor",
            Tier::ColdLead => "cold_lead",
            Tier::Candidate => "candidate",
            Tier::HotLead => "hot_lead",
            Tier::PendingApproval => "pending_approval",
            Tier::SoftMember => "soft_member",
        }
    }

    /// Parse from the snake_case wire/storage form
    pub fn parse(s: &str) -> Option<Tier> {
        match s {
            "visitor" => Some(Tier::Visitor),
            "cold_lead" => Some(Tier::ColdLead),
            "candidate" => Some(Tier::Candidate),
            "hot_lead" => Some(Tier::HotLead),
            "pending_approval" => Some(Tier::PendingApproval),
            "soft_member" => Some(Tier::SoftMember),
            _ => None,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ========================================
// Event Categories
// ========================================

/// Closed set of recognized interaction categories
///
/// Unrecognized category strings are NOT rejected at the boundary: they pass
/// through as `Unknown` with zero scoring weight so the log stays complete
/// when new surfaces ship before a weight-table update.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventCategory {
    PageVisit,
    CtaClick,
    ToolCompletion,
    WebinarRegistration,
    WebinarAttendance,
    OfficeVisitBooked,
    MembershipRegistration,
    MembershipApproved,
    AdminOverride,
    Unknown(String),
}

impl EventCategory {
    pub fn as_str(&self) -> &str {
        match self {
            EventCategory::PageVisit => "page_visit",
            EventCategory::CtaClick => "cta_click",
            EventCategory::ToolCompletion => "tool_completion",
            EventCategory::WebinarRegistration => "webinar_registration",
            EventCategory::WebinarAttendance => "webinar_attendance",
            EventCategory::OfficeVisitBooked => "office_visit_booked",
            EventCategory::MembershipRegistration => "membership_registration",
            EventCategory::MembershipApproved => "membership_approved",
            EventCategory::AdminOverride => "admin_override",
            EventCategory::Unknown(s) => s.as_str(),
        }
    }

    /// Whether this category is in the recognized (weighted) set
    pub fn is_known(&self) -> bool {
        !matches!(self, EventCategory::Unknown(_))
    }
}

impl From<String> for EventCategory {
    fn from(s: String) -> Self {
        match s.as_str() {
            "page_visit" => EventCategory::PageVisit,
            "cta_click" => EventCategory::CtaClick,
            "tool_completion" => EventCategory::ToolCompletion,
            "webinar_registration" => EventCategory::WebinarRegistration,
            "webinar_attendance" => EventCategory::WebinarAttendance,
            "office_visit_booked" => EventCategory::OfficeVisitBooked,
            "membership_registration" => EventCategory::MembershipRegistration,
            "membership_approved" => EventCategory::MembershipApproved,
            "admin_override" => EventCategory::AdminOverride,
            _ => EventCategory::Unknown(s),
        }
    }
}

impl From<EventCategory> for String {
    fn from(c: EventCategory) -> Self {
        c.as_str().to_string()
    }
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ========================================
// Score Breakdown
// ========================================

/// Per-component engagement score breakdown
///
/// `total` is maintained as the sum of the seven score components; all
/// mutation goes through the scoring engine, which recomputes it. Automatic
/// components never go negative; `admin_adjustment_score` is signed because
/// admin adjustments are the one operation allowed to reduce `total`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScoreBreakdown {
    pub page_visit_score: i64,
    pub cta_click_score: i64,
    pub tool_completion_score: i64,
    pub webinar_registration_score: i64,
    /// Webinar attendance points (base + capped engagement bonus)
    pub engagement_score: i64,
    pub office_visit_score: i64,
    /// Signed; accumulates admin score adjustments
    pub admin_adjustment_score: i64,
    /// Reporting only; excluded from the component sum
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendance_duration_minutes: Option<i64>,
    pub total: i64,
}

impl ScoreBreakdown {
    /// Sum of the score components (what `total` must always equal)
    pub fn component_sum(&self) -> i64 {
        self.page_visit_score
            + self.cta_click_score
            + self.tool_completion_score
            + self.webinar_registration_score
            + self.engagement_score
            + self.office_visit_score
            + self.admin_adjustment_score
    }

    /// Restore the `total` invariant after component mutation
    pub fn recompute_total(&mut self) {
        self.total = self.component_sum();
    }

    /// Whether the lead has done anything beyond browsing pages
    ///
    /// Drives the visitor/cold_lead sub-split of the low score band.
    pub fn has_engagement_beyond_visits(&self) -> bool {
        self.cta_click_score > 0
            || self.tool_completion_score > 0
            || self.webinar_registration_score > 0
            || self.engagement_score > 0
            || self.office_visit_score > 0
    }

    /// Whether a completed webinar attendance has been credited
    pub fn has_webinar_attendance(&self) -> bool {
        self.engagement_score > 0
    }

    /// Component-wise sum of two breakdowns (session merge)
    ///
    /// Attendance duration keeps the larger of the two values since it is a
    /// last-attendance report, not an accumulator.
    pub fn merged(&self, other: &ScoreBreakdown) -> ScoreBreakdown {
        let mut merged = ScoreBreakdown {
            page_visit_score: self.page_visit_score + other.page_visit_score,
            cta_click_score: self.cta_click_score + other.cta_click_score,
            tool_completion_score: self.tool_completion_score + other.tool_completion_score,
            webinar_registration_score: self.webinar_registration_score
                + other.webinar_registration_score,
            engagement_score: self.engagement_score + other.engagement_score,
            office_visit_score: self.office_visit_score + other.office_visit_score,
            admin_adjustment_score: self.admin_adjustment_score + other.admin_adjustment_score,
            attendance_duration_minutes: match (
                self.attendance_duration_minutes,
                other.attendance_duration_minutes,
            ) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, b) => a.or(b),
            },
            total: 0,
        };
        merged.recompute_total();
        merged
    }
}

// ========================================
// Interaction Events
// ========================================

/// Webinar attendance interaction counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebinarInteractions {
    pub chat_messages: u32,
    pub questions_asked: u32,
    pub poll_responses: u32,
    pub reactions_used: u32,
}

/// Category-specific event payload
///
/// Replaces the source material's ad hoc untyped payload maps with a tagged
/// union validated once at the ingest boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    /// Payload for `webinar_attendance` events
    #[serde(rename_all = "camelCase")]
    WebinarAttendance {
        #[serde(skip_serializing_if = "Option::is_none")]
        webinar_id: Option<String>,
        attended: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        join_time: Option<DateTime<Utc>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        leave_time: Option<DateTime<Utc>>,
        /// Explicit duration wins over join/leave derivation
        #[serde(skip_serializing_if = "Option::is_none")]
        duration_minutes: Option<i64>,
        interactions: WebinarInteractions,
    },
    /// Payload for `admin_override` events
    #[serde(rename_all = "camelCase")]
    AdminOverride {
        #[serde(skip_serializing_if = "Option::is_none")]
        tier: Option<Tier>,
        #[serde(skip_serializing_if = "Option::is_none")]
        score_adjustment: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        notes: Option<String>,
        #[serde(default)]
        clear_sticky: bool,
    },
}

/// A single normalized interaction event
///
/// `event_id` is the caller-supplied idempotency key: a given id is applied
/// to a profile at most once, which makes retries safe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionEvent {
    pub event_id: String,
    pub identity_key: String,
    pub category: EventCategory,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<EventPayload>,
    /// Free-form caller metadata, stored for audit
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

// ========================================
// Lead Profile
// ========================================

/// Durable per-identity engagement record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadProfile {
    pub lead_id: Uuid,
    /// Email, or `session:<id>` for anonymous sessions
    pub identity_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub tier: Tier,
    /// Set by admin override; while set, automatic tier transitions are
    /// computed but not applied
    pub sticky: bool,
    pub score_breakdown: ScoreBreakdown,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_interaction: Option<DateTime<Utc>>,
}

impl LeadProfile {
    /// Empty profile for a newly seen identity key
    pub fn new(identity_key: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            lead_id: Uuid::new_v4(),
            identity_key: identity_key.into(),
            name: None,
            phone: None,
            source: None,
            tier: Tier::Visitor,
            sticky: false,
            score_breakdown: ScoreBreakdown::default(),
            metadata: serde_json::Value::Null,
            created_at: now,
            last_interaction: None,
        }
    }
}

// ========================================
// Tier Change (derived)
// ========================================

/// Emitted on every accepted tier transition; not persisted by this core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierChange {
    pub lead_id: Uuid,
    pub identity_key: String,
    pub from_tier: Tier,
    pub to_tier: Tier,
    pub triggering_event_id: String,
    pub timestamp: DateTime<Utc>,
}

// ========================================
// Tests
// ========================================
