//! HTTP request handlers
//!
//! REST endpoints for event ingest, profile queries, and admin edits.
//! Ingest callers only ever see accept/duplicate/validation-error/retryable;
//! scoring and tier internals are never exposed as raw errors.

use crate::api::server::AppContext;
use crate::db::interactions::{self, LoggedInteraction};
use crate::error::Error;
use crate::ingest;
use crate::pagination::calculate_pagination;
use crate::store::ApplyOutcome;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use lsq_common::model::{EventCategory, EventPayload, InteractionEvent, LeadProfile, Tier};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;
use uuid::Uuid;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
    #[serde(rename = "eventsApplied")]
    events_applied: u64,
    duplicates: u64,
    #[serde(rename = "tierChanges")]
    tier_changes: u64,
}

/// Error body shape shared by all endpoints
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier
    pub error: String,
    /// Human-readable error message
    pub message: String,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    accepted: bool,
    duplicate: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebinarIngestResponse {
    accepted: bool,
    duplicate: bool,
    /// Points credited for this attendance (base + capped bonus)
    engagement_score: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    attendance_duration: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct InteractionsQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    /// 1-indexed page; `cursor` is accepted as an alias
    #[serde(alias = "cursor")]
    pub page: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionsResponse {
    interactions: Vec<LoggedInteraction>,
    page: i64,
    total_pages: i64,
    total_results: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminPatchRequest {
    /// Optional idempotency key; synthesized when absent
    #[serde(alias = "event_id")]
    pub event_id: Option<String>,
    pub tier: Option<Tier>,
    #[serde(alias = "score_adjustment")]
    pub score_adjustment: Option<i64>,
    pub notes: Option<String>,
    #[serde(default, alias = "clear_sticky")]
    pub clear_sticky: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRequest {
    #[serde(alias = "source_key", alias = "sessionKey", alias = "session_key")]
    pub source_key: String,
    #[serde(alias = "target_key")]
    pub target_key: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayResponse {
    replayed: LeadProfile,
    /// Whether the fold matches the live profile's breakdown and tier
    consistent: bool,
}

// ============================================================================
// Error Mapping
// ============================================================================

/// Map a service error onto the HTTP status + body callers see
fn error_response(err: Error) -> (StatusCode, Json<ErrorResponse>) {
    let (status, kind, details) = match &err {
        Error::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error", None),
        Error::NotFound(_) => (StatusCode::NOT_FOUND, "not_found", None),
        Error::LockTimeout(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "lock_timeout",
            Some(serde_json::json!({ "retryable": true })),
        ),
        Error::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "persistence_failure", None),
        Error::Http(_) | Error::Internal(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
        }
    };

    if status.is_server_error() {
        error!("Request failed: {}", err);
    }

    (
        status,
        Json(ErrorResponse {
            error: kind.to_string(),
            message: err.to_string(),
            details,
        }),
    )
}

type HandlerResult<T> = Result<T, (StatusCode, Json<ErrorResponse>)>;

// ============================================================================
// Health Endpoint
// ============================================================================

/// GET /health - Health check endpoint
pub async fn health(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "lead_scoring".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        events_applied: ctx.state.events_applied(),
        duplicates: ctx.state.duplicates(),
        tier_changes: ctx.state.tier_changes(),
    })
}

// ============================================================================
// Ingest Endpoints
// ============================================================================

/// POST /interactions - Ingest a raw interaction event
pub async fn ingest(
    State(ctx): State<AppContext>,
    Json(raw): Json<Value>,
) -> HandlerResult<Json<IngestResponse>> {
    let event = ingest::normalize(&raw).map_err(error_response)?;
    let outcome = apply_and_count(&ctx, event).await?;

    Ok(Json(IngestResponse {
        accepted: true,
        duplicate: outcome.duplicate,
    }))
}

/// POST /interactions/webinar - Specialized webinar attendance ingest
///
/// Same contract as the generic endpoint, but the response carries the
/// computed attendance credit and duration for the webinar platform's
/// confirmation flow.
pub async fn ingest_webinar(
    State(ctx): State<AppContext>,
    Json(mut raw): Json<Value>,
) -> HandlerResult<Json<WebinarIngestResponse>> {
    let event_type = raw.get("type").and_then(Value::as_str).map(String::from);
    match event_type.as_deref() {
        None => {
            if let Some(obj) = raw.as_object_mut() {
                obj.insert(
                    "type".to_string(),
                    Value::String("webinar_attendance".to_string()),
                );
            }
        }
        Some("webinar_attendance") => {}
        Some(other) => {
            return Err(error_response(Error::Validation(format!(
                "webinar ingest cannot carry event type {}",
                other
            ))));
        }
    }

    let event = ingest::normalize(&raw).map_err(error_response)?;
    let outcome = apply_and_count(&ctx, event).await?;

    Ok(Json(WebinarIngestResponse {
        accepted: true,
        duplicate: outcome.duplicate,
        engagement_score: outcome.points,
        attendance_duration: outcome.profile.score_breakdown.attendance_duration_minutes,
    }))
}

async fn apply_and_count(ctx: &AppContext, event: InteractionEvent) -> HandlerResult<ApplyOutcome> {
    let outcome = ctx
        .store
        .apply_event(event)
        .await
        .map_err(error_response)?;

    if outcome.duplicate {
        ctx.state.record_duplicate();
    } else {
        ctx.state.record_applied();
    }
    if outcome.tier_change.is_some() {
        ctx.state.record_tier_change();
    }
    Ok(outcome)
}

// ============================================================================
// Profile Query Endpoints
// ============================================================================

/// GET /profiles/:identity_key - Profile with score breakdown and tier
pub async fn get_profile(
    State(ctx): State<AppContext>,
    Path(identity_key): Path<String>,
) -> HandlerResult<Json<LeadProfile>> {
    let profile = ctx
        .store
        .get(&identity_key)
        .await
        .map_err(error_response)?
        .ok_or_else(|| error_response(Error::NotFound(format!("profile {}", identity_key))))?;

    Ok(Json(profile))
}

/// GET /profiles/:identity_key/interactions - Paginated interaction log
pub async fn list_interactions(
    State(ctx): State<AppContext>,
    Path(identity_key): Path<String>,
    Query(query): Query<InteractionsQuery>,
) -> HandlerResult<Json<InteractionsResponse>> {
    let profile = ctx
        .store
        .get(&identity_key)
        .await
        .map_err(error_response)?
        .ok_or_else(|| error_response(Error::NotFound(format!("profile {}", identity_key))))?;

    let from = parse_query_timestamp(query.from.as_deref(), "from").map_err(error_response)?;
    let to = parse_query_timestamp(query.to.as_deref(), "to").map_err(error_response)?;

    let total_results = interactions::count_range(&ctx.db_pool, profile.lead_id, from, to)
        .await
        .map_err(error_response)?;
    let pagination = calculate_pagination(total_results, query.page.unwrap_or(1));
    let page = interactions::fetch_range(&ctx.db_pool, profile.lead_id, from, to, pagination)
        .await
        .map_err(error_response)?;

    Ok(Json(InteractionsResponse {
        interactions: page,
        page: pagination.page,
        total_pages: pagination.total_pages,
        total_results,
    }))
}

/// GET /profiles/:identity_key/replay - Replay diagnostics
///
/// Folds the full ordered log from an empty profile and reports whether the
/// result matches live state.
pub async fn replay_profile(
    State(ctx): State<AppContext>,
    Path(identity_key): Path<String>,
) -> HandlerResult<Json<ReplayResponse>> {
    let live = ctx
        .store
        .get(&identity_key)
        .await
        .map_err(error_response)?
        .ok_or_else(|| error_response(Error::NotFound(format!("profile {}", identity_key))))?;

    let replayed = ctx
        .store
        .replay(&identity_key)
        .await
        .map_err(error_response)?;

    let consistent =
        replayed.score_breakdown == live.score_breakdown && replayed.tier == live.tier;

    Ok(Json(ReplayResponse {
        replayed,
        consistent,
    }))
}

fn parse_query_timestamp(
    value: Option<&str>,
    name: &str,
) -> Result<Option<DateTime<Utc>>, Error> {
    value
        .map(|s| {
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|_| Error::Validation(format!("invalid {} timestamp: {}", name, s)))
        })
        .transpose()
}

// ============================================================================
// Admin Endpoints
// ============================================================================

/// PATCH /profiles/:identity_key - Admin override
///
/// Always recorded as an `admin_override` interaction so manual edits show up
/// in the audit log like any other event.
pub async fn patch_profile(
    State(ctx): State<AppContext>,
    Path(identity_key): Path<String>,
    Json(req): Json<AdminPatchRequest>,
) -> HandlerResult<Json<LeadProfile>> {
    if req.tier.is_none()
        && req.score_adjustment.is_none()
        && req.notes.is_none()
        && !req.clear_sticky
    {
        return Err(error_response(Error::Validation(
            "admin override must set tier, scoreAdjustment, notes, or clearSticky".to_string(),
        )));
    }

    let event = InteractionEvent {
        event_id: req
            .event_id
            .unwrap_or_else(|| format!("admin:{}", Uuid::new_v4())),
        identity_key,
        category: EventCategory::AdminOverride,
        timestamp: Utc::now(),
        payload: Some(EventPayload::AdminOverride {
            tier: req.tier,
            score_adjustment: req.score_adjustment,
            notes: req.notes,
            clear_sticky: req.clear_sticky,
        }),
        metadata: Value::Null,
    };

    let outcome = apply_and_count(&ctx, event).await?;
    Ok(Json(outcome.profile))
}

/// DELETE /profiles/:identity_key - Explicit admin/GDPR delete
pub async fn delete_profile(
    State(ctx): State<AppContext>,
    Path(identity_key): Path<String>,
    body: Option<Json<DeleteRequest>>,
) -> HandlerResult<StatusCode> {
    let reason = body.and_then(|Json(req)| req.reason);

    ctx.store
        .delete(&identity_key, reason)
        .await
        .map_err(error_response)?;

    Ok(StatusCode::NO_CONTENT)
}

/// POST /profiles/merge - Merge a session profile into an identified profile
pub async fn merge_profiles(
    State(ctx): State<AppContext>,
    Json(req): Json<MergeRequest>,
) -> HandlerResult<Json<LeadProfile>> {
    let merged = ctx
        .store
        .merge(&req.source_key, &req.target_key)
        .await
        .map_err(error_response)?;

    Ok(Json(merged))
}
