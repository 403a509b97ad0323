//! Event ingestor
//!
//! Boundary validation and normalization. Raw events arrive from several
//! surfaces (client beacons, webhook callbacks, admin UI) with inconsistent
//! field spellings: camelCase and snake_case, nested or flattened webinar
//! interaction counts, RFC 3339 or epoch-millisecond timestamps. Everything
//! is normalized here, once, into the canonical `InteractionEvent`; nothing
//! downstream looks at raw JSON again.
//!
//! Unrecognized event types are NOT rejected: they normalize to a zero-weight
//! category so the log stays complete ahead of weight-table updates.

use crate::error::{Error, Result};
use chrono::{DateTime, TimeZone, Utc};
use lsq_common::model::{
    EventCategory, EventPayload, InteractionEvent, Tier, WebinarInteractions,
};
use serde_json::Value;

/// Normalize a raw event map into the canonical event shape
///
/// Requires `eventId`, an identity (`identityKey`, `email`, or `sessionId`),
/// `type`, and `timestamp`; anything missing or malformed is a validation
/// error, rejected before it ever reaches the interaction log.
pub fn normalize(raw: &Value) -> Result<InteractionEvent> {
    let obj = raw
        .as_object()
        .ok_or_else(|| Error::Validation("event body must be a JSON object".to_string()))?;
    if obj.is_empty() {
        return Err(Error::Validation("event body is empty".to_string()));
    }

    let event_id = required_str(raw, &["eventId", "event_id"], "eventId")?;
    let identity_key = extract_identity(raw)?;
    let category_str = required_str(raw, &["type", "eventType", "event_type"], "type")?;
    let timestamp = parse_timestamp(
        get_field(raw, &["timestamp", "occurredAt", "occurred_at"])
            .ok_or_else(|| Error::Validation("missing required field: timestamp".to_string()))?,
    )?;

    let category = EventCategory::from(category_str.clone());
    let payload = match category {
        EventCategory::WebinarAttendance => Some(normalize_attendance(raw)?),
        EventCategory::AdminOverride => Some(normalize_admin(raw)?),
        _ => None,
    };

    Ok(InteractionEvent {
        event_id,
        identity_key,
        category,
        timestamp,
        payload,
        metadata: get_field(raw, &["metadata"]).cloned().unwrap_or(Value::Null),
    })
}

/// Identity resolution: an explicit identity key or email wins; a bare
/// session id becomes a `session:`-prefixed key so anonymous profiles are
/// distinguishable until merged.
fn extract_identity(raw: &Value) -> Result<String> {
    if let Ok(key) = required_str(raw, &["identityKey", "identity_key", "email"], "identityKey") {
        return Ok(key);
    }
    if let Ok(session) = required_str(raw, &["sessionId", "session_id"], "sessionId") {
        return Ok(format!("session:{}", session));
    }
    Err(Error::Validation(
        "missing required field: identityKey or sessionId".to_string(),
    ))
}

fn normalize_attendance(raw: &Value) -> Result<EventPayload> {
    let interactions = match get_field(raw, &["interactions"]) {
        Some(nested) => parse_interactions(nested)?,
        // Some callers flatten the counts to the top level
        None => parse_interactions(raw)?,
    };

    let join_time = get_field(raw, &["joinTime", "join_time"])
        .map(parse_timestamp)
        .transpose()?;
    let leave_time = get_field(raw, &["leaveTime", "leave_time"])
        .map(parse_timestamp)
        .transpose()?;

    Ok(EventPayload::WebinarAttendance {
        webinar_id: opt_str(raw, &["webinarId", "webinar_id"]),
        attended: get_field(raw, &["attended"])
            .and_then(Value::as_bool)
            .unwrap_or(true),
        join_time,
        leave_time,
        duration_minutes: opt_i64(raw, &["durationMinutes", "duration_minutes", "duration"]),
        interactions,
    })
}

fn parse_interactions(value: &Value) -> Result<WebinarInteractions> {
    let count = |names: &[&str]| -> Result<u32> {
        match get_field(value, names) {
            None | Some(Value::Null) => Ok(0),
            Some(v) => v
                .as_u64()
                .map(|n| n as u32)
                .ok_or_else(|| {
                    Error::Validation(format!("interaction count {} must be a non-negative integer", names[0]))
                }),
        }
    };

    Ok(WebinarInteractions {
        chat_messages: count(&["chatMessages", "chat_messages"])?,
        questions_asked: count(&["questionsAsked", "questions_asked"])?,
        poll_responses: count(&["pollResponses", "poll_responses"])?,
        reactions_used: count(&["reactionsUsed", "reactions_used"])?,
    })
}

fn normalize_admin(raw: &Value) -> Result<EventPayload> {
    let tier = match opt_str(raw, &["tier"]) {
        Some(s) => Some(
            Tier::parse(&s).ok_or_else(|| Error::Validation(format!("unknown tier: {}", s)))?,
        ),
        None => None,
    };

    Ok(EventPayload::AdminOverride {
        tier,
        score_adjustment: opt_i64(raw, &["scoreAdjustment", "score_adjustment"]),
        notes: opt_str(raw, &["notes"]),
        clear_sticky: get_field(raw, &["clearSticky", "clear_sticky"])
            .and_then(Value::as_bool)
            .unwrap_or(false),
    })
}

/// Timestamps arrive as RFC 3339 strings or epoch milliseconds
fn parse_timestamp(value: &Value) -> Result<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| Error::Validation(format!("invalid timestamp: {}", s))),
        Value::Number(n) => {
            let millis = n
                .as_i64()
                .ok_or_else(|| Error::Validation(format!("invalid timestamp: {}", n)))?;
            Utc.timestamp_millis_opt(millis)
                .single()
                .ok_or_else(|| Error::Validation(format!("timestamp out of range: {}", millis)))
        }
        other => Err(Error::Validation(format!(
            "timestamp must be a string or number, got: {}",
            other
        ))),
    }
}

fn get_field<'a>(raw: &'a Value, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| raw.get(name))
}

fn required_str(raw: &Value, names: &[&str], canonical: &str) -> Result<String> {
    match get_field(raw, names) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::Null) | None => Err(Error::Validation(format!(
            "missing required field: {}",
            canonical
        ))),
        Some(_) => Err(Error::Validation(format!(
            "field {} must be a non-empty string",
            canonical
        ))),
    }
}

fn opt_str(raw: &Value, names: &[&str]) -> Option<String> {
    get_field(raw, names)
        .and_then(Value::as_str)
        .map(String::from)
}

fn opt_i64(raw: &Value, names: &[&str]) -> Option<i64> {
    get_field(raw, names).and_then(Value::as_i64)
}
