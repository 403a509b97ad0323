//! Lead profile rows
//!
//! Row mapping and queries for the `leads` table. Timestamps and UUIDs are
//! stored as RFC 3339 / hyphenated text; the breakdown and metadata are JSON
//! columns.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use lsq_common::model::{LeadProfile, ScoreBreakdown, Tier};
use sqlx::{Executor, Sqlite};
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
struct LeadRow {
    guid: String,
    identity_key: String,
    name: Option<String>,
    phone: Option<String>,
    source: Option<String>,
    tier: String,
    sticky: i64,
    breakdown: String,
    metadata: Option<String>,
    created_at: String,
    last_interaction: Option<String>,
}

impl TryFrom<LeadRow> for LeadProfile {
    type Error = Error;

    fn try_from(row: LeadRow) -> Result<LeadProfile> {
        let lead_id = Uuid::parse_str(&row.guid)
            .map_err(|e| Error::Internal(format!("corrupt lead guid {}: {}", row.guid, e)))?;
        let tier = Tier::parse(&row.tier)
            .ok_or_else(|| Error::Internal(format!("corrupt tier value: {}", row.tier)))?;
        let score_breakdown: ScoreBreakdown = serde_json::from_str(&row.breakdown)
            .map_err(|e| Error::Internal(format!("corrupt breakdown JSON: {}", e)))?;
        let metadata = match row.metadata {
            Some(s) => serde_json::from_str(&s)
                .map_err(|e| Error::Internal(format!("corrupt metadata JSON: {}", e)))?,
            None => serde_json::Value::Null,
        };

        Ok(LeadProfile {
            lead_id,
            identity_key: row.identity_key,
            name: row.name,
            phone: row.phone,
            source: row.source,
            tier,
            sticky: row.sticky != 0,
            score_breakdown,
            metadata,
            created_at: parse_timestamp(&row.created_at)?,
            last_interaction: row
                .last_interaction
                .as_deref()
                .map(parse_timestamp)
                .transpose()?,
        })
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("corrupt timestamp {}: {}", s, e)))
}

/// Fetch a profile by identity key
pub async fn fetch_by_identity<'e, E>(db: E, identity_key: &str) -> Result<Option<LeadProfile>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, LeadRow>("SELECT * FROM leads WHERE identity_key = ?")
        .bind(identity_key)
        .fetch_optional(db)
        .await?;

    row.map(LeadProfile::try_from).transpose()
}

/// Insert a new profile row
pub async fn insert<'e, E>(db: E, profile: &LeadProfile) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO leads
            (guid, identity_key, name, phone, source, tier, sticky,
             breakdown, metadata, created_at, last_interaction)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(profile.lead_id.to_string())
    .bind(&profile.identity_key)
    .bind(&profile.name)
    .bind(&profile.phone)
    .bind(&profile.source)
    .bind(profile.tier.as_str())
    .bind(profile.sticky as i64)
    .bind(breakdown_json(profile)?)
    .bind(metadata_json(profile)?)
    .bind(profile.created_at.to_rfc3339())
    .bind(profile.last_interaction.map(|t| t.to_rfc3339()))
    .execute(db)
    .await?;
    Ok(())
}

/// Update the mutable fields of an existing profile row
pub async fn update<'e, E>(db: E, profile: &LeadProfile) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        UPDATE leads
        SET name = ?, phone = ?, source = ?, tier = ?, sticky = ?,
            breakdown = ?, metadata = ?, last_interaction = ?
        WHERE guid = ?
        "#,
    )
    .bind(&profile.name)
    .bind(&profile.phone)
    .bind(&profile.source)
    .bind(profile.tier.as_str())
    .bind(profile.sticky as i64)
    .bind(breakdown_json(profile)?)
    .bind(metadata_json(profile)?)
    .bind(profile.last_interaction.map(|t| t.to_rfc3339()))
    .bind(profile.lead_id.to_string())
    .execute(db)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("lead {}", profile.lead_id)));
    }
    Ok(())
}

/// Delete a profile row
pub async fn delete<'e, E>(db: E, lead_id: Uuid) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("DELETE FROM leads WHERE guid = ?")
        .bind(lead_id.to_string())
        .execute(db)
        .await?;
    Ok(())
}

fn breakdown_json(profile: &LeadProfile) -> Result<String> {
    serde_json::to_string(&profile.score_breakdown)
        .map_err(|e| Error::Internal(format!("breakdown serialization: {}", e)))
}

fn metadata_json(profile: &LeadProfile) -> Result<Option<String>> {
    if profile.metadata.is_null() {
        return Ok(None);
    }
    serde_json::to_string(&profile.metadata)
        .map(Some)
        .map_err(|e| Error::Internal(format!("metadata serialization: {}", e)))
}
