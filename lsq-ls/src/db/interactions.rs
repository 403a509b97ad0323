//! Interaction log rows
//!
//! The append-only, idempotent event log and source of truth for replay.
//! Append is `INSERT OR IGNORE` keyed on `(lead_id, event_id)`: re-delivering
//! an event id is a silent no-op, which is what makes caller retries safe.

use crate::error::{Error, Result};
use crate::pagination::Pagination;
use chrono::{DateTime, Utc};
use lsq_common::model::{EventCategory, EventPayload, InteractionEvent};
use serde::Serialize;
use sqlx::{Executor, Sqlite};
use uuid::Uuid;

/// One logged interaction, as returned by queries
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggedInteraction {
    pub event_id: String,
    pub category: String,
    pub timestamp: DateTime<Utc>,
    /// Points credited when the event was applied
    pub points: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<EventPayload>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct InteractionRow {
    event_id: String,
    category: String,
    timestamp: String,
    points: i64,
    payload: Option<String>,
}

impl TryFrom<InteractionRow> for LoggedInteraction {
    type Error = Error;

    fn try_from(row: InteractionRow) -> Result<LoggedInteraction> {
        let timestamp = DateTime::parse_from_rfc3339(&row.timestamp)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| Error::Internal(format!("corrupt timestamp {}: {}", row.timestamp, e)))?;
        let payload = row
            .payload
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| Error::Internal(format!("corrupt payload JSON: {}", e)))?;

        Ok(LoggedInteraction {
            event_id: row.event_id,
            category: row.category,
            timestamp,
            points: row.points,
            payload,
        })
    }
}

/// Whether an event id has already been applied to this lead
pub async fn exists<'e, E>(db: E, lead_id: Uuid, event_id: &str) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM interactions WHERE lead_id = ? AND event_id = ?")
            .bind(lead_id.to_string())
            .bind(event_id)
            .fetch_one(db)
            .await?;
    Ok(count > 0)
}

/// Idempotent append
///
/// Returns `false` without error when the event id is already present.
pub async fn append<'e, E>(
    db: E,
    lead_id: Uuid,
    event: &InteractionEvent,
    points: i64,
) -> Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let payload = event
        .payload
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| Error::Internal(format!("payload serialization: {}", e)))?;

    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO interactions
            (lead_id, event_id, category, timestamp, points, payload)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(lead_id.to_string())
    .bind(&event.event_id)
    .bind(event.category.as_str())
    .bind(event.timestamp.to_rfc3339())
    .bind(points)
    .bind(payload)
    .execute(db)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Full log for a lead in application (append) order, for replay
pub async fn fetch_ordered<'e, E>(
    db: E,
    lead_id: Uuid,
    identity_key: &str,
) -> Result<Vec<InteractionEvent>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, InteractionRow>(
        r#"
        SELECT event_id, category, timestamp, points, payload
        FROM interactions WHERE lead_id = ? ORDER BY rowid
        "#,
    )
    .bind(lead_id.to_string())
    .fetch_all(db)
    .await?;

    rows.into_iter()
        .map(|row| {
            let logged = LoggedInteraction::try_from(row)?;
            Ok(InteractionEvent {
                event_id: logged.event_id,
                identity_key: identity_key.to_string(),
                category: EventCategory::from(logged.category),
                timestamp: logged.timestamp,
                payload: logged.payload,
                metadata: serde_json::Value::Null,
            })
        })
        .collect()
}

/// Count of log entries within an optional time window
pub async fn count_range<'e, E>(
    db: E,
    lead_id: Uuid,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
) -> Result<i64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM interactions
        WHERE lead_id = ?
          AND (? IS NULL OR timestamp >= ?)
          AND (? IS NULL OR timestamp <= ?)
        "#,
    )
    .bind(lead_id.to_string())
    .bind(from.map(|t| t.to_rfc3339()))
    .bind(from.map(|t| t.to_rfc3339()))
    .bind(to.map(|t| t.to_rfc3339()))
    .bind(to.map(|t| t.to_rfc3339()))
    .fetch_one(db)
    .await?;
    Ok(count)
}

/// Page of log entries within an optional time window, newest first
pub async fn fetch_range<'e, E>(
    db: E,
    lead_id: Uuid,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
    pagination: Pagination,
) -> Result<Vec<LoggedInteraction>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query_as::<_, InteractionRow>(
        r#"
        SELECT event_id, category, timestamp, points, payload
        FROM interactions
        WHERE lead_id = ?
          AND (? IS NULL OR timestamp >= ?)
          AND (? IS NULL OR timestamp <= ?)
        ORDER BY timestamp DESC, rowid DESC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(lead_id.to_string())
    .bind(from.map(|t| t.to_rfc3339()))
    .bind(from.map(|t| t.to_rfc3339()))
    .bind(to.map(|t| t.to_rfc3339()))
    .bind(to.map(|t| t.to_rfc3339()))
    .bind(crate::pagination::PAGE_SIZE)
    .bind(pagination.offset)
    .fetch_all(db)
    .await?;

    rows.into_iter().map(LoggedInteraction::try_from).collect()
}

/// Move the source lead's log entries to the target, dropping duplicates
///
/// Entries whose `event_id` already exists under the target are deleted
/// rather than moved (log concatenation deduplicated by event id).
pub async fn reassign_deduplicated(
    conn: &mut sqlx::SqliteConnection,
    source: Uuid,
    target: Uuid,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE interactions SET lead_id = ?
        WHERE lead_id = ?
          AND event_id NOT IN (SELECT event_id FROM interactions WHERE lead_id = ?)
        "#,
    )
    .bind(target.to_string())
    .bind(source.to_string())
    .bind(target.to_string())
    .execute(&mut *conn)
    .await?;

    sqlx::query("DELETE FROM interactions WHERE lead_id = ?")
        .bind(source.to_string())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Remove a lead's entire log (explicit admin/GDPR delete only)
pub async fn delete_for_lead<'e, E>(db: E, lead_id: Uuid) -> Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("DELETE FROM interactions WHERE lead_id = ?")
        .bind(lead_id.to_string())
        .execute(db)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagination::calculate_pagination;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::SqlitePool;

    async fn test_pool() -> SqlitePool {
        // Single connection: each sqlite::memory: connection is its own db
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        lsq_common::db::create_tables(&pool).await.unwrap();
        pool
    }

    fn event(id: &str) -> InteractionEvent {
        InteractionEvent {
            event_id: id.to_string(),
            identity_key: "ada@example.com".to_string(),
            category: EventCategory::PageVisit,
            timestamp: Utc::now(),
            payload: None,
            metadata: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn test_append_is_idempotent() {
        let pool = test_pool().await;
        let lead_id = Uuid::new_v4();

        assert!(append(&pool, lead_id, &event("evt-1"), 1).await.unwrap());
        assert!(!append(&pool, lead_id, &event("evt-1"), 1).await.unwrap());

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM interactions")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_same_event_id_for_different_leads() {
        let pool = test_pool().await;

        // event_id uniqueness is per lead, not global
        assert!(append(&pool, Uuid::new_v4(), &event("evt-1"), 1).await.unwrap());
        assert!(append(&pool, Uuid::new_v4(), &event("evt-1"), 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_fetch_ordered_preserves_append_order() {
        let pool = test_pool().await;
        let lead_id = Uuid::new_v4();

        // Append out of timestamp order
        let mut late = event("evt-late");
        late.timestamp = Utc::now();
        let mut early = event("evt-early");
        early.timestamp = late.timestamp - chrono::Duration::hours(1);

        append(&pool, lead_id, &late, 1).await.unwrap();
        append(&pool, lead_id, &early, 1).await.unwrap();

        let events = fetch_ordered(&pool, lead_id, "ada@example.com").await.unwrap();
        assert_eq!(events[0].event_id, "evt-late");
        assert_eq!(events[1].event_id, "evt-early");
    }

    #[tokio::test]
    async fn test_reassign_deduplicates() {
        let pool = test_pool().await;
        let source = Uuid::new_v4();
        let target = Uuid::new_v4();

        append(&pool, target, &event("shared"), 1).await.unwrap();
        append(&pool, source, &event("shared"), 1).await.unwrap();
        append(&pool, source, &event("only-source"), 1).await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        reassign_deduplicated(&mut conn, source, target).await.unwrap();
        drop(conn);

        let remaining = fetch_ordered(&pool, target, "ada@example.com").await.unwrap();
        assert_eq!(remaining.len(), 2);

        let source_left: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM interactions WHERE lead_id = ?")
                .bind(source.to_string())
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(source_left, 0);
    }

    #[tokio::test]
    async fn test_range_query_filters_by_window() {
        let pool = test_pool().await;
        let lead_id = Uuid::new_v4();
        let now = Utc::now();

        let mut old = event("evt-old");
        old.timestamp = now - chrono::Duration::days(7);
        let mut recent = event("evt-recent");
        recent.timestamp = now;

        append(&pool, lead_id, &old, 1).await.unwrap();
        append(&pool, lead_id, &recent, 1).await.unwrap();

        let from = Some(now - chrono::Duration::days(1));
        let total = count_range(&pool, lead_id, from, None).await.unwrap();
        assert_eq!(total, 1);

        let page = fetch_range(&pool, lead_id, from, None, calculate_pagination(total, 1))
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].event_id, "evt-recent");
    }
}
