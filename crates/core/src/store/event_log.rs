use sqlx::SqlitePool;
use uuid::Uuid;

use crate::types::{EventRecord, EventType};

/// Row type for sqlx deserialization from the `event_log` table.
#[derive(sqlx::FromRow)]
struct EventRow {
    id: String,
    timestamp: chrono::DateTime<chrono::Utc>,
    event_type: String,
    detail: Option<String>,
}

impl EventRow {
    fn into_record(self) -> Option<EventRecord> {
        let Some(event_type) = EventType::from_db(&self.event_type) else {
            tracing::warn!(event_type = %self.event_type, "skipping event row with unknown type");
            return None;
        };
        Some(EventRecord {
            id: Uuid::parse_str(&self.id).unwrap_or_else(|_| Uuid::nil()),
            timestamp: self.timestamp,
            event_type,
            detail: self.detail,
        })
    }
}

/// Append one record. Records are immutable once written.
pub async fn append(pool: &SqlitePool, record: &EventRecord) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO event_log (id, timestamp, event_type, detail) VALUES (?1, ?2, ?3, ?4)")
        .bind(record.id.to_string())
        .bind(record.timestamp)
        .bind(record.event_type.as_db_str())
        .bind(&record.detail)
        .execute(pool)
        .await?;
    Ok(())
}

/// All records, newest first. Reads the store at call time; nothing is cached.
pub async fn list(pool: &SqlitePool) -> Result<Vec<EventRecord>, sqlx::Error> {
    let rows: Vec<EventRow> = sqlx::query_as(
        "SELECT id, timestamp, event_type, detail FROM event_log ORDER BY timestamp DESC",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().filter_map(EventRow::into_record).collect())
}

/// The newest `limit` records, newest first.
pub async fn list_recent(pool: &SqlitePool, limit: i64) -> Result<Vec<EventRecord>, sqlx::Error> {
    let rows: Vec<EventRow> = sqlx::query_as(
        "SELECT id, timestamp, event_type, detail FROM event_log
         ORDER BY timestamp DESC LIMIT ?1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().filter_map(EventRow::into_record).collect())
}
