//! Persistence adapter for song generation records
//!
//! The only place that mutates rows in the `songs` table. Variant writes go
//! through a merge that never reduces informational completeness, and status
//! writes refuse transitions out of a terminal state, so a transient or
//! partial provider response can never regress what a caller has already
//! observed.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use sqlx::{Row, SqlitePool};
use tunecraft_common::db::models::{SongRecord, SongStatus, VariantSnapshot};
use tunecraft_common::{Error, Result};

/// Record store adapter over the `songs` table
#[derive(Clone)]
pub struct SongStore {
    db: SqlitePool,
}

impl SongStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Read a job record by id
    pub async fn read_record(&self, id: i64) -> Result<Option<SongRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, provider_task_id, status, variants, error_message,
                   status_checked_at, last_status_check, status_check_count
            FROM songs
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        row.map(row_to_record).transpose()
    }

    /// Insert a fresh record, returning its id
    pub async fn insert_record(&self) -> Result<i64> {
        let result = sqlx::query("INSERT INTO songs DEFAULT VALUES")
            .execute(&self.db)
            .await?;
        Ok(result.last_insert_rowid())
    }

    /// Attach the provider task id to a record. Write-once: a second attempt
    /// is refused and reported as `false`.
    pub async fn set_provider_task_id(&self, id: i64, task_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE songs
            SET provider_task_id = ?, updated_at = CURRENT_TIMESTAMP
            WHERE id = ? AND provider_task_id IS NULL
            "#,
        )
        .bind(task_id)
        .bind(id)
        .execute(&self.db)
        .await?;

        let written = result.rows_affected() == 1;
        if !written {
            tracing::warn!(
                song_id = id,
                task_id = %task_id,
                "Refused provider task id write (already set or record missing)"
            );
        }
        Ok(written)
    }

    /// Merge candidate variants into the stored variant list and persist.
    ///
    /// Candidates match stored variants by id; unmatched candidates are
    /// appended in provider order. Returns the updated record.
    pub async fn write_merged_variants(
        &self,
        id: i64,
        candidates: &[VariantSnapshot],
    ) -> Result<SongRecord> {
        let mut record = self
            .read_record(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("song {id}")))?;

        let merged = merge_variants(&record.variants, candidates);
        let variants_json = serde_json::to_string(&merged)?;

        sqlx::query("UPDATE songs SET variants = ?, updated_at = CURRENT_TIMESTAMP WHERE id = ?")
            .bind(&variants_json)
            .bind(id)
            .execute(&self.db)
            .await?;

        tracing::debug!(
            song_id = id,
            candidates = candidates.len(),
            merged = merged.len(),
            "Merged variant snapshots"
        );

        record.variants = merged;
        Ok(record)
    }

    /// Write the job status with server-side timestamps.
    ///
    /// The WHERE clause enforces monotonicity: a row that already reached
    /// `COMPLETED` or `FAILED` refuses any non-terminal status. A refused
    /// write is logged and treated as a no-op, not an error.
    pub async fn write_status(
        &self,
        id: i64,
        status: SongStatus,
        error_message: Option<&str>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE songs
            SET status = ?,
                error_message = ?,
                status_checked_at = CURRENT_TIMESTAMP,
                last_status_check = CURRENT_TIMESTAMP,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
              AND NOT (status IN ('COMPLETED', 'FAILED')
                       AND ? NOT IN ('COMPLETED', 'FAILED'))
            "#,
        )
        .bind(status.as_str())
        .bind(error_message)
        .bind(id)
        .bind(status.as_str())
        .execute(&self.db)
        .await?;

        if result.rows_affected() == 0 {
            tracing::warn!(
                song_id = id,
                status = %status,
                "Refused status write (record missing or already terminal)"
            );
        } else {
            tracing::debug!(song_id = id, status = %status, "Persisted job status");
        }

        Ok(())
    }

    /// Bump the status-check counter. Observability only.
    pub async fn increment_status_check_count(&self, id: i64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE songs
            SET status_check_count = status_check_count + 1,
                last_status_check = CURRENT_TIMESTAMP
            WHERE id = ?
            "#,
        )
        .bind(id)
        .execute(&self.db)
        .await?;
        Ok(())
    }
}

/// Merge candidate variants into the stored list by variant id.
///
/// Per field, a candidate value only overwrites the stored one when it does
/// not reduce informational completeness: a non-empty URL is never replaced
/// by an empty one, so a flaky poll that drops a previously observed URL
/// cannot demote a variant.
pub fn merge_variants(
    stored: &[VariantSnapshot],
    candidates: &[VariantSnapshot],
) -> Vec<VariantSnapshot> {
    let mut merged: Vec<VariantSnapshot> = stored.to_vec();

    for candidate in candidates {
        match merged.iter_mut().find(|v| v.id == candidate.id) {
            Some(existing) => merge_into(existing, candidate),
            None => merged.push(candidate.clone()),
        }
    }

    merged
}

fn merge_into(existing: &mut VariantSnapshot, candidate: &VariantSnapshot) {
    merge_field(&mut existing.audio_url, &candidate.audio_url);
    merge_field(&mut existing.source_audio_url, &candidate.source_audio_url);
    merge_field(&mut existing.stream_audio_url, &candidate.stream_audio_url);
    merge_field(
        &mut existing.source_stream_audio_url,
        &candidate.source_stream_audio_url,
    );
    merge_field(&mut existing.image_url, &candidate.image_url);
    merge_field(&mut existing.title, &candidate.title);
    merge_field(&mut existing.prompt, &candidate.prompt);
    merge_field(&mut existing.tags, &candidate.tags);
    merge_field(&mut existing.model_name, &candidate.model_name);
    merge_field(&mut existing.create_time, &candidate.create_time);
    if candidate.duration > 0.0 {
        existing.duration = candidate.duration;
    }
}

fn merge_field(existing: &mut String, candidate: &str) {
    if !candidate.is_empty() {
        *existing = candidate.to_string();
    }
}

fn row_to_record(row: sqlx::sqlite::SqliteRow) -> Result<SongRecord> {
    let status_text: String = row.get("status");
    let status = SongStatus::parse(&status_text)
        .ok_or_else(|| Error::Internal(format!("Unknown status in songs table: {status_text}")))?;

    let variants_json: String = row.get("variants");
    let variants: Vec<VariantSnapshot> = serde_json::from_str(&variants_json)?;

    Ok(SongRecord {
        id: row.get("id"),
        provider_task_id: row.get("provider_task_id"),
        status,
        variants,
        error_message: row.get("error_message"),
        status_checked_at: parse_timestamp(row.get("status_checked_at")),
        last_status_check: parse_timestamp(row.get("last_status_check")),
        status_check_count: row.get("status_check_count"),
    })
}

/// Timestamps arrive either as RFC3339 (written by code) or as SQLite's
/// `CURRENT_TIMESTAMP` format; unparseable values read as absent.
fn parse_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    let text = value?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|naive| Utc.from_utc_datetime(&naive))
        })
}
