use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, parse_kind, parse_optional_datetime, to_i64, to_u32},
};
use crate::models::StoredInterval;

fn row_to_interval(row: &Row) -> Result<StoredInterval> {
    let position: i64 = row.get("position")?;
    let kind: String = row.get("kind")?;
    let started_at: String = row.get("started_at")?;
    let ended_at: Option<String> = row.get("ended_at")?;
    let duration_secs: i64 = row.get("duration_secs")?;

    Ok(StoredInterval {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        position: to_u32(position, "position")? as usize,
        kind: parse_kind(&kind)?,
        started_at: parse_datetime(&started_at, "started_at")?,
        ended_at: parse_optional_datetime(ended_at, "ended_at")?,
        duration_secs: to_u32(duration_secs, "duration_secs")?,
    })
}

impl Database {
    pub async fn insert_interval(&self, interval: &StoredInterval) -> Result<()> {
        let record = interval.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO intervals (id, session_id, position, kind, started_at, ended_at, duration_secs)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.id,
                    record.session_id,
                    record.position as i64,
                    record.kind.as_str(),
                    record.started_at.to_rfc3339(),
                    record.ended_at.as_ref().map(|dt| dt.to_rfc3339()),
                    to_i64(record.duration_secs),
                ],
            )
            .with_context(|| "failed to insert interval")?;
            Ok(())
        })
        .await
    }

    /// Close the session's open interval row. The machine guarantees at most
    /// one open interval per session.
    pub async fn finalize_open_interval(
        &self,
        session_id: &str,
        ended_at: DateTime<Utc>,
        duration_secs: u32,
    ) -> Result<()> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "UPDATE intervals
                 SET ended_at = ?1,
                     duration_secs = ?2
                 WHERE session_id = ?3 AND ended_at IS NULL",
                params![
                    ended_at.to_rfc3339(),
                    to_i64(duration_secs),
                    session_id,
                ],
            )
            .with_context(|| "failed to finalize open interval")?;
            Ok(())
        })
        .await
    }

    pub async fn delete_open_intervals(&self, session_id: &str) -> Result<()> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "DELETE FROM intervals WHERE session_id = ?1 AND ended_at IS NULL",
                params![session_id],
            )
            .with_context(|| "failed to delete open intervals")?;
            Ok(())
        })
        .await
    }

    pub async fn list_intervals_for_session(
        &self,
        session_id: &str,
    ) -> Result<Vec<StoredInterval>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, position, kind, started_at, ended_at, duration_secs
                 FROM intervals
                 WHERE session_id = ?1
                 ORDER BY position ASC",
            )?;
            let mut rows = stmt.query(params![session_id])?;
            let mut intervals = Vec::new();
            while let Some(row) = rows.next()? {
                intervals.push(row_to_interval(row)?);
            }
            Ok(intervals)
        })
        .await
    }
}
