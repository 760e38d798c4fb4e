use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::{
        parse_datetime, parse_optional_datetime, parse_session_type, parse_status, to_i64,
        to_u32,
    },
};
use crate::models::{IntervalPlan, Session, SessionStatus};

const SESSION_COLUMNS: &str = "id, started_at, stopped_at, status, session_type, slot_id, \
     scheduled_at, lateness_mins, plan, total_pump_secs, total_rest_secs, volume_ml, \
     created_at, updated_at";

fn row_to_session(row: &Row) -> Result<Session> {
    let started_at: String = row.get("started_at")?;
    let stopped_at: Option<String> = row.get("stopped_at")?;
    let status: String = row.get("status")?;
    let session_type: String = row.get("session_type")?;
    let scheduled_at: Option<String> = row.get("scheduled_at")?;
    let lateness_mins: Option<i64> = row.get("lateness_mins")?;
    let plan: String = row.get("plan")?;
    let total_pump_secs: i64 = row.get("total_pump_secs")?;
    let total_rest_secs: i64 = row.get("total_rest_secs")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(Session {
        id: row.get("id")?,
        started_at: parse_datetime(&started_at, "started_at")?,
        stopped_at: parse_optional_datetime(stopped_at, "stopped_at")?,
        status: parse_status(&status)?,
        session_type: parse_session_type(&session_type)?,
        slot_id: row.get("slot_id")?,
        scheduled_at: parse_optional_datetime(scheduled_at, "scheduled_at")?,
        lateness_mins: lateness_mins
            .map(|v| to_u32(v, "lateness_mins"))
            .transpose()?,
        volume_ml: row.get("volume_ml")?,
        plan: serde_json::from_str::<IntervalPlan>(&plan)
            .with_context(|| "failed to parse stored interval plan")?,
        total_pump_secs: to_u32(total_pump_secs, "total_pump_secs")?,
        total_rest_secs: to_u32(total_rest_secs, "total_rest_secs")?,
        created_at: parse_datetime(&created_at, "created_at")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

impl Database {
    pub async fn insert_session(&self, session: &Session) -> Result<()> {
        let record = session.clone();
        self.execute(move |conn| {
            let plan = serde_json::to_string(&record.plan)
                .with_context(|| "failed to serialize interval plan")?;
            conn.execute(
                "INSERT INTO sessions (id, started_at, stopped_at, status, session_type, \
                 slot_id, scheduled_at, lateness_mins, plan, total_pump_secs, \
                 total_rest_secs, volume_ml, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    record.id,
                    record.started_at.to_rfc3339(),
                    record.stopped_at.as_ref().map(|dt| dt.to_rfc3339()),
                    record.status.as_str(),
                    record.session_type.as_str(),
                    record.slot_id,
                    record.scheduled_at.as_ref().map(|dt| dt.to_rfc3339()),
                    record.lateness_mins.map(to_i64),
                    plan,
                    to_i64(record.total_pump_secs),
                    to_i64(record.total_rest_secs),
                    record.volume_ml,
                    record.created_at.to_rfc3339(),
                    record.updated_at.to_rfc3339(),
                ],
            )
            .with_context(|| "failed to insert session")?;
            Ok(())
        })
        .await
    }

    pub async fn update_session_progress(
        &self,
        session_id: &str,
        total_pump_secs: u32,
        total_rest_secs: u32,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "UPDATE sessions
                 SET total_pump_secs = ?1,
                     total_rest_secs = ?2,
                     updated_at = ?3
                 WHERE id = ?4",
                params![
                    to_i64(total_pump_secs),
                    to_i64(total_rest_secs),
                    updated_at.to_rfc3339(),
                    session_id,
                ],
            )
            .with_context(|| "failed to update session progress")?;
            Ok(())
        })
        .await
    }

    pub async fn finalize_session(
        &self,
        session_id: &str,
        status: SessionStatus,
        total_pump_secs: u32,
        total_rest_secs: u32,
        stopped_at: Option<DateTime<Utc>>,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "UPDATE sessions
                 SET status = ?1,
                     total_pump_secs = ?2,
                     total_rest_secs = ?3,
                     stopped_at = ?4,
                     updated_at = ?5
                 WHERE id = ?6",
                params![
                    status.as_str(),
                    to_i64(total_pump_secs),
                    to_i64(total_rest_secs),
                    stopped_at.map(|dt| dt.to_rfc3339()),
                    updated_at.to_rfc3339(),
                    session_id,
                ],
            )
            .with_context(|| "failed to finalize session")?;
            Ok(())
        })
        .await
    }

    pub async fn set_session_volume(
        &self,
        session_id: &str,
        volume_ml: f64,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "UPDATE sessions
                 SET volume_ml = ?1,
                     updated_at = ?2
                 WHERE id = ?3",
                params![volume_ml, updated_at.to_rfc3339(), session_id],
            )
            .with_context(|| "failed to set session volume")?;
            Ok(())
        })
        .await
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"
            ))?;
            stmt.query_row(params![session_id], |row| {
                Ok(row_to_session(row))
            })
            .optional()?
            .transpose()
        })
        .await
    }

    /// The session left in Running state, if any. At most one session runs at
    /// a time; the most recently started wins if the invariant was broken.
    pub async fn get_running_session(&self) -> Result<Option<Session>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions
                 WHERE status = 'Running'
                 ORDER BY started_at DESC
                 LIMIT 1"
            ))?;
            stmt.query_row([], |row| Ok(row_to_session(row)))
                .optional()?
                .transpose()
        })
        .await
    }

    /// Sessions started inside `[from, to]`, oldest first. Feeds the
    /// adherence classifier and history rollups.
    pub async fn list_sessions_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Session>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions
                 WHERE started_at >= ?1 AND started_at <= ?2
                 ORDER BY started_at ASC"
            ))?;
            let mut rows = stmt.query(params![from.to_rfc3339(), to.to_rfc3339()])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }
            Ok(sessions)
        })
        .await
    }

    pub async fn list_recent_sessions(&self, limit: u32) -> Result<Vec<Session>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions
                 ORDER BY started_at DESC
                 LIMIT ?1"
            ))?;
            let mut rows = stmt.query(params![limit])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }
            Ok(sessions)
        })
        .await
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            conn.execute("DELETE FROM sessions WHERE id = ?1", params![session_id])
                .with_context(|| "failed to delete session")?;
            Ok(())
        })
        .await
    }
}
