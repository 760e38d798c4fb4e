//! Session-related data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::interval::IntervalPlan;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    Running,
    Completed,
    Cancelled,
    Interrupted,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Running => "Running",
            SessionStatus::Completed => "Completed",
            SessionStatus::Cancelled => "Cancelled",
            SessionStatus::Interrupted => "Interrupted",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionType {
    Regular,
    Power,
}

impl SessionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::Regular => "Regular",
            SessionType::Power => "Power",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub session_type: SessionType,
    /// Schedule slot this session was started against, when known.
    pub slot_id: Option<String>,
    /// Absolute timestamp of the slot the session was started against.
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Lateness relative to `scheduled_at`, captured at session start.
    pub lateness_mins: Option<u32>,
    pub volume_ml: Option<f64>,
    pub plan: IntervalPlan,
    pub total_pump_secs: u32,
    pub total_rest_secs: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub session_type: SessionType,
    pub total_pump_secs: u32,
    pub total_rest_secs: u32,
    pub volume_ml: Option<f64>,
}

impl From<Session> for SessionInfo {
    fn from(session: Session) -> Self {
        Self {
            id: session.id,
            started_at: session.started_at,
            stopped_at: session.stopped_at,
            status: session.status,
            session_type: session.session_type,
            total_pump_secs: session.total_pump_secs,
            total_rest_secs: session.total_rest_secs,
            volume_ml: session.volume_ml,
        }
    }
}
