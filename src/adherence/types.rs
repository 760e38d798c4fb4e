use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AdherenceStatus {
    OnTime,
    Late,
    Missed,
}

/// Classification of one slot on one day. Derived per query, never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdherenceDetail {
    pub date: NaiveDate,
    pub slot_id: String,
    pub scheduled_at: DateTime<Utc>,
    pub status: AdherenceStatus,
    pub lateness_mins: Option<u32>,
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyAdherence {
    pub date: NaiveDate,
    pub on_time: u32,
    pub late: u32,
    pub missed: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdherenceReport {
    pub on_time: u32,
    pub late: u32,
    pub missed: u32,
    pub total: u32,
    /// Percentage of due slots covered by a session, on time or late.
    pub adherence_rate: u32,
    pub on_time_rate: u32,
    /// Mean lateness over Late-classified slots only.
    pub avg_lateness_mins: f64,
    pub daily: Vec<DailyAdherence>,
    pub details: Vec<AdherenceDetail>,
}
