//! Historical rollups over completed sessions.

use std::collections::BTreeMap;

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Session, SessionStatus};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DailyStats {
    pub date: NaiveDate,
    pub session_count: u32,
    pub total_pump_secs: u32,
    pub total_rest_secs: u32,
    pub total_volume_ml: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySummary {
    pub days: u32,
    pub session_count: u32,
    pub total_pump_secs: u32,
    pub total_volume_ml: f64,
    pub avg_volume_per_session_ml: f64,
    pub daily: Vec<DailyStats>,
}

/// Roll completed sessions up into per-day totals over the trailing
/// `days`-day window (today inclusive). Days with no sessions are included
/// with zeroed totals so charts get a continuous axis.
pub fn history_summary(now: DateTime<Utc>, days: u32, sessions: &[Session]) -> HistorySummary {
    let today = now.date_naive();
    let mut daily: BTreeMap<NaiveDate, DailyStats> = BTreeMap::new();
    for offset in 0..days as u64 {
        if let Some(date) = today.checked_sub_days(Days::new(offset)) {
            daily.insert(
                date,
                DailyStats {
                    date,
                    session_count: 0,
                    total_pump_secs: 0,
                    total_rest_secs: 0,
                    total_volume_ml: 0.0,
                },
            );
        }
    }

    let mut session_count = 0u32;
    let mut total_pump_secs = 0u32;
    let mut total_volume_ml = 0.0f64;
    let mut measured_sessions = 0u32;

    for session in sessions {
        if session.status != SessionStatus::Completed {
            continue;
        }
        let Some(day) = daily.get_mut(&session.started_at.date_naive()) else {
            continue;
        };
        day.session_count += 1;
        day.total_pump_secs += session.total_pump_secs;
        day.total_rest_secs += session.total_rest_secs;

        session_count += 1;
        total_pump_secs += session.total_pump_secs;
        if let Some(volume) = session.volume_ml {
            day.total_volume_ml += volume;
            total_volume_ml += volume;
            measured_sessions += 1;
        }
    }

    HistorySummary {
        days,
        session_count,
        total_pump_secs,
        total_volume_ml,
        avg_volume_per_session_ml: if measured_sessions > 0 {
            total_volume_ml / measured_sessions as f64
        } else {
            0.0
        },
        daily: daily.into_values().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IntervalPlan, SessionType};
    use chrono::{Duration, TimeZone};

    fn ts(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap()
    }

    fn completed(id: &str, started_at: DateTime<Utc>, pump: u32, volume: Option<f64>) -> Session {
        Session {
            id: id.into(),
            started_at,
            stopped_at: Some(started_at + Duration::minutes(20)),
            status: SessionStatus::Completed,
            session_type: SessionType::Regular,
            slot_id: None,
            scheduled_at: None,
            lateness_mins: None,
            volume_ml: volume,
            plan: IntervalPlan::default(),
            total_pump_secs: pump,
            total_rest_secs: 300,
            created_at: started_at,
            updated_at: started_at,
        }
    }

    #[test]
    fn rolls_up_by_day_with_gaps_zeroed() {
        let sessions = vec![
            completed("a", ts(8, 9), 900, Some(120.0)),
            completed("b", ts(8, 15), 600, Some(90.0)),
            completed("c", ts(10, 9), 900, None),
        ];
        let summary = history_summary(ts(10, 12), 3, &sessions);

        assert_eq!(summary.session_count, 3);
        assert_eq!(summary.total_pump_secs, 2400);
        assert_eq!(summary.total_volume_ml, 210.0);
        assert_eq!(summary.avg_volume_per_session_ml, 105.0);

        assert_eq!(summary.daily.len(), 3);
        assert_eq!(summary.daily[0].session_count, 2);
        assert_eq!(summary.daily[0].total_pump_secs, 1500);
        assert_eq!(summary.daily[1].session_count, 0);
        assert_eq!(summary.daily[2].session_count, 1);
    }

    #[test]
    fn non_completed_sessions_are_ignored() {
        let mut cancelled = completed("a", ts(10, 9), 900, Some(100.0));
        cancelled.status = SessionStatus::Cancelled;
        let summary = history_summary(ts(10, 12), 1, &[cancelled]);
        assert_eq!(summary.session_count, 0);
        assert_eq!(summary.total_volume_ml, 0.0);
    }
}
