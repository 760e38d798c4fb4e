//! Schedule-adherence classification: a single synchronous pass over
//! pre-fetched sessions and the configured daily slots.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Days, Duration, NaiveDate, NaiveTime, Utc};

use crate::adherence::config::AdherenceConfig;
use crate::adherence::types::{
    AdherenceDetail, AdherenceReport, AdherenceStatus, DailyAdherence,
};
use crate::models::{ScheduleSlot, Session, SessionStatus};

/// Classify every enabled slot over the trailing `days`-day window (today
/// inclusive) against the completed sessions in that window.
///
/// Slot-days still in the future, and slot-days past their time but within
/// the missed-grace period, are excluded from the report entirely.
pub fn classify_adherence(
    now: DateTime<Utc>,
    days: u32,
    slots: &[ScheduleSlot],
    sessions: &[Session],
    config: &AdherenceConfig,
) -> AdherenceReport {
    let completed: Vec<&Session> = sessions
        .iter()
        .filter(|s| s.status == SessionStatus::Completed)
        .collect();

    // Malformed times are an upstream contract violation (the settings write
    // path validates them); such slots are simply not classifiable.
    let mut active: Vec<(&ScheduleSlot, NaiveTime)> = slots
        .iter()
        .filter(|slot| slot.enabled)
        .filter_map(|slot| slot.time_of_day().map(|t| (slot, t)))
        .collect();
    active.sort_by_key(|(_, time)| *time);

    let mut details = Vec::new();
    let mut daily: BTreeMap<NaiveDate, DailyAdherence> = BTreeMap::new();
    let mut lateness_sum: u64 = 0;
    // Each session covers at most one slot.
    let mut used: HashSet<&str> = HashSet::new();

    let today = now.date_naive();
    for offset in (0..days as u64).rev() {
        let Some(date) = today.checked_sub_days(Days::new(offset)) else {
            continue;
        };
        for (slot, time) in &active {
            let scheduled = date.and_time(*time).and_utc();
            if scheduled > now {
                continue;
            }

            let detail = match find_matching_session(
                &completed, &used, slot, date, scheduled, config,
            ) {
                Some(session) => {
                    used.insert(session.id.as_str());
                    let lateness = session
                        .lateness_mins
                        .unwrap_or_else(|| derived_lateness(session.started_at, scheduled));
                    let status = if lateness <= config.late_threshold_mins {
                        AdherenceStatus::OnTime
                    } else {
                        lateness_sum += lateness as u64;
                        AdherenceStatus::Late
                    };
                    AdherenceDetail {
                        date,
                        slot_id: slot.id.clone(),
                        scheduled_at: scheduled,
                        status,
                        lateness_mins: Some(lateness),
                        session_id: Some(session.id.clone()),
                    }
                }
                None => {
                    let due_by =
                        scheduled + Duration::minutes(config.missed_grace_mins as i64);
                    if now <= due_by {
                        // Not yet due; neither missed nor pending in this
                        // backward-looking report.
                        continue;
                    }
                    AdherenceDetail {
                        date,
                        slot_id: slot.id.clone(),
                        scheduled_at: scheduled,
                        status: AdherenceStatus::Missed,
                        lateness_mins: None,
                        session_id: None,
                    }
                }
            };

            let day = daily.entry(date).or_insert_with(|| DailyAdherence {
                date,
                on_time: 0,
                late: 0,
                missed: 0,
            });
            match detail.status {
                AdherenceStatus::OnTime => day.on_time += 1,
                AdherenceStatus::Late => day.late += 1,
                AdherenceStatus::Missed => day.missed += 1,
            }
            details.push(detail);
        }
    }

    let on_time = details
        .iter()
        .filter(|d| d.status == AdherenceStatus::OnTime)
        .count() as u32;
    let late = details
        .iter()
        .filter(|d| d.status == AdherenceStatus::Late)
        .count() as u32;
    let missed = details
        .iter()
        .filter(|d| d.status == AdherenceStatus::Missed)
        .count() as u32;
    let total = on_time + late + missed;

    AdherenceReport {
        on_time,
        late,
        missed,
        total,
        adherence_rate: rate(on_time + late, total),
        on_time_rate: rate(on_time, total),
        avg_lateness_mins: if late > 0 {
            lateness_sum as f64 / late as f64
        } else {
            0.0
        },
        daily: daily.into_values().collect(),
        details,
    }
}

/// Session-to-slot matching, trying three strategies in order: explicit slot
/// link on the same day, exact scheduled-timestamp match, then same-day
/// proximity within the configured window.
fn find_matching_session<'a>(
    completed: &[&'a Session],
    used: &HashSet<&str>,
    slot: &ScheduleSlot,
    date: NaiveDate,
    scheduled: DateTime<Utc>,
    config: &AdherenceConfig,
) -> Option<&'a Session> {
    let available = || completed.iter().filter(|s| !used.contains(s.id.as_str()));

    if let Some(session) = available().find(|s| {
        s.slot_id.as_deref() == Some(slot.id.as_str()) && s.started_at.date_naive() == date
    }) {
        return Some(session);
    }

    if let Some(session) = available().find(|s| s.scheduled_at == Some(scheduled)) {
        return Some(session);
    }

    available()
        .filter(|s| s.started_at.date_naive() == date)
        .filter(|s| {
            (s.started_at - scheduled).num_minutes().abs()
                <= config.proximity_window_mins as i64
        })
        .min_by_key(|s| (s.started_at - scheduled).num_minutes().abs())
        .copied()
}

fn derived_lateness(started_at: DateTime<Utc>, scheduled: DateTime<Utc>) -> u32 {
    ((started_at - scheduled).num_milliseconds() / 60_000).max(0) as u32
}

fn rate(numerator: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    (numerator as f64 * 100.0 / total as f64).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IntervalPlan, SessionType};
    use chrono::TimeZone;

    fn ts(day: u32, hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, hour, min, 0).unwrap()
    }

    fn slot(id: &str, time: &str) -> ScheduleSlot {
        ScheduleSlot {
            id: id.into(),
            time: time.into(),
            enabled: true,
            session_type: SessionType::Regular,
        }
    }

    fn session(id: &str, started_at: DateTime<Utc>) -> Session {
        Session {
            id: id.into(),
            started_at,
            stopped_at: Some(started_at + Duration::minutes(20)),
            status: SessionStatus::Completed,
            session_type: SessionType::Regular,
            slot_id: None,
            scheduled_at: None,
            lateness_mins: None,
            volume_ml: None,
            plan: IntervalPlan::default(),
            total_pump_secs: 900,
            total_rest_secs: 300,
            created_at: started_at,
            updated_at: started_at,
        }
    }

    fn linked_session(id: &str, slot_id: &str, started_at: DateTime<Utc>) -> Session {
        Session {
            slot_id: Some(slot_id.into()),
            ..session(id, started_at)
        }
    }

    #[test]
    fn within_threshold_is_on_time() {
        let report = classify_adherence(
            ts(10, 12, 0),
            1,
            &[slot("s1", "10:00")],
            &[linked_session("a", "s1", ts(10, 10, 5))],
            &AdherenceConfig::default(),
        );
        assert_eq!(report.on_time, 1);
        assert_eq!(report.details[0].status, AdherenceStatus::OnTime);
        assert_eq!(report.details[0].lateness_mins, Some(5));
    }

    #[test]
    fn past_threshold_is_late_with_derived_lateness() {
        let report = classify_adherence(
            ts(10, 12, 0),
            1,
            &[slot("s1", "10:00")],
            &[linked_session("a", "s1", ts(10, 10, 30))],
            &AdherenceConfig::default(),
        );
        assert_eq!(report.late, 1);
        assert_eq!(report.details[0].lateness_mins, Some(30));
        assert_eq!(report.avg_lateness_mins, 30.0);
    }

    #[test]
    fn unmatched_slot_is_missed_only_after_grace() {
        let slots = [slot("s1", "10:00")];
        let config = AdherenceConfig::default();

        // Past the 30-minute grace period: missed.
        let report = classify_adherence(ts(10, 10, 31), 1, &slots, &[], &config);
        assert_eq!(report.missed, 1);
        assert_eq!(report.total, 1);

        // At or before the grace boundary: excluded entirely.
        let report = classify_adherence(ts(10, 10, 30), 1, &slots, &[], &config);
        assert_eq!(report.total, 0);
        assert!(report.details.is_empty());
    }

    #[test]
    fn future_slots_are_not_classified() {
        let report = classify_adherence(
            ts(10, 9, 0),
            1,
            &[slot("s1", "10:00")],
            &[],
            &AdherenceConfig::default(),
        );
        assert_eq!(report.total, 0);
    }

    #[test]
    fn rates_round_as_documented() {
        // One on-time, one late, one missed.
        let slots = [slot("s1", "06:00"), slot("s2", "08:00"), slot("s3", "10:00")];
        let sessions = [
            linked_session("a", "s1", ts(10, 6, 10)),
            linked_session("b", "s2", ts(10, 8, 40)),
        ];
        let report = classify_adherence(
            ts(10, 12, 0),
            1,
            &slots,
            &sessions,
            &AdherenceConfig::default(),
        );
        assert_eq!(report.total, 3);
        assert_eq!(report.adherence_rate, 67);
        assert_eq!(report.on_time_rate, 33);
    }

    #[test]
    fn zero_total_yields_zero_rates() {
        let report =
            classify_adherence(ts(10, 12, 0), 1, &[], &[], &AdherenceConfig::default());
        assert_eq!(report.total, 0);
        assert_eq!(report.adherence_rate, 0);
        assert_eq!(report.on_time_rate, 0);
        assert_eq!(report.avg_lateness_mins, 0.0);
    }

    #[test]
    fn disabled_slots_are_excluded_everywhere() {
        let mut disabled = slot("s1", "10:00");
        disabled.enabled = false;
        let report = classify_adherence(
            ts(10, 12, 0),
            3,
            &[disabled],
            &[],
            &AdherenceConfig::default(),
        );
        assert_eq!(report.total, 0);
        assert!(report.details.is_empty());
        assert!(report.daily.is_empty());
    }

    #[test]
    fn scheduled_timestamp_match_is_used_before_proximity() {
        let mut by_timestamp = session("a", ts(10, 10, 20));
        by_timestamp.scheduled_at = Some(ts(10, 10, 0));
        let report = classify_adherence(
            ts(10, 12, 0),
            1,
            &[slot("s1", "10:00")],
            &[by_timestamp],
            &AdherenceConfig::default(),
        );
        assert_eq!(report.details[0].session_id.as_deref(), Some("a"));
        assert_eq!(report.details[0].status, AdherenceStatus::Late);
        assert_eq!(report.details[0].lateness_mins, Some(20));
    }

    #[test]
    fn proximity_fallback_matches_within_two_hours() {
        // 90 minutes late: inside the proximity window, so Late rather than
        // Missed. The window and the grace period are independent constants.
        let report = classify_adherence(
            ts(10, 13, 0),
            1,
            &[slot("s1", "10:00")],
            &[session("a", ts(10, 11, 30))],
            &AdherenceConfig::default(),
        );
        assert_eq!(report.late, 1);
        assert_eq!(report.details[0].lateness_mins, Some(90));

        // 121 minutes away: outside the window, slot is Missed.
        let report = classify_adherence(
            ts(10, 13, 0),
            1,
            &[slot("s1", "10:00")],
            &[session("a", ts(10, 12, 1))],
            &AdherenceConfig::default(),
        );
        assert_eq!(report.missed, 1);
    }

    #[test]
    fn stored_lateness_is_preferred_over_derived() {
        let mut stored = linked_session("a", "s1", ts(10, 10, 25));
        stored.lateness_mins = Some(3);
        let report = classify_adherence(
            ts(10, 12, 0),
            1,
            &[slot("s1", "10:00")],
            &[stored],
            &AdherenceConfig::default(),
        );
        assert_eq!(report.details[0].status, AdherenceStatus::OnTime);
        assert_eq!(report.details[0].lateness_mins, Some(3));
    }

    #[test]
    fn multi_day_window_produces_chronological_breakdown() {
        let slots = [slot("s1", "10:00")];
        let sessions = [
            linked_session("a", "s1", ts(8, 10, 0)),
            linked_session("b", "s1", ts(9, 10, 50)),
        ];
        let report = classify_adherence(
            ts(10, 12, 0),
            3,
            &slots,
            &sessions,
            &AdherenceConfig::default(),
        );
        assert_eq!(report.total, 3);
        assert_eq!(report.on_time, 1);
        assert_eq!(report.late, 1);
        assert_eq!(report.missed, 1);

        assert_eq!(report.daily.len(), 3);
        assert!(report
            .daily
            .windows(2)
            .all(|pair| pair[0].date < pair[1].date));
        assert!(report
            .details
            .windows(2)
            .all(|pair| pair[0].scheduled_at <= pair[1].scheduled_at));
    }
}
