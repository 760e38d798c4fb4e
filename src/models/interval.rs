//! Interval-related data models: the configured plan a session runs through
//! and the durable record produced as intervals complete.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum IntervalKind {
    Pump,
    Rest,
}

impl IntervalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntervalKind::Pump => "Pump",
            IntervalKind::Rest => "Rest",
        }
    }
}

/// One configured phase of a session plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IntervalSpec {
    pub id: String,
    pub kind: IntervalKind,
    pub duration_secs: u32,
}

/// Ordered sequence of intervals making up one session's plan.
///
/// Consecutive same-kind intervals are allowed; plans are user-editable and
/// the timer must tolerate whatever ordering it is given.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IntervalPlan {
    intervals: Vec<IntervalSpec>,
}

impl IntervalPlan {
    /// Build a plan from an explicit interval list. Returns `None` when the
    /// list is empty or any interval has a zero duration.
    pub fn new(intervals: Vec<IntervalSpec>) -> Option<Self> {
        if intervals.is_empty() || intervals.iter().any(|i| i.duration_secs == 0) {
            return None;
        }
        Some(Self { intervals })
    }

    /// Convert the legacy uniform parameters (pump length, rest length, pump
    /// count) into the canonical interval sequence: pump, rest, pump, ...,
    /// pump — rests only between pumps.
    pub fn from_cycle(pump_secs: u32, rest_secs: u32, pump_count: u32) -> Option<Self> {
        if pump_secs == 0 || pump_count == 0 {
            return None;
        }
        let mut intervals = Vec::with_capacity((pump_count as usize) * 2 - 1);
        for n in 1..=pump_count {
            intervals.push(IntervalSpec {
                id: format!("pump-{n}"),
                kind: IntervalKind::Pump,
                duration_secs: pump_secs,
            });
            if n < pump_count && rest_secs > 0 {
                intervals.push(IntervalSpec {
                    id: format!("rest-{n}"),
                    kind: IntervalKind::Rest,
                    duration_secs: rest_secs,
                });
            }
        }
        Some(Self { intervals })
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&IntervalSpec> {
        self.intervals.get(index)
    }

    pub fn intervals(&self) -> &[IntervalSpec] {
        &self.intervals
    }

    /// Total number of pump intervals in the plan ("Pump N of M" denominator).
    pub fn pump_total(&self) -> u32 {
        self.intervals
            .iter()
            .filter(|i| i.kind == IntervalKind::Pump)
            .count() as u32
    }

    /// 1-indexed count of pump intervals up to and including `index`.
    pub fn pumps_through(&self, index: usize) -> u32 {
        self.intervals
            .iter()
            .take(index + 1)
            .filter(|i| i.kind == IntervalKind::Pump)
            .count() as u32
    }

    /// Position of the next pump interval strictly after `index`, if any.
    pub fn next_pump_after(&self, index: usize) -> Option<usize> {
        self.intervals
            .iter()
            .enumerate()
            .skip(index + 1)
            .find(|(_, i)| i.kind == IntervalKind::Pump)
            .map(|(pos, _)| pos)
    }

    /// Sum of configured durations for intervals of `kind`.
    pub fn planned_secs(&self, kind: IntervalKind) -> u32 {
        self.intervals
            .iter()
            .filter(|i| i.kind == kind)
            .map(|i| i.duration_secs)
            .sum()
    }
}

/// Durable artifact produced when an interval completes (or the session
/// stops). At most one recorded interval is open (`ended_at` absent) at a
/// time, and it is always the last one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RecordedInterval {
    pub kind: IntervalKind,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_secs: u32,
}

/// An interval row as persisted, carrying its position within the plan so an
/// interrupted session can be resumed at the right index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredInterval {
    pub id: String,
    pub session_id: String,
    pub position: usize,
    pub kind: IntervalKind,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_secs: u32,
}

impl From<StoredInterval> for RecordedInterval {
    fn from(row: StoredInterval) -> Self {
        Self {
            kind: row.kind,
            started_at: row.started_at,
            ended_at: row.ended_at,
            duration_secs: row.duration_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_cycle_builds_pump_rest_alternation() {
        let plan = IntervalPlan::from_cycle(900, 300, 2).unwrap();
        let kinds: Vec<IntervalKind> = plan.intervals().iter().map(|i| i.kind).collect();
        assert_eq!(
            kinds,
            vec![IntervalKind::Pump, IntervalKind::Rest, IntervalKind::Pump]
        );
        assert_eq!(plan.planned_secs(IntervalKind::Pump), 1800);
        assert_eq!(plan.planned_secs(IntervalKind::Rest), 300);
    }

    #[test]
    fn from_cycle_single_pump_has_no_rest() {
        let plan = IntervalPlan::from_cycle(600, 300, 1).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.get(0).unwrap().kind, IntervalKind::Pump);
    }

    #[test]
    fn from_cycle_rejects_degenerate_parameters() {
        assert!(IntervalPlan::from_cycle(0, 300, 2).is_none());
        assert!(IntervalPlan::from_cycle(900, 300, 0).is_none());
    }

    #[test]
    fn new_rejects_empty_and_zero_duration() {
        assert!(IntervalPlan::new(Vec::new()).is_none());
        assert!(IntervalPlan::new(vec![IntervalSpec {
            id: "p1".into(),
            kind: IntervalKind::Pump,
            duration_secs: 0,
        }])
        .is_none());
    }

    #[test]
    fn pump_ordinals_count_only_pumps() {
        let plan = IntervalPlan::from_cycle(900, 300, 3).unwrap();
        assert_eq!(plan.pump_total(), 3);
        assert_eq!(plan.pumps_through(0), 1);
        assert_eq!(plan.pumps_through(1), 1);
        assert_eq!(plan.pumps_through(2), 2);
        assert_eq!(plan.next_pump_after(1), Some(2));
        assert_eq!(plan.next_pump_after(4), None);
    }
}
