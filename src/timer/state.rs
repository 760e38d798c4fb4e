use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{IntervalKind, IntervalPlan, RecordedInterval, StoredInterval};
use crate::timer::events::TimerEvent;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TimerStatus {
    Idle,
    Running,
    Complete,
}

impl Default for TimerStatus {
    fn default() -> Self {
        TimerStatus::Idle
    }
}

/// Ephemeral state reconstructed from a persisted session's interval rows,
/// fed back into the machine after an app relaunch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeState {
    pub current_index: usize,
    pub elapsed_in_current_secs: u32,
    pub completed: Vec<RecordedInterval>,
}

impl ResumeState {
    /// Derive a resume point by scanning stored interval rows for the single
    /// open one. Returns `None` when no interval is open, in which case the
    /// session cannot be continued and should be finalized instead.
    pub fn derive(rows: &[StoredInterval], now: DateTime<Utc>) -> Option<Self> {
        let open = rows.iter().find(|r| r.ended_at.is_none())?;
        let elapsed = (now - open.started_at).num_seconds().max(0) as u32;
        let mut completed: Vec<&StoredInterval> =
            rows.iter().filter(|r| r.ended_at.is_some()).collect();
        completed.sort_by_key(|r| r.position);
        Some(Self {
            current_index: open.position,
            elapsed_in_current_secs: elapsed,
            completed: completed
                .into_iter()
                .map(|r| RecordedInterval::from(r.clone()))
                .collect(),
        })
    }
}

/// Terminal result of `stop`, handed to the caller for persistence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionTotals {
    pub intervals: Vec<RecordedInterval>,
    pub total_pump_secs: u32,
    pub total_rest_secs: u32,
}

/// Drives a single session through its configured interval sequence.
///
/// Pure state transitions only: every operation takes `now` explicitly, and
/// elapsed time is always derived from a wall-clock delta against the
/// interval anchor rather than accumulated tick by tick, so missed or
/// throttled ticks cannot cause drift. Operations called in an invalid state
/// are silent no-ops; the machine has no error returns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    status: TimerStatus,
    plan: IntervalPlan,
    current_index: usize,
    elapsed_secs: u32,
    is_paused: bool,
    /// Alarm is currently sounding (cleared by `dismiss_alarm`).
    alarm_ringing: bool,
    /// Alarm already fired for the current interval; latched until the
    /// interval is switched away from so the callback fires exactly once.
    alarm_fired: bool,
    session_started_at: Option<DateTime<Utc>>,
    /// Wall-clock start of the current interval, kept for the durable record.
    interval_started_at: Option<DateTime<Utc>>,
    /// Elapsed-time reference; shifted on resume so ticking continues without
    /// a jump.
    #[serde(skip)]
    anchor: Option<DateTime<Utc>>,
    completed: Vec<RecordedInterval>,
}

impl TimerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the configured plan, resetting the machine to idle.
    pub fn configure(&mut self, plan: IntervalPlan) {
        *self = Self {
            plan,
            ..Self::default()
        };
    }

    pub fn status(&self) -> TimerStatus {
        self.status
    }

    pub fn plan(&self) -> &IntervalPlan {
        &self.plan
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn elapsed_secs(&self) -> u32 {
        self.elapsed_secs
    }

    pub fn is_paused(&self) -> bool {
        self.is_paused
    }

    pub fn is_alarm_ringing(&self) -> bool {
        self.alarm_ringing
    }

    pub fn is_complete(&self) -> bool {
        self.status == TimerStatus::Complete
    }

    pub fn session_started_at(&self) -> Option<DateTime<Utc>> {
        self.session_started_at
    }

    pub fn completed_intervals(&self) -> &[RecordedInterval] {
        &self.completed
    }

    pub fn current_kind(&self) -> Option<IntervalKind> {
        if self.status == TimerStatus::Running {
            self.plan.get(self.current_index).map(|i| i.kind)
        } else {
            None
        }
    }

    /// Configured duration of the current interval.
    pub fn target_secs(&self) -> u32 {
        self.plan
            .get(self.current_index)
            .map(|i| i.duration_secs)
            .unwrap_or(0)
    }

    pub fn remaining_secs(&self) -> u32 {
        self.target_secs().saturating_sub(self.elapsed_secs)
    }

    /// 1-indexed pump ordinal at the current position ("Pump N of M").
    pub fn current_pump(&self) -> u32 {
        if self.status == TimerStatus::Idle {
            return 0;
        }
        self.plan.pumps_through(self.current_index)
    }

    pub fn pump_total(&self) -> u32 {
        self.plan.pump_total()
    }

    /// Completed pump seconds plus the in-progress elapsed time when the
    /// current interval is a pump.
    pub fn total_pump_secs(&self) -> u32 {
        self.kind_total(IntervalKind::Pump)
    }

    pub fn total_rest_secs(&self) -> u32 {
        self.kind_total(IntervalKind::Rest)
    }

    fn kind_total(&self, kind: IntervalKind) -> u32 {
        let completed: u32 = self
            .completed
            .iter()
            .filter(|i| i.kind == kind)
            .map(|i| i.duration_secs)
            .sum();
        let in_progress = if self.status == TimerStatus::Running
            && self.plan.get(self.current_index).map(|i| i.kind) == Some(kind)
        {
            self.elapsed_secs
        } else {
            0
        };
        completed + in_progress
    }

    fn live_elapsed(&self, now: DateTime<Utc>) -> u32 {
        if self.status == TimerStatus::Running && !self.is_paused {
            if let Some(anchor) = self.anchor {
                return (now - anchor).num_seconds().max(0) as u32;
            }
        }
        self.elapsed_secs
    }

    /// Recompute the elapsed snapshot from the anchor. Call before reading
    /// display values.
    pub fn sync(&mut self, now: DateTime<Utc>) {
        self.elapsed_secs = self.live_elapsed(now);
    }

    /// Begin a fresh session from interval 0. Calling this while a session is
    /// in progress fully resets, discarding in-memory progress. No-op when no
    /// plan is configured.
    pub fn start(&mut self, now: DateTime<Utc>) {
        if self.plan.is_empty() {
            return;
        }
        let plan = std::mem::take(&mut self.plan);
        *self = Self {
            status: TimerStatus::Running,
            plan,
            session_started_at: Some(now),
            interval_started_at: Some(now),
            anchor: Some(now),
            ..Self::default()
        };
    }

    /// Periodic wall-clock check. Re-derives elapsed time and fires the alarm
    /// once when the current interval reaches its target.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<TimerEvent> {
        if self.status != TimerStatus::Running || self.is_paused {
            return Vec::new();
        }
        self.elapsed_secs = self.live_elapsed(now);
        if !self.alarm_fired && self.elapsed_secs >= self.target_secs() {
            self.alarm_fired = true;
            self.alarm_ringing = true;
            if let Some(kind) = self.plan.get(self.current_index).map(|i| i.kind) {
                return vec![TimerEvent::AlarmTriggered {
                    interval_index: self.current_index,
                    kind,
                    at: now,
                }];
            }
        }
        Vec::new()
    }

    /// Freeze the displayed elapsed time.
    pub fn pause(&mut self, now: DateTime<Utc>) {
        if self.status != TimerStatus::Running || self.is_paused {
            return;
        }
        self.elapsed_secs = self.live_elapsed(now);
        self.is_paused = true;
        self.anchor = None;
    }

    /// Re-anchor so wall-clock ticking continues from the frozen elapsed
    /// value without a jump.
    pub fn resume(&mut self, now: DateTime<Utc>) {
        if self.status != TimerStatus::Running || !self.is_paused {
            return;
        }
        self.anchor = Some(now - Duration::seconds(self.elapsed_secs as i64));
        self.is_paused = false;
    }

    /// Silence the alarm without advancing the interval.
    pub fn dismiss_alarm(&mut self) {
        self.alarm_ringing = false;
    }

    /// Finalize the current interval and advance to the next one, or complete
    /// the session if it was the last.
    pub fn switch_interval(&mut self, now: DateTime<Utc>) -> Vec<TimerEvent> {
        if self.status != TimerStatus::Running {
            return Vec::new();
        }
        let mut events = Vec::new();
        let (kind, duration) = self.finalize_current(now);
        events.push(TimerEvent::IntervalCompleted {
            interval_index: self.current_index,
            kind,
            duration_secs: duration,
            at: now,
        });
        if kind == IntervalKind::Pump {
            events.push(TimerEvent::PumpCompleted {
                ordinal: self.plan.pumps_through(self.current_index),
                at: now,
            });
        }
        if self.current_index + 1 >= self.plan.len() {
            self.complete(now, &mut events);
        } else {
            self.current_index += 1;
            self.begin_interval(now);
        }
        events
    }

    /// Finalize the current rest interval and jump directly to the next pump
    /// interval, skipping anything in between. No-op unless the current
    /// interval is a rest; pause state does not matter.
    pub fn skip_to_next_cycle(&mut self, now: DateTime<Utc>) -> Vec<TimerEvent> {
        if self.status != TimerStatus::Running {
            return Vec::new();
        }
        if self.plan.get(self.current_index).map(|i| i.kind) != Some(IntervalKind::Rest) {
            return Vec::new();
        }
        let mut events = Vec::new();
        let (kind, duration) = self.finalize_current(now);
        events.push(TimerEvent::IntervalCompleted {
            interval_index: self.current_index,
            kind,
            duration_secs: duration,
            at: now,
        });
        match self.plan.next_pump_after(self.current_index) {
            Some(next) => {
                self.current_index = next;
                self.begin_interval(now);
            }
            None => self.complete(now, &mut events),
        }
        events
    }

    /// Reconstruct a running session from persisted state after a relaunch.
    pub fn resume_from(&mut self, state: ResumeState, now: DateTime<Utc>) {
        if self.plan.is_empty() {
            return;
        }
        let index = state.current_index.min(self.plan.len() - 1);
        let anchor = now - Duration::seconds(state.elapsed_in_current_secs as i64);
        self.status = TimerStatus::Running;
        self.current_index = index;
        self.elapsed_secs = state.elapsed_in_current_secs;
        self.is_paused = false;
        self.alarm_ringing = false;
        self.alarm_fired = false;
        self.session_started_at = Some(anchor);
        self.interval_started_at = Some(anchor);
        self.anchor = Some(anchor);
        self.completed = state.completed;
    }

    /// Finalize whatever is in progress and reset to idle, returning the
    /// recorded intervals and per-kind totals for persistence. A zero-elapsed
    /// final sliver is discarded. Returns an empty result when idle.
    pub fn stop(&mut self, now: DateTime<Utc>) -> SessionTotals {
        if self.status == TimerStatus::Idle {
            return SessionTotals::default();
        }
        if self.status == TimerStatus::Running && self.live_elapsed(now) > 0 {
            self.finalize_current(now);
        }
        let intervals = std::mem::take(&mut self.completed);
        let total_pump_secs = intervals
            .iter()
            .filter(|i| i.kind == IntervalKind::Pump)
            .map(|i| i.duration_secs)
            .sum();
        let total_rest_secs = intervals
            .iter()
            .filter(|i| i.kind == IntervalKind::Rest)
            .map(|i| i.duration_secs)
            .sum();
        let plan = std::mem::take(&mut self.plan);
        *self = Self {
            plan,
            ..Self::default()
        };
        SessionTotals {
            intervals,
            total_pump_secs,
            total_rest_secs,
        }
    }

    fn finalize_current(&mut self, now: DateTime<Utc>) -> (IntervalKind, u32) {
        let elapsed = self.live_elapsed(now);
        let kind = self
            .plan
            .get(self.current_index)
            .map(|i| i.kind)
            .unwrap_or(IntervalKind::Pump);
        self.completed.push(RecordedInterval {
            kind,
            started_at: self.interval_started_at.unwrap_or(now),
            ended_at: Some(now),
            duration_secs: elapsed,
        });
        (kind, elapsed)
    }

    fn begin_interval(&mut self, now: DateTime<Utc>) {
        self.elapsed_secs = 0;
        self.alarm_ringing = false;
        self.alarm_fired = false;
        self.anchor = Some(now);
        self.interval_started_at = Some(now);
    }

    fn complete(&mut self, now: DateTime<Utc>, events: &mut Vec<TimerEvent>) {
        self.status = TimerStatus::Complete;
        self.is_paused = false;
        self.alarm_ringing = false;
        self.alarm_fired = false;
        self.elapsed_secs = 0;
        self.anchor = None;
        events.push(TimerEvent::SessionCompleted { at: now });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IntervalSpec;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn machine(plan: IntervalPlan) -> TimerState {
        let mut state = TimerState::new();
        state.configure(plan);
        state
    }

    fn cycle_plan() -> IntervalPlan {
        IntervalPlan::from_cycle(900, 300, 2).unwrap()
    }

    #[test]
    fn switching_through_every_interval_completes_once() {
        let plan = cycle_plan();
        let len = plan.len();
        let mut state = machine(plan);
        state.start(at(0));

        let mut completions = 0;
        for n in 0..len {
            let events = state.switch_interval(at(n as i64));
            completions += events
                .iter()
                .filter(|e| matches!(e, TimerEvent::SessionCompleted { .. }))
                .count();
            if n + 1 < len {
                assert_eq!(completions, 0);
            }
        }
        assert_eq!(completions, 1);
        assert!(state.is_complete());
    }

    #[test]
    fn stop_totals_equal_sum_of_recorded_durations() {
        let mut state = machine(cycle_plan());
        state.start(at(0));
        state.tick(at(60));
        state.switch_interval(at(60));
        state.tick(at(100));
        state.switch_interval(at(100));
        state.tick(at(130));

        let totals = state.stop(at(130));
        let sum: u32 = totals.intervals.iter().map(|i| i.duration_secs).sum();
        assert_eq!(totals.total_pump_secs + totals.total_rest_secs, sum);
        assert_eq!(totals.total_pump_secs, 60 + 30);
        assert_eq!(totals.total_rest_secs, 40);
        assert_eq!(state.status(), TimerStatus::Idle);
    }

    #[test]
    fn generated_cycle_matches_expected_shape_and_planned_totals() {
        let plan = cycle_plan();
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.planned_secs(IntervalKind::Pump), 1800);
        assert_eq!(plan.planned_secs(IntervalKind::Rest), 300);

        let mut state = machine(plan);
        state.start(at(0));
        state.switch_interval(at(0));
        state.switch_interval(at(0));
        state.switch_interval(at(0));
        assert!(state.is_complete());
    }

    #[test]
    fn alarm_fires_exactly_once_per_interval() {
        let plan = IntervalPlan::from_cycle(10, 5, 2).unwrap();
        let mut state = machine(plan);
        state.start(at(0));

        assert!(state.tick(at(5)).is_empty());
        let events = state.tick(at(10));
        assert!(matches!(
            events.as_slice(),
            [TimerEvent::AlarmTriggered {
                interval_index: 0,
                ..
            }]
        ));
        assert!(state.is_alarm_ringing());

        // Latched: further ticks past the target stay silent.
        assert!(state.tick(at(11)).is_empty());
        state.dismiss_alarm();
        assert!(!state.is_alarm_ringing());
        assert!(state.tick(at(12)).is_empty());

        // Advancing re-arms the alarm for the next interval.
        state.switch_interval(at(12));
        assert!(state.tick(at(13)).is_empty());
        let events = state.tick(at(17));
        assert!(matches!(
            events.as_slice(),
            [TimerEvent::AlarmTriggered {
                interval_index: 1,
                ..
            }]
        ));
    }

    #[test]
    fn pause_freezes_and_resume_reanchors() {
        let mut state = machine(cycle_plan());
        state.start(at(0));
        state.tick(at(30));
        state.pause(at(30));
        assert_eq!(state.elapsed_secs(), 30);

        // Ticks while paused do not move the clock.
        state.tick(at(300));
        assert_eq!(state.elapsed_secs(), 30);

        state.resume(at(300));
        state.tick(at(310));
        assert_eq!(state.elapsed_secs(), 40);
    }

    #[test]
    fn skip_is_a_noop_during_pump() {
        let mut state = machine(cycle_plan());
        state.start(at(0));
        state.tick(at(20));
        let events = state.skip_to_next_cycle(at(20));
        assert!(events.is_empty());
        assert_eq!(state.current_index(), 0);
        assert_eq!(state.elapsed_secs(), 20);
        assert!(state.completed_intervals().is_empty());
    }

    #[test]
    fn skip_during_rest_jumps_to_next_pump() {
        let mut state = machine(cycle_plan());
        state.start(at(0));
        state.switch_interval(at(60));
        assert_eq!(state.current_kind(), Some(IntervalKind::Rest));

        let events = state.skip_to_next_cycle(at(90));
        assert!(matches!(
            events.as_slice(),
            [TimerEvent::IntervalCompleted {
                kind: IntervalKind::Rest,
                duration_secs: 30,
                ..
            }]
        ));
        assert_eq!(state.current_index(), 2);
        assert_eq!(state.current_kind(), Some(IntervalKind::Pump));
        assert_eq!(state.elapsed_secs(), 0);
    }

    #[test]
    fn skip_with_no_pump_left_completes_session() {
        let plan = IntervalPlan::new(vec![
            IntervalSpec {
                id: "p1".into(),
                kind: IntervalKind::Pump,
                duration_secs: 60,
            },
            IntervalSpec {
                id: "r1".into(),
                kind: IntervalKind::Rest,
                duration_secs: 60,
            },
        ])
        .unwrap();
        let mut state = machine(plan);
        state.start(at(0));
        state.switch_interval(at(10));
        let events = state.skip_to_next_cycle(at(20));
        assert!(events
            .iter()
            .any(|e| matches!(e, TimerEvent::SessionCompleted { .. })));
        assert!(state.is_complete());
    }

    #[test]
    fn pump_ordinal_reported_on_pump_completion() {
        let mut state = machine(cycle_plan());
        state.start(at(0));
        let events = state.switch_interval(at(10));
        assert!(events
            .iter()
            .any(|e| matches!(e, TimerEvent::PumpCompleted { ordinal: 1, .. })));
        state.switch_interval(at(20));
        let events = state.switch_interval(at(30));
        assert!(events
            .iter()
            .any(|e| matches!(e, TimerEvent::PumpCompleted { ordinal: 2, .. })));
    }

    #[test]
    fn resume_from_then_stop_appends_the_open_interval() {
        let completed = vec![RecordedInterval {
            kind: IntervalKind::Pump,
            started_at: at(0),
            ended_at: Some(at(900)),
            duration_secs: 900,
        }];
        let mut state = machine(cycle_plan());
        state.resume_from(
            ResumeState {
                current_index: 1,
                elapsed_in_current_secs: 45,
                completed: completed.clone(),
            },
            at(1000),
        );
        assert_eq!(state.status(), TimerStatus::Running);
        assert_eq!(state.current_index(), 1);
        assert_eq!(state.elapsed_secs(), 45);

        let totals = state.stop(at(1000));
        assert_eq!(totals.intervals.len(), completed.len() + 1);
        assert_eq!(totals.intervals[..1], completed[..]);
        assert_eq!(totals.intervals[1].kind, IntervalKind::Rest);
        assert_eq!(totals.intervals[1].duration_secs, 45);
        assert_eq!(totals.total_pump_secs, 900);
        assert_eq!(totals.total_rest_secs, 45);
    }

    #[test]
    fn stop_discards_zero_elapsed_sliver() {
        let mut state = machine(cycle_plan());
        state.start(at(0));
        state.switch_interval(at(60));
        let totals = state.stop(at(60));
        assert_eq!(totals.intervals.len(), 1);
        assert_eq!(totals.total_pump_secs, 60);
        assert_eq!(totals.total_rest_secs, 0);
    }

    #[test]
    fn stop_when_idle_returns_empty_result() {
        let mut state = machine(cycle_plan());
        let totals = state.stop(at(0));
        assert!(totals.intervals.is_empty());
        assert_eq!(totals.total_pump_secs, 0);
        assert_eq!(totals.total_rest_secs, 0);
    }

    #[test]
    fn invalid_state_calls_are_noops() {
        let mut state = machine(cycle_plan());
        assert!(state.switch_interval(at(0)).is_empty());
        assert!(state.skip_to_next_cycle(at(0)).is_empty());
        assert!(state.tick(at(0)).is_empty());
        state.pause(at(0));
        assert!(!state.is_paused());

        state.start(at(0));
        state.switch_interval(at(1));
        state.switch_interval(at(2));
        state.switch_interval(at(3));
        assert!(state.is_complete());
        // Complete is terminal for transitions other than stop.
        assert!(state.switch_interval(at(4)).is_empty());
    }

    #[test]
    fn start_again_discards_prior_progress() {
        let mut state = machine(cycle_plan());
        state.start(at(0));
        state.switch_interval(at(60));
        assert_eq!(state.completed_intervals().len(), 1);

        state.start(at(120));
        assert_eq!(state.current_index(), 0);
        assert!(state.completed_intervals().is_empty());
        assert_eq!(state.session_started_at(), Some(at(120)));
    }

    #[test]
    fn tolerates_consecutive_same_kind_intervals() {
        let plan = IntervalPlan::new(vec![
            IntervalSpec {
                id: "p1".into(),
                kind: IntervalKind::Pump,
                duration_secs: 60,
            },
            IntervalSpec {
                id: "p2".into(),
                kind: IntervalKind::Pump,
                duration_secs: 60,
            },
        ])
        .unwrap();
        let mut state = machine(plan);
        state.start(at(0));
        let events = state.switch_interval(at(10));
        assert!(events
            .iter()
            .any(|e| matches!(e, TimerEvent::PumpCompleted { ordinal: 1, .. })));
        let events = state.switch_interval(at(20));
        assert!(events
            .iter()
            .any(|e| matches!(e, TimerEvent::PumpCompleted { ordinal: 2, .. })));
        assert!(state.is_complete());
    }

    #[test]
    fn total_seconds_include_in_progress_interval() {
        let mut state = machine(cycle_plan());
        state.start(at(0));
        state.tick(at(30));
        assert_eq!(state.total_pump_secs(), 30);
        assert_eq!(state.total_rest_secs(), 0);

        state.switch_interval(at(30));
        state.tick(at(40));
        assert_eq!(state.total_pump_secs(), 30);
        assert_eq!(state.total_rest_secs(), 10);
    }

    #[test]
    fn derive_resume_state_from_stored_rows() {
        let rows = vec![
            StoredInterval {
                id: "a".into(),
                session_id: "s".into(),
                position: 0,
                kind: IntervalKind::Pump,
                started_at: at(0),
                ended_at: Some(at(900)),
                duration_secs: 900,
            },
            StoredInterval {
                id: "b".into(),
                session_id: "s".into(),
                position: 1,
                kind: IntervalKind::Rest,
                started_at: at(900),
                ended_at: None,
                duration_secs: 0,
            },
        ];
        let resume = ResumeState::derive(&rows, at(960)).unwrap();
        assert_eq!(resume.current_index, 1);
        assert_eq!(resume.elapsed_in_current_secs, 60);
        assert_eq!(resume.completed.len(), 1);

        // Clock skew never yields a negative elapsed value.
        let resume = ResumeState::derive(&rows, at(800)).unwrap();
        assert_eq!(resume.elapsed_in_current_secs, 0);
    }

    #[test]
    fn derive_returns_none_without_open_interval() {
        let rows = vec![StoredInterval {
            id: "a".into(),
            session_id: "s".into(),
            position: 0,
            kind: IntervalKind::Pump,
            started_at: at(0),
            ended_at: Some(at(900)),
            duration_secs: 900,
        }];
        assert!(ResumeState::derive(&rows, at(1000)).is_none());
    }
}
