//! Events emitted by timer transitions. The state machine returns these from
//! each transition call and the controller republishes them on a broadcast
//! channel, so callers decide how to dispatch side effects (ring an alarm,
//! update a display, enqueue a notification).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::IntervalKind;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TimerEvent {
    SessionStarted {
        session_id: String,
        at: DateTime<Utc>,
    },
    /// The current interval reached its configured duration. Fires exactly
    /// once per interval boundary.
    AlarmTriggered {
        interval_index: usize,
        kind: IntervalKind,
        at: DateTime<Utc>,
    },
    IntervalCompleted {
        interval_index: usize,
        kind: IntervalKind,
        duration_secs: u32,
        at: DateTime<Utc>,
    },
    /// A pump-kind interval finished; `ordinal` is its 1-indexed position
    /// among the plan's pump intervals.
    PumpCompleted {
        ordinal: u32,
        at: DateTime<Utc>,
    },
    /// The final configured interval was switched away from.
    SessionCompleted {
        at: DateTime<Utc>,
    },
    SessionPaused {
        elapsed_secs: u32,
        at: DateTime<Utc>,
    },
    SessionResumed {
        elapsed_secs: u32,
        at: DateTime<Utc>,
    },
    SessionStopped {
        session_id: String,
        total_pump_secs: u32,
        total_rest_secs: u32,
        at: DateTime<Utc>,
    },
}
