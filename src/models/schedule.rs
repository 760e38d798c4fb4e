//! Daily schedule configuration.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::models::session::SessionType;

/// One expected session in the user's daily schedule. Slots are not tied to a
/// specific day; the same schedule repeats every day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleSlot {
    pub id: String,
    /// Time of day in "HH:mm". Validated by the settings write path; readers
    /// treat an unparseable value as a disabled slot.
    pub time: String,
    pub enabled: bool,
    pub session_type: SessionType,
}

impl ScheduleSlot {
    pub fn time_of_day(&self) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(&self.time, "%H:%M").ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_time() {
        let slot = ScheduleSlot {
            id: "s1".into(),
            time: "09:30".into(),
            enabled: true,
            session_type: SessionType::Regular,
        };
        assert_eq!(
            slot.time_of_day(),
            NaiveTime::from_hms_opt(9, 30, 0)
        );
    }

    #[test]
    fn rejects_malformed_time() {
        let slot = ScheduleSlot {
            id: "s1".into(),
            time: "25:99".into(),
            enabled: true,
            session_type: SessionType::Regular,
        };
        assert!(slot.time_of_day().is_none());
    }
}
