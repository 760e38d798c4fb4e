use std::{collections::HashSet, fs, path::PathBuf, sync::RwLock};

use anyhow::{bail, Context, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::models::{IntervalPlan, ScheduleSlot};

/// Default pump/rest cycle used when a session is started without an
/// explicit interval list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimerDefaults {
    pub pump_mins: u32,
    pub rest_mins: u32,
    pub pump_count: u32,
}

impl Default for TimerDefaults {
    fn default() -> Self {
        Self {
            pump_mins: 15,
            rest_mins: 5,
            pump_count: 3,
        }
    }
}

impl TimerDefaults {
    pub fn to_plan(&self) -> Option<IntervalPlan> {
        IntervalPlan::from_cycle(self.pump_mins * 60, self.rest_mins * 60, self.pump_count)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserSettings {
    session_schedule: Vec<ScheduleSlot>,
    timer_defaults: TimerDefaults,
    late_threshold_mins: u32,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            session_schedule: Vec::new(),
            timer_defaults: TimerDefaults::default(),
            late_threshold_mins: 15,
        }
    }
}

/// JSON-file-backed user preferences: the daily schedule, the default timer
/// cycle and the adherence threshold. Schedule writes validate slot times
/// here so downstream readers can treat "HH:mm" as well-formed.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn schedule(&self) -> Vec<ScheduleSlot> {
        self.data.read().unwrap().session_schedule.clone()
    }

    pub fn update_schedule(&self, slots: Vec<ScheduleSlot>) -> Result<()> {
        validate_schedule(&slots)?;
        let mut guard = self.data.write().unwrap();
        guard.session_schedule = slots;
        self.persist(&guard)
    }

    pub fn timer_defaults(&self) -> TimerDefaults {
        self.data.read().unwrap().timer_defaults.clone()
    }

    pub fn update_timer_defaults(&self, defaults: TimerDefaults) -> Result<()> {
        if defaults.to_plan().is_none() {
            bail!("timer defaults do not produce a usable interval plan");
        }
        let mut guard = self.data.write().unwrap();
        guard.timer_defaults = defaults;
        self.persist(&guard)
    }

    pub fn late_threshold_mins(&self) -> u32 {
        self.data.read().unwrap().late_threshold_mins
    }

    pub fn update_late_threshold_mins(&self, mins: u32) -> Result<()> {
        let mut guard = self.data.write().unwrap();
        guard.late_threshold_mins = mins;
        self.persist(&guard)
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

fn validate_schedule(slots: &[ScheduleSlot]) -> Result<()> {
    let mut seen = HashSet::new();
    for slot in slots {
        if NaiveTime::parse_from_str(&slot.time, "%H:%M").is_err() {
            bail!("slot {} has invalid time {:?}", slot.id, slot.time);
        }
        if !seen.insert(slot.id.as_str()) {
            bail!("duplicate slot id {}", slot.id);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SessionType;
    use uuid::Uuid;

    fn temp_store() -> SettingsStore {
        let path = std::env::temp_dir().join(format!("pumplog-settings-{}.json", Uuid::new_v4()));
        SettingsStore::new(path).unwrap()
    }

    fn slot(id: &str, time: &str) -> ScheduleSlot {
        ScheduleSlot {
            id: id.into(),
            time: time.into(),
            enabled: true,
            session_type: SessionType::Regular,
        }
    }

    #[test]
    fn schedule_roundtrips_through_disk() {
        let store = temp_store();
        store
            .update_schedule(vec![slot("a", "07:30"), slot("b", "12:00")])
            .unwrap();

        let reloaded = SettingsStore::new(store.path.clone()).unwrap();
        assert_eq!(reloaded.schedule(), store.schedule());
    }

    #[test]
    fn rejects_malformed_slot_times() {
        let store = temp_store();
        assert!(store.update_schedule(vec![slot("a", "7h30")]).is_err());
        assert!(store.update_schedule(vec![slot("a", "24:00")]).is_err());
        assert!(store.schedule().is_empty());
    }

    #[test]
    fn rejects_duplicate_slot_ids() {
        let store = temp_store();
        let result = store.update_schedule(vec![slot("a", "07:30"), slot("a", "12:00")]);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_degenerate_timer_defaults() {
        let store = temp_store();
        assert!(store
            .update_timer_defaults(TimerDefaults {
                pump_mins: 0,
                rest_mins: 5,
                pump_count: 2,
            })
            .is_err());
        assert_eq!(store.timer_defaults(), TimerDefaults::default());
    }
}
