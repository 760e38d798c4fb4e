//! Composition root: wires the database, settings store and session
//! controller together and exposes the query surface the UI layer calls.

use std::path::Path;

use anyhow::{anyhow, Result};
use chrono::{Days, NaiveTime, Utc};

use crate::{
    adherence::{classify_adherence, AdherenceConfig, AdherenceReport},
    db::Database,
    models::{IntervalPlan, SessionInfo, SessionType},
    settings::SettingsStore,
    stats::{history_summary, HistorySummary},
    timer::{SessionConfig, SessionController, SlotBinding, TimerSnapshot},
};

pub struct App {
    pub db: Database,
    pub settings: SettingsStore,
    pub timer: SessionController,
}

impl App {
    /// Open (or create) the data directory and bring the app up, resuming a
    /// session that was in progress when the process last exited.
    pub async fn init(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;

        let db = Database::new(data_dir.join("pumplog.sqlite3"))?;
        let settings = SettingsStore::new(data_dir.join("settings.json"))?;
        let timer = SessionController::new(db.clone());
        timer.recover().await?;

        Ok(Self {
            db,
            settings,
            timer,
        })
    }

    /// Start a session from an explicit interval plan.
    pub async fn start_session(
        &self,
        plan: IntervalPlan,
        session_type: SessionType,
        slot: Option<SlotBinding>,
    ) -> Result<TimerSnapshot> {
        self.timer
            .start_session(SessionConfig {
                plan,
                session_type,
                slot,
            })
            .await
    }

    /// Start a session using the configured default pump/rest cycle,
    /// optionally linked to one of today's schedule slots.
    pub async fn start_default_session(
        &self,
        slot_id: Option<String>,
    ) -> Result<TimerSnapshot> {
        let defaults = self.settings.timer_defaults();
        let plan = defaults
            .to_plan()
            .ok_or_else(|| anyhow!("configured timer defaults are unusable"))?;

        let slot = match slot_id {
            Some(slot_id) => Some(self.slot_binding(&slot_id)?),
            None => None,
        };
        let session_type = slot
            .as_ref()
            .and_then(|binding| {
                self.settings
                    .schedule()
                    .iter()
                    .find(|s| s.id == binding.slot_id)
                    .map(|s| s.session_type)
            })
            .unwrap_or(SessionType::Regular);

        self.start_session(plan, session_type, slot).await
    }

    fn slot_binding(&self, slot_id: &str) -> Result<SlotBinding> {
        let schedule = self.settings.schedule();
        let slot = schedule
            .iter()
            .find(|s| s.id == slot_id)
            .ok_or_else(|| anyhow!("unknown schedule slot {slot_id}"))?;
        let time = slot
            .time_of_day()
            .ok_or_else(|| anyhow!("slot {slot_id} has an unparseable time"))?;
        Ok(SlotBinding {
            slot_id: slot.id.clone(),
            scheduled_at: Utc::now().date_naive().and_time(time).and_utc(),
        })
    }

    /// Record the expressed volume against a finished session.
    pub async fn log_volume(&self, session_id: &str, volume_ml: f64) -> Result<()> {
        self.db
            .set_session_volume(session_id, volume_ml, Utc::now())
            .await
    }

    pub async fn list_recent_sessions(&self, limit: u32) -> Result<Vec<SessionInfo>> {
        let sessions = self.db.list_recent_sessions(limit).await?;
        Ok(sessions.into_iter().map(SessionInfo::from).collect())
    }

    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.db.delete_session(session_id).await
    }

    /// Schedule-adherence report over the trailing `days`-day window.
    pub async fn adherence_report(
        &self,
        days: u32,
        late_threshold_mins: Option<u32>,
    ) -> Result<AdherenceReport> {
        let now = Utc::now();
        let sessions = self.db.list_sessions_between(window_start(days), now).await?;
        let slots = self.settings.schedule();
        let config = AdherenceConfig {
            late_threshold_mins: late_threshold_mins
                .unwrap_or_else(|| self.settings.late_threshold_mins()),
            ..AdherenceConfig::default()
        };
        Ok(classify_adherence(now, days, &slots, &sessions, &config))
    }

    /// Per-day history rollup over the trailing `days`-day window.
    pub async fn history(&self, days: u32) -> Result<HistorySummary> {
        let now = Utc::now();
        let sessions = self.db.list_sessions_between(window_start(days), now).await?;
        Ok(history_summary(now, days, &sessions))
    }
}

fn window_start(days: u32) -> chrono::DateTime<Utc> {
    let today = Utc::now().date_naive();
    let oldest = today
        .checked_sub_days(Days::new(days.saturating_sub(1) as u64))
        .unwrap_or(today);
    oldest.and_time(NaiveTime::MIN).and_utc()
}
