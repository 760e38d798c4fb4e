use std::{sync::Arc, time::Duration};

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use tokio::{sync::broadcast, sync::Mutex, time};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    db::Database,
    models::{
        IntervalPlan, Session, SessionInfo, SessionStatus, SessionType, StoredInterval,
    },
    timer::{
        events::TimerEvent,
        state::{ResumeState, TimerState, TimerStatus},
    },
};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Read model handed to UI callers after every operation.
#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    pub session_id: Option<String>,
    pub target_secs: u32,
    pub remaining_secs: u32,
    pub current_pump: u32,
    pub pump_total: u32,
    pub total_pump_secs: u32,
    pub total_rest_secs: u32,
    pub state: TimerState,
}

/// Binding between a session being started and the schedule slot it covers.
#[derive(Debug, Clone)]
pub struct SlotBinding {
    pub slot_id: String,
    pub scheduled_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub plan: IntervalPlan,
    pub session_type: SessionType,
    pub slot: Option<SlotBinding>,
}

struct ControllerState {
    machine: TimerState,
    session_id: Option<String>,
}

/// Owns the timer state machine for the single active session, drives it
/// from a 1s ticker task, persists session and interval rows as transitions
/// happen, and republishes machine events on a broadcast channel.
#[derive(Clone)]
pub struct SessionController {
    state: Arc<Mutex<ControllerState>>,
    db: Database,
    events: broadcast::Sender<TimerEvent>,
    ticker: Arc<Mutex<Option<CancellationToken>>>,
    tick_interval: Duration,
    heartbeat_every_ticks: u32,
}

impl SessionController {
    pub fn new(db: Database) -> Self {
        let debug_mode = std::env::var("PUMPLOG_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            state: Arc::new(Mutex::new(ControllerState {
                machine: TimerState::new(),
                session_id: None,
            })),
            db,
            events,
            ticker: Arc::new(Mutex::new(None)),
            tick_interval: Duration::from_secs(1),
            heartbeat_every_ticks: if debug_mode { 1 } else { 10 },
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TimerEvent> {
        self.events.subscribe()
    }

    pub async fn get_snapshot(&self) -> TimerSnapshot {
        let mut guard = self.state.lock().await;
        guard.machine.sync(Utc::now());
        snapshot_of(&guard)
    }

    /// Start a fresh session from a configured plan. The session row and the
    /// first open interval row are written before the machine starts ticking.
    pub async fn start_session(&self, config: SessionConfig) -> Result<TimerSnapshot> {
        if config.plan.is_empty() {
            bail!("interval plan is empty");
        }

        {
            let guard = self.state.lock().await;
            if guard.session_id.is_some() {
                bail!("a session is already active");
            }
        }

        let now = Utc::now();
        let session_id = Uuid::new_v4().to_string();

        let lateness_mins = config.slot.as_ref().map(|slot| {
            ((now - slot.scheduled_at).num_milliseconds() / 60_000).max(0) as u32
        });

        let session = Session {
            id: session_id.clone(),
            started_at: now,
            stopped_at: None,
            status: SessionStatus::Running,
            session_type: config.session_type,
            slot_id: config.slot.as_ref().map(|s| s.slot_id.clone()),
            scheduled_at: config.slot.as_ref().map(|s| s.scheduled_at),
            lateness_mins,
            volume_ml: None,
            plan: config.plan.clone(),
            total_pump_secs: 0,
            total_rest_secs: 0,
            created_at: now,
            updated_at: now,
        };
        self.db.insert_session(&session).await?;

        if let Some(first) = config.plan.get(0) {
            self.db
                .insert_interval(&StoredInterval {
                    id: Uuid::new_v4().to_string(),
                    session_id: session_id.clone(),
                    position: 0,
                    kind: first.kind,
                    started_at: now,
                    ended_at: None,
                    duration_secs: 0,
                })
                .await?;
        }

        {
            let mut guard = self.state.lock().await;
            guard.machine.configure(config.plan);
            guard.machine.start(now);
            guard.session_id = Some(session_id.clone());
        }

        self.spawn_ticker().await;
        info!("Started session {session_id}");
        let _ = self.events.send(TimerEvent::SessionStarted {
            session_id,
            at: now,
        });

        Ok(self.get_snapshot().await)
    }

    pub async fn pause(&self) -> TimerSnapshot {
        let now = Utc::now();
        let (snapshot, changed) = {
            let mut guard = self.state.lock().await;
            let was_paused = guard.machine.is_paused();
            guard.machine.pause(now);
            (snapshot_of(&guard), !was_paused && guard.machine.is_paused())
        };
        if changed {
            let _ = self.events.send(TimerEvent::SessionPaused {
                elapsed_secs: snapshot.state.elapsed_secs(),
                at: now,
            });
        }
        snapshot
    }

    pub async fn resume(&self) -> TimerSnapshot {
        let now = Utc::now();
        let (snapshot, changed) = {
            let mut guard = self.state.lock().await;
            let was_paused = guard.machine.is_paused();
            guard.machine.resume(now);
            (snapshot_of(&guard), was_paused && !guard.machine.is_paused())
        };
        if changed {
            let _ = self.events.send(TimerEvent::SessionResumed {
                elapsed_secs: snapshot.state.elapsed_secs(),
                at: now,
            });
        }
        snapshot
    }

    pub async fn dismiss_alarm(&self) -> TimerSnapshot {
        let mut guard = self.state.lock().await;
        guard.machine.dismiss_alarm();
        guard.machine.sync(Utc::now());
        snapshot_of(&guard)
    }

    /// Finalize the current interval and advance.
    pub async fn switch_interval(&self) -> Result<TimerSnapshot> {
        self.advance(|machine, now| machine.switch_interval(now)).await
    }

    /// Finalize the current rest interval and jump to the next pump.
    pub async fn skip_to_next_cycle(&self) -> Result<TimerSnapshot> {
        self.advance(|machine, now| machine.skip_to_next_cycle(now))
            .await
    }

    async fn advance<F>(&self, transition: F) -> Result<TimerSnapshot>
    where
        F: FnOnce(&mut TimerState, DateTime<Utc>) -> Vec<TimerEvent>,
    {
        let now = Utc::now();
        let (events, session_id, next_open) = {
            let mut guard = self.state.lock().await;
            let events = transition(&mut guard.machine, now);
            let next_open = if guard.machine.status() == TimerStatus::Running
                && !events.is_empty()
            {
                guard
                    .machine
                    .plan()
                    .get(guard.machine.current_index())
                    .map(|spec| (guard.machine.current_index(), spec.kind))
            } else {
                None
            };
            (events, guard.session_id.clone(), next_open)
        };

        if let Some(session_id) = session_id.filter(|_| !events.is_empty()) {
            for event in &events {
                if let TimerEvent::IntervalCompleted { duration_secs, .. } = event {
                    self.db
                        .finalize_open_interval(&session_id, now, *duration_secs)
                        .await?;
                }
            }
            if let Some((position, kind)) = next_open {
                self.db
                    .insert_interval(&StoredInterval {
                        id: Uuid::new_v4().to_string(),
                        session_id: session_id.clone(),
                        position,
                        kind,
                        started_at: now,
                        ended_at: None,
                        duration_secs: 0,
                    })
                    .await?;
            }
        }

        for event in events {
            let _ = self.events.send(event);
        }
        Ok(self.get_snapshot().await)
    }

    /// Finalize the session: close or discard the open interval row, write
    /// the per-kind totals, and reset the machine.
    pub async fn stop_session(&self) -> Result<SessionInfo> {
        let now = Utc::now();
        let (totals, session_id, open_elapsed) = {
            let mut guard = self.state.lock().await;
            let session_id = match guard.session_id.take() {
                Some(id) => id,
                None => bail!("no active session to stop"),
            };
            guard.machine.sync(now);
            let open_elapsed = (guard.machine.status() == TimerStatus::Running)
                .then(|| guard.machine.elapsed_secs());
            let totals = guard.machine.stop(now);
            (totals, session_id, open_elapsed)
        };

        self.cancel_ticker().await;

        match open_elapsed {
            Some(elapsed) if elapsed > 0 => {
                self.db
                    .finalize_open_interval(&session_id, now, elapsed)
                    .await?;
            }
            Some(_) => self.db.delete_open_intervals(&session_id).await?,
            None => {}
        }

        self.db
            .finalize_session(
                &session_id,
                SessionStatus::Completed,
                totals.total_pump_secs,
                totals.total_rest_secs,
                Some(now),
                now,
            )
            .await?;

        info!(
            "Stopped session {session_id}: {}s pumping, {}s resting",
            totals.total_pump_secs, totals.total_rest_secs
        );
        let _ = self.events.send(TimerEvent::SessionStopped {
            session_id: session_id.clone(),
            total_pump_secs: totals.total_pump_secs,
            total_rest_secs: totals.total_rest_secs,
            at: now,
        });

        let session = self
            .db
            .get_session(&session_id)
            .await?
            .ok_or_else(|| anyhow!("session {session_id} disappeared during stop"))?;
        Ok(SessionInfo::from(session))
    }

    /// Abandon the active session. Completed interval rows are kept; the
    /// session is marked Cancelled with whatever totals had accumulated.
    pub async fn cancel_session(&self) -> Result<()> {
        let now = Utc::now();
        let (totals, session_id) = {
            let mut guard = self.state.lock().await;
            let session_id = match guard.session_id.take() {
                Some(id) => id,
                None => return Ok(()),
            };
            let totals = guard.machine.stop(now);
            (totals, session_id)
        };

        self.cancel_ticker().await;
        self.db.delete_open_intervals(&session_id).await?;
        self.db
            .finalize_session(
                &session_id,
                SessionStatus::Cancelled,
                totals.total_pump_secs,
                totals.total_rest_secs,
                Some(now),
                now,
            )
            .await?;
        info!("Cancelled session {session_id}");
        Ok(())
    }

    /// Startup recovery: continue the session that was running when the app
    /// last exited, or mark it Interrupted when its interval rows cannot
    /// produce a resume point.
    pub async fn recover(&self) -> Result<()> {
        let Some(session) = self.db.get_running_session().await? else {
            return Ok(());
        };

        let rows = self.db.list_intervals_for_session(&session.id).await?;
        let now = Utc::now();

        match ResumeState::derive(&rows, now) {
            Some(resume) => {
                {
                    let mut guard = self.state.lock().await;
                    guard.machine.configure(session.plan.clone());
                    guard.machine.resume_from(resume, now);
                    guard.session_id = Some(session.id.clone());
                }
                self.spawn_ticker().await;
                info!("Resumed in-progress session {}", session.id);
            }
            None => {
                warn!(
                    "Session {} has no open interval; marking as Interrupted",
                    session.id
                );
                self.db
                    .finalize_session(
                        &session.id,
                        SessionStatus::Interrupted,
                        session.total_pump_secs,
                        session.total_rest_secs,
                        Some(now),
                        now,
                    )
                    .await?;
            }
        }
        Ok(())
    }

    async fn spawn_ticker(&self) {
        let mut ticker_guard = self.ticker.lock().await;
        if let Some(token) = ticker_guard.take() {
            token.cancel();
        }

        let token = CancellationToken::new();
        let child = token.clone();
        let state = self.state.clone();
        let db = self.db.clone();
        let events = self.events.clone();
        let tick_interval = self.tick_interval;
        let heartbeat_every = self.heartbeat_every_ticks;

        tokio::spawn(async move {
            let mut interval = time::interval(tick_interval);
            let mut ticks: u32 = 0;
            loop {
                tokio::select! {
                    _ = child.cancelled() => break,
                    _ = interval.tick() => {}
                }

                let (tick_events, session_id, pump_secs, rest_secs) = {
                    let mut guard = state.lock().await;
                    if guard.machine.status() != TimerStatus::Running {
                        break;
                    }
                    let tick_events = guard.machine.tick(Utc::now());
                    (
                        tick_events,
                        guard.session_id.clone(),
                        guard.machine.total_pump_secs(),
                        guard.machine.total_rest_secs(),
                    )
                };

                for event in tick_events {
                    let _ = events.send(event);
                }

                ticks = ticks.wrapping_add(1);
                if ticks % heartbeat_every == 0 {
                    if let Some(session_id) = session_id {
                        let db = db.clone();
                        tokio::spawn(async move {
                            let _ = db
                                .update_session_progress(
                                    &session_id,
                                    pump_secs,
                                    rest_secs,
                                    Utc::now(),
                                )
                                .await;
                        });
                    }
                }
            }
        });

        *ticker_guard = Some(token);
    }

    async fn cancel_ticker(&self) {
        if let Some(token) = self.ticker.lock().await.take() {
            token.cancel();
        }
    }
}

fn snapshot_of(guard: &ControllerState) -> TimerSnapshot {
    TimerSnapshot {
        session_id: guard.session_id.clone(),
        target_secs: guard.machine.target_secs(),
        remaining_secs: guard.machine.remaining_secs(),
        current_pump: guard.machine.current_pump(),
        pump_total: guard.machine.pump_total(),
        total_pump_secs: guard.machine.total_pump_secs(),
        total_rest_secs: guard.machine.total_rest_secs(),
        state: guard.machine.clone(),
    }
}
