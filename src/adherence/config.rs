/// Tunable thresholds for schedule-adherence classification.
#[derive(Debug, Clone)]
pub struct AdherenceConfig {
    /// A matched session starting within this many minutes of its slot is
    /// still On-Time.
    pub late_threshold_mins: u32,

    /// A slot with no matching session is only Missed once this many minutes
    /// have passed since its scheduled time; before that it is not yet due.
    pub missed_grace_mins: u32,

    /// Fallback matching: a same-day session starting within this window of
    /// the slot time counts as covering the slot. Independent of the grace
    /// period.
    pub proximity_window_mins: u32,
}

impl Default for AdherenceConfig {
    fn default() -> Self {
        Self {
            late_threshold_mins: 15,
            missed_grace_mins: 30,
            proximity_window_mins: 120,
        }
    }
}
