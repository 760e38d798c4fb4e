pub mod controller;
pub mod events;
pub mod state;

pub use controller::{SessionConfig, SessionController, SlotBinding, TimerSnapshot};
pub use events::TimerEvent;
pub use state::{ResumeState, SessionTotals, TimerState, TimerStatus};
