pub mod interval;
pub mod schedule;
pub mod session;

pub use interval::{IntervalKind, IntervalPlan, IntervalSpec, RecordedInterval, StoredInterval};
pub use schedule::ScheduleSlot;
pub use session::{Session, SessionInfo, SessionStatus, SessionType};
