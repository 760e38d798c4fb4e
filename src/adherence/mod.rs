pub mod classifier;
pub mod config;
pub mod types;

pub use classifier::classify_adherence;
pub use config::AdherenceConfig;
pub use types::{AdherenceDetail, AdherenceReport, AdherenceStatus, DailyAdherence};
