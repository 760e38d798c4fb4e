pub mod adherence;
mod app;
mod db;
pub mod models;
mod settings;
pub mod stats;
pub mod timer;

pub use app::App;
pub use db::Database;
pub use settings::{SettingsStore, TimerDefaults};

/// Initialize logging (reads RUST_LOG env var).
pub fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();
}
