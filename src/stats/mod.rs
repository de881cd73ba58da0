//! Session statistics for the EMG sensor agent.

pub mod log;

pub use log::{
    create_shared_stats, create_shared_stats_with_persistence, PersistedStats, SessionStats,
    SharedSessionStats, StatsSnapshot,
};
