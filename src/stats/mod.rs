pub mod collector;
pub mod snapshot;

pub use collector::StatsCollector;
pub use snapshot::{CategoryStats, StatsSnapshot};
