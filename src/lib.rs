pub mod alert;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod proxy;
pub mod registry;
pub mod runner;
pub mod shutdown;
pub mod site;
pub mod sites;
pub mod stats;
pub mod storage;

pub use alert::{AlertChannel, AlertLevel, AlertManager};
pub use dispatcher::{CycleReport, Dispatcher, DispatcherState};
pub use error::{Error, Result};
pub use proxy::{ProxyManager, ProxyScorer, ProxySource};
pub use registry::Registry;
pub use runner::CategoryRunner;
pub use shutdown::ShutdownSignal;
pub use site::{CategoryExecutor, CategoryOutcome, ScrapeContext, ScrapeOutcome, Site, SiteEntry, SiteScraper};
pub use stats::{StatsCollector, StatsSnapshot};
pub use storage::Storage;
