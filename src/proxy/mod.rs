pub mod manager;
pub mod pool;
pub mod scorer;

pub use manager::ProxyManager;
pub use pool::ProxySource;
pub use scorer::{ProxyRecord, ProxyScorer};
