use crate::alert::AlertManager;
use crate::config::schema::DispatcherConfig;
use crate::proxy::ProxyManager;
use crate::shutdown::ShutdownSignal;
use crate::storage::Storage;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::Serialize;
use std::future::Future;
use std::ops::AddAssign;
use std::sync::Arc;

/// Everything an executor gets handed for one category run.
#[derive(Clone)]
pub struct ScrapeContext {
    pub category: String,
    /// `None` when the dispatcher runs without a proxy pool.
    pub proxies: Option<Arc<ProxyManager>>,
    pub alerts: Arc<AlertManager>,
    pub storage: Arc<dyn Storage>,
    pub config: Arc<DispatcherConfig>,
    pub shutdown: ShutdownSignal,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScrapeOutcome {
    pub items_scraped: u64,
    pub errors: u64,
}

impl ScrapeOutcome {
    pub fn new(items_scraped: u64, errors: u64) -> Self {
        Self {
            items_scraped,
            errors,
        }
    }

    /// A run that produced nothing and counts as one error.
    pub fn failed() -> Self {
        Self::new(0, 1)
    }
}

impl AddAssign for ScrapeOutcome {
    fn add_assign(&mut self, other: Self) {
        self.items_scraped += other.items_scraped;
        self.errors += other.errors;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CategoryOutcome {
    pub items_scraped: u64,
    pub errors: u64,
    /// Per-site breakdown in execution order.
    pub sites: Vec<(String, ScrapeOutcome)>,
}

impl CategoryOutcome {
    pub fn record(&mut self, site: &str, outcome: ScrapeOutcome) {
        self.items_scraped += outcome.items_scraped;
        self.errors += outcome.errors;
        self.sites.push((site.to_string(), outcome));
    }

    pub fn totals(&self) -> ScrapeOutcome {
        ScrapeOutcome::new(self.items_scraped, self.errors)
    }

    pub fn site(&self, name: &str) -> Option<ScrapeOutcome> {
        self.sites
            .iter()
            .find(|(site, _)| site == name)
            .map(|(_, outcome)| *outcome)
    }
}

/// A site extractor with a structured result.
#[async_trait]
pub trait SiteScraper: Send + Sync {
    async fn run_scraper(&self, ctx: &ScrapeContext) -> anyhow::Result<ScrapeOutcome>;
}

pub type BlockingEntry = Arc<dyn Fn(ScrapeContext) -> anyhow::Result<()> + Send + Sync>;
pub type AsyncEntry = Arc<dyn Fn(ScrapeContext) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// How a registered site is invoked.
///
/// Legacy entries report no counts; the blocking form runs on the blocking
/// thread pool so it cannot stall the scheduler.
#[derive(Clone)]
pub enum SiteEntry {
    Structured(Arc<dyn SiteScraper>),
    LegacyBlocking(BlockingEntry),
    LegacyAsync(AsyncEntry),
}

impl SiteEntry {
    pub fn structured<S: SiteScraper + 'static>(scraper: S) -> Self {
        SiteEntry::Structured(Arc::new(scraper))
    }

    pub fn blocking<F>(entry: F) -> Self
    where
        F: Fn(ScrapeContext) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        SiteEntry::LegacyBlocking(Arc::new(entry))
    }

    pub fn legacy_async<F, Fut>(entry: F) -> Self
    where
        F: Fn(ScrapeContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        SiteEntry::LegacyAsync(Arc::new(move |ctx: ScrapeContext| -> BoxFuture<'static, anyhow::Result<()>> {
            Box::pin(entry(ctx))
        }))
    }
}

#[derive(Clone)]
pub struct Site {
    pub name: String,
    /// Higher runs first.
    pub priority: i32,
    pub entry: SiteEntry,
}

impl Site {
    pub fn new(name: impl Into<String>, priority: i32, entry: SiteEntry) -> Self {
        Self {
            name: name.into(),
            priority,
            entry,
        }
    }
}

/// Runs a whole category. Custom executors registered for a category take
/// precedence over the generic [`crate::runner::CategoryRunner`].
#[async_trait]
pub trait CategoryExecutor: Send + Sync {
    async fn run(
        &self,
        ctx: ScrapeContext,
        sites: Option<Vec<String>>,
    ) -> anyhow::Result<CategoryOutcome>;
}
