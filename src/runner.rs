use crate::config::schema::DispatcherConfig;
use crate::registry::Registry;
use crate::site::{CategoryExecutor, CategoryOutcome, ScrapeContext, ScrapeOutcome, Site, SiteEntry};
use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};

/// Runs the sites registered under one category, one after another.
pub struct CategoryRunner {
    category: String,
    sites: Vec<Site>,
    site_delay: Duration,
}

impl CategoryRunner {
    /// Sites run in descending priority; equal priorities keep the given order.
    pub fn new(category: impl Into<String>, sites: Vec<Site>, site_delay: Duration) -> Self {
        let mut sites = sites;
        sites.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self {
            category: category.into(),
            sites,
            site_delay,
        }
    }

    /// Generic runner for `category`, minus the sites excluded in its config.
    pub fn from_registry(registry: &Registry, config: &DispatcherConfig, category: &str) -> Self {
        let excluded: &[String] = config
            .category(category)
            .map(|c| c.excluded_sites.as_slice())
            .unwrap_or(&[]);

        let sites = registry
            .sites(category)
            .iter()
            .filter(|site| !excluded.contains(&site.name))
            .cloned()
            .collect();

        Self::new(category, sites, config.site_delay())
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn sites(&self) -> &[Site] {
        &self.sites
    }

    pub async fn run_site(&self, site: &Site, ctx: &ScrapeContext) -> ScrapeOutcome {
        let started = Instant::now();
        log::info!("[{}] Starting site {}", self.category, site.name);

        let result = match &site.entry {
            SiteEntry::Structured(scraper) => {
                match AssertUnwindSafe(scraper.run_scraper(ctx)).catch_unwind().await {
                    Ok(result) => result,
                    Err(panic) => Err(anyhow::anyhow!("site panicked: {}", panic_message(&*panic))),
                }
            }
            SiteEntry::LegacyAsync(entry) => {
                match AssertUnwindSafe(entry(ctx.clone())).catch_unwind().await {
                    Ok(result) => result.map(|()| ScrapeOutcome::default()),
                    Err(panic) => Err(anyhow::anyhow!("site panicked: {}", panic_message(&*panic))),
                }
            }
            SiteEntry::LegacyBlocking(entry) => {
                let entry = entry.clone();
                let ctx = ctx.clone();
                match tokio::task::spawn_blocking(move || entry(ctx)).await {
                    Ok(result) => result.map(|()| ScrapeOutcome::default()),
                    Err(join) if join.is_panic() => Err(anyhow::anyhow!(
                        "site panicked: {}",
                        panic_message(&*join.into_panic())
                    )),
                    Err(join) => Err(anyhow::anyhow!("site task failed: {}", join)),
                }
            }
        };

        match result {
            Ok(outcome) => {
                log::info!(
                    "[{}] Site {} finished in {:.1}s: {} items, {} errors",
                    self.category,
                    site.name,
                    started.elapsed().as_secs_f64(),
                    outcome.items_scraped,
                    outcome.errors
                );
                outcome
            }
            Err(e) => {
                log::error!("[{}] Site {} failed: {:?}", self.category, site.name, e);
                ScrapeOutcome::failed()
            }
        }
    }
}

#[async_trait]
impl CategoryExecutor for CategoryRunner {
    async fn run(
        &self,
        ctx: ScrapeContext,
        sites: Option<Vec<String>>,
    ) -> anyhow::Result<CategoryOutcome> {
        let selected: Vec<&Site> = self
            .sites
            .iter()
            .filter(|site| sites.as_ref().is_none_or(|only| only.contains(&site.name)))
            .collect();

        if selected.is_empty() {
            log::warn!("[{}] No sites to run", self.category);
        }

        let mut outcome = CategoryOutcome::default();
        for (index, site) in selected.iter().enumerate() {
            if ctx.shutdown.is_triggered() {
                log::info!(
                    "[{}] Shutdown requested; skipping {} remaining sites",
                    self.category,
                    selected.len() - index
                );
                break;
            }

            let site_outcome = self.run_site(site, &ctx).await;
            outcome.record(&site.name, site_outcome);

            if index + 1 < selected.len() {
                ctx.shutdown.sleep(self.site_delay).await;
            }
        }

        Ok(outcome)
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
