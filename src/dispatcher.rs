use crate::alert::AlertManager;
use crate::alert::manager::format_duration;
use crate::config::schema::DispatcherConfig;
use crate::error::{Error, Result};
use crate::proxy::{ProxyManager, ProxyScorer, ProxySource};
use crate::registry::Registry;
use crate::runner::{CategoryRunner, panic_message};
use crate::shutdown::ShutdownSignal;
use crate::site::{CategoryExecutor, ScrapeContext, ScrapeOutcome};
use crate::stats::{StatsCollector, StatsSnapshot};
use crate::storage::Storage;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    NotStarted,
    Initializing,
    Running,
    ShuttingDown,
    Stopped,
}

/// Result of one pass over the configured categories.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub cycle: u64,
    /// Categories that ran, in configured order.
    pub results: Vec<(String, ScrapeOutcome)>,
    pub duration: Duration,
    /// Set when shutdown cut the cycle short.
    pub interrupted: bool,
}

impl CycleReport {
    pub fn get(&self, category: &str) -> Option<ScrapeOutcome> {
        self.results
            .iter()
            .find(|(name, _)| name == category)
            .map(|(_, outcome)| *outcome)
    }

    pub fn totals(&self) -> ScrapeOutcome {
        let mut total = ScrapeOutcome::default();
        for (_, outcome) in &self.results {
            total += *outcome;
        }
        total
    }
}

/// Top-level scheduler: runs every configured category once per cycle until
/// single-run completion or shutdown.
pub struct Dispatcher {
    config: Arc<DispatcherConfig>,
    registry: Registry,
    alerts: Arc<AlertManager>,
    storage: Arc<dyn Storage>,
    proxy_source: Box<dyn ProxySource>,
    proxies: Option<Arc<ProxyManager>>,
    stats: Arc<StatsCollector>,
    shutdown: ShutdownSignal,
    state: watch::Sender<DispatcherState>,
    cycle: u64,
}

impl Dispatcher {
    pub fn new(
        config: DispatcherConfig,
        registry: Registry,
        alerts: Arc<AlertManager>,
        storage: Arc<dyn Storage>,
        proxy_source: Box<dyn ProxySource>,
    ) -> Self {
        let (state_tx, _) = watch::channel(DispatcherState::NotStarted);
        let stats = Arc::new(StatsCollector::new());
        stats.register(config.category_names());

        Self {
            config: Arc::new(config),
            registry,
            alerts,
            storage,
            proxy_source,
            proxies: None,
            stats,
            shutdown: ShutdownSignal::new(),
            state: state_tx,
            cycle: 0,
        }
    }

    pub fn state(&self) -> DispatcherState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<DispatcherState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: DispatcherState) {
        log::debug!("Dispatcher state -> {:?}", state);
        self.state.send_replace(state);
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn proxy_manager(&self) -> Option<Arc<ProxyManager>> {
        self.proxies.clone()
    }

    pub fn alerts(&self) -> Arc<AlertManager> {
        self.alerts.clone()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn watch_stats(&self) -> watch::Receiver<StatsSnapshot> {
        let (tx, rx) = watch::channel(self.stats.snapshot());
        let stats = self.stats.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(500));
            loop {
                interval.tick().await;
                if tx.send(stats.snapshot()).is_err() {
                    break;
                }
            }
        });
        rx
    }

    /// Fetches the proxy pool. A failed or empty fetch leaves the dispatcher
    /// running without proxies.
    pub async fn initialize(&mut self) {
        self.set_state(DispatcherState::Initializing);
        log::info!("Fetching proxy pool from {}", self.proxy_source.describe());

        self.proxies = match self.proxy_source.fetch().await {
            Ok(pool) if !pool.is_empty() => {
                let scorer = match &self.config.proxy.score_file {
                    Some(path) => ProxyScorer::load(path),
                    None => ProxyScorer::in_memory(),
                };
                log::info!("Loaded {} proxies", pool.len());
                Some(Arc::new(ProxyManager::new(pool, scorer)))
            }
            Ok(_) => {
                log::info!("No proxies available; running direct");
                None
            }
            Err(e) => {
                log::warn!("Proxy pool fetch failed: {}; running direct", e);
                None
            }
        };

        self.stats.register(self.config.category_names());
    }

    pub fn print_config_summary(&self) {
        log::info!("Dispatcher configuration:");
        log::info!("  Categories: {}", self.config.category_names().join(", "));
        for category in &self.config.categories {
            log::info!(
                "    {}: timeout {}, stagger {}, {} registered sites{}",
                category.name,
                format_duration(self.config.timeout_for(&category.name)),
                format_duration(self.config.stagger_for(&category.name)),
                self.registry.sites(&category.name).len(),
                if self.registry.executor(&category.name).is_some() {
                    " (custom executor)"
                } else {
                    ""
                }
            );
        }
        log::info!(
            "  Mode: {}",
            if self.config.single_run {
                "single run".to_string()
            } else {
                format!("continuous, {} between cycles", format_duration(self.config.cycle_delay()))
            }
        );
        log::info!(
            "  Alert thresholds: errors {}, blocks {}, captchas {}",
            self.config.alerts.error_threshold,
            self.config.alerts.block_threshold,
            self.config.alerts.captcha_threshold
        );
        log::info!(
            "  Alert channels: {}",
            match self.alerts.channel_names() {
                names if names.is_empty() => "log only".to_string(),
                names => names.join(", "),
            }
        );
    }

    /// Runs cycles until done, then always goes through [`Dispatcher::shutdown`].
    pub async fn run(&mut self) -> Result<()> {
        if self.state() != DispatcherState::NotStarted {
            return Err(Error::Internal("dispatcher already started".to_string()));
        }
        self.print_config_summary();

        let outcome = AssertUnwindSafe(self.run_loop()).catch_unwind().await;
        let (reason, result) = match outcome {
            Ok(()) if self.shutdown.is_triggered() => ("shutdown requested", Ok(())),
            Ok(()) => ("run complete", Ok(())),
            Err(panic) => {
                let message = panic_message(&*panic);
                log::error!("Dispatcher main loop crashed: {}", message);
                self.alerts.on_fatal(&message).await;
                ("fatal error", Err(Error::Internal(message)))
            }
        };

        self.shutdown(reason).await;
        result
    }

    async fn run_loop(&mut self) {
        self.initialize().await;
        self.set_state(DispatcherState::Running);

        let proxies = self.proxies.as_ref().map(|p| p.len()).unwrap_or(0);
        self.alerts
            .on_startup(&self.config.category_names(), proxies)
            .await;

        loop {
            if self.shutdown.is_triggered() {
                break;
            }

            self.run_cycle().await;

            if self.config.single_run {
                log::info!("Single run complete");
                break;
            }

            let delay = self.config.cycle_delay();
            log::info!("Next cycle in {}", format_duration(delay));
            if !self.shutdown.sleep(delay).await {
                break;
            }
        }
    }

    pub async fn run_cycle(&mut self) -> CycleReport {
        self.cycle += 1;
        let mut report = CycleReport {
            cycle: self.cycle,
            ..CycleReport::default()
        };
        let started = Instant::now();
        log::info!("=== Cycle {} starting ===", report.cycle);

        for (index, category) in self.config.category_names().iter().enumerate() {
            if self.shutdown.is_triggered() {
                log::info!("Shutdown requested; ending cycle {} early", report.cycle);
                report.interrupted = true;
                break;
            }

            if index > 0 {
                let delay = self.config.stagger_for(category);
                if !delay.is_zero() {
                    log::info!("Waiting {} before {}", format_duration(delay), category);
                }
                if !self.shutdown.sleep(delay).await {
                    log::info!("Shutdown during stagger delay; ending cycle {}", report.cycle);
                    report.interrupted = true;
                    break;
                }
            }

            let outcome = self.run_category(category).await;
            report.results.push((category.clone(), outcome));
        }

        report.duration = started.elapsed();
        self.stats.increment_cycles();

        let summary: Vec<(String, u64, u64)> = report
            .results
            .iter()
            .map(|(name, o)| (name.clone(), o.items_scraped, o.errors))
            .collect();
        self.alerts
            .on_cycle_complete(report.cycle, &summary, report.duration)
            .await;

        log::info!(
            "=== Cycle {} finished in {}: {} items, {} errors ===",
            report.cycle,
            format_duration(report.duration),
            report.totals().items_scraped,
            report.totals().errors
        );
        report
    }

    fn context(&self, category: &str) -> ScrapeContext {
        ScrapeContext {
            category: category.to_string(),
            proxies: self.proxies.clone(),
            alerts: self.alerts.clone(),
            storage: self.storage.clone(),
            config: self.config.clone(),
            shutdown: self.shutdown.clone(),
        }
    }

    fn executor_for(&self, category: &str) -> Arc<dyn CategoryExecutor> {
        match self.registry.executor(category) {
            Some(custom) => custom,
            None => Arc::new(CategoryRunner::from_registry(
                &self.registry,
                &self.config,
                category,
            )),
        }
    }

    /// Runs one category under its timeout. Never fails: errors, panics and
    /// timeouts are each counted as one error.
    ///
    /// On timeout the category task is detached, not cancelled; it keeps running
    /// until it finishes or notices the shutdown signal.
    pub async fn run_category(&self, category: &str) -> ScrapeOutcome {
        let started = Instant::now();
        let executor = self.executor_for(category);
        let ctx = self.context(category);
        let sites = self
            .config
            .category(category)
            .and_then(|c| c.only_sites.clone());
        let timeout = self.config.timeout_for(category);

        log::info!("[{}] Starting category (timeout {})", category, format_duration(timeout));
        let task = tokio::spawn(async move { executor.run(ctx, sites).await });

        let outcome = match tokio::time::timeout(timeout, task).await {
            Ok(Ok(Ok(result))) => result.totals(),
            Ok(Ok(Err(e))) => {
                log::error!("[{}] Category failed: {:?}", category, e);
                self.alerts
                    .on_scrape_error(category, &format!("{:#}", e), None)
                    .await;
                ScrapeOutcome::failed()
            }
            Ok(Err(join)) => {
                let message = if join.is_panic() {
                    panic_message(&*join.into_panic())
                } else {
                    join.to_string()
                };
                log::error!("[{}] Category task crashed: {}", category, message);
                self.alerts.on_scrape_error(category, &message, None).await;
                ScrapeOutcome::failed()
            }
            Err(_) => {
                log::warn!(
                    "[{}] Timed out after {}; abandoning",
                    category,
                    format_duration(timeout)
                );
                self.alerts.on_category_timeout(category, timeout).await;
                ScrapeOutcome::failed()
            }
        };

        let duration = started.elapsed();
        self.stats.record_category(category, outcome, duration);
        self.alerts
            .on_category_complete(category, outcome.items_scraped, outcome.errors, duration)
            .await;
        outcome
    }

    /// Only flips the shared signal; safe to call from a signal handler task.
    pub fn request_shutdown(&self, reason: &str) {
        self.shutdown.request(reason);
    }

    pub async fn shutdown(&self, reason: &str) {
        if matches!(
            self.state(),
            DispatcherState::ShuttingDown | DispatcherState::Stopped
        ) {
            log::debug!("Shutdown already done; ignoring ({})", reason);
            return;
        }
        self.set_state(DispatcherState::ShuttingDown);
        self.shutdown.trigger();
        log::info!("Shutting down: {}", reason);

        let totals = self.stats.totals();
        let runtime = self.stats.elapsed();
        self.alerts
            .on_shutdown(reason, totals.items_scraped, totals.errors, runtime)
            .await;
        self.alerts.close().await;
        if let Err(e) = self.storage.close().await {
            log::warn!("Failed to close storage: {}", e);
        }

        for category in self.stats.snapshot().categories {
            log::info!(
                "  {}: {} items, {} errors over {} runs",
                category.name,
                category.items_scraped,
                category.errors,
                category.runs
            );
        }
        log::info!(
            "Final totals: {} items, {} errors, runtime {}",
            totals.items_scraped,
            totals.errors,
            format_duration(runtime)
        );

        self.set_state(DispatcherState::Stopped);
    }
}
