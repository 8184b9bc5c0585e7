use crate::site::ScrapeOutcome;
use crate::stats::snapshot::{CategoryStats, StatsSnapshot};
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Cumulative per-category counters for the lifetime of the process.
pub struct StatsCollector {
    categories: Mutex<Vec<CategoryStats>>,
    cycles_completed: AtomicU64,
    start_time: Instant,
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self {
            categories: Mutex::new(Vec::new()),
            cycles_completed: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a zeroed entry for every name not tracked yet. Existing counters are kept.
    pub fn register<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut categories = self.categories.lock();
        for name in names {
            let name = name.into();
            if !categories.iter().any(|c| c.name == name) {
                categories.push(CategoryStats {
                    name,
                    ..CategoryStats::default()
                });
            }
        }
    }

    pub fn record_category(&self, name: &str, outcome: ScrapeOutcome, duration: Duration) {
        let mut categories = self.categories.lock();
        let index = match categories.iter().position(|c| c.name == name) {
            Some(index) => index,
            None => {
                categories.push(CategoryStats {
                    name: name.to_string(),
                    ..CategoryStats::default()
                });
                categories.len() - 1
            }
        };

        let stats = &mut categories[index];
        stats.items_scraped += outcome.items_scraped;
        stats.errors += outcome.errors;
        stats.runs += 1;
        stats.last_run = Some(Utc::now());
        stats.last_duration_secs = duration.as_secs_f64();
    }

    pub fn increment_cycles(&self) -> u64 {
        self.cycles_completed.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn totals(&self) -> ScrapeOutcome {
        let categories = self.categories.lock();
        ScrapeOutcome::new(
            categories.iter().map(|c| c.items_scraped).sum(),
            categories.iter().map(|c| c.errors).sum(),
        )
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let categories = self.categories.lock().clone();
        StatsSnapshot {
            total_items: categories.iter().map(|c| c.items_scraped).sum(),
            total_errors: categories.iter().map(|c| c.errors).sum(),
            categories,
            cycles_completed: self.cycles_completed.load(Ordering::SeqCst),
            elapsed_seconds: self.start_time.elapsed().as_secs_f64(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate_across_runs() {
        let stats = StatsCollector::new();
        stats.register(["jobs", "vehicles"]);

        stats.record_category("jobs", ScrapeOutcome::new(10, 1), Duration::from_secs(3));
        stats.record_category("jobs", ScrapeOutcome::new(5, 0), Duration::from_secs(2));

        let snapshot = stats.snapshot();
        let jobs = snapshot.category("jobs").unwrap();
        assert_eq!(jobs.items_scraped, 15);
        assert_eq!(jobs.errors, 1);
        assert_eq!(jobs.runs, 2);
        assert_eq!(jobs.last_duration_secs, 2.0);
        assert!(jobs.last_run.is_some());

        let vehicles = snapshot.category("vehicles").unwrap();
        assert_eq!(vehicles.runs, 0);
        assert_eq!(snapshot.total_items, 15);
        assert_eq!(stats.totals(), ScrapeOutcome::new(15, 1));
    }

    #[test]
    fn register_keeps_existing_counters_and_order() {
        let stats = StatsCollector::new();
        stats.register(["b", "a"]);
        stats.record_category("a", ScrapeOutcome::new(1, 0), Duration::ZERO);
        stats.register(["a", "c"]);

        let snapshot = stats.snapshot();
        let names: Vec<&str> = snapshot.categories.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "c"]);
        assert_eq!(snapshot.category("a").unwrap().items_scraped, 1);
    }

    #[test]
    fn cycles_are_counted() {
        let stats = StatsCollector::new();
        assert_eq!(stats.increment_cycles(), 1);
        assert_eq!(stats.increment_cycles(), 2);
        assert_eq!(stats.snapshot().cycles_completed, 2);
    }
}
