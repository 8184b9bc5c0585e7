use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryStats {
    pub name: String,
    pub items_scraped: u64,
    pub errors: u64,
    pub runs: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub last_duration_secs: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub categories: Vec<CategoryStats>,
    pub cycles_completed: u64,
    pub total_items: u64,
    pub total_errors: u64,
    pub elapsed_seconds: f64,
}

impl StatsSnapshot {
    pub fn category(&self, name: &str) -> Option<&CategoryStats> {
        self.categories.iter().find(|c| c.name == name)
    }
}
