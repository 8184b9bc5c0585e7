use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

pub const NEUTRAL_SCORE: f64 = 50.0;
pub const MIN_SCORE: f64 = 1.0;
const DEFAULT_LATENCY: f64 = 5.0;

/// Observed history of a single proxy, as persisted in the score table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProxyRecord {
    #[serde(default)]
    pub success: u64,
    #[serde(default)]
    pub fail: u64,
    #[serde(default)]
    pub blocked: u64,
    #[serde(default)]
    pub latencies: Vec<f64>,
}

impl ProxyRecord {
    pub fn avg_latency(&self) -> Option<f64> {
        if self.latencies.is_empty() {
            None
        } else {
            Some(self.latencies.iter().sum::<f64>() / self.latencies.len() as f64)
        }
    }

    pub fn score(&self) -> f64 {
        let latency = self.avg_latency().unwrap_or(DEFAULT_LATENCY);
        let raw = 100.0
            - latency * 10.0
            - self.blocked as f64 * 20.0
            - self.fail as f64 * 5.0;
        raw.max(MIN_SCORE)
    }
}

/// Tracks per-proxy outcomes and turns them into a reliability score.
///
/// When backed by a file, the whole table is rewritten in place after every
/// recorded outcome. There is no temp-file rename, so a crash mid-write can
/// leave a truncated table behind, and concurrent dispatcher processes must
/// not share one file.
#[derive(Debug, Default)]
pub struct ProxyScorer {
    path: Option<PathBuf>,
    records: HashMap<String, ProxyRecord>,
}

impl ProxyScorer {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Opens the score table at `path`, starting empty when it is missing or unreadable.
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let records = match Self::read_table(&path) {
            Ok(records) => records,
            Err(e) => {
                log::warn!(
                    "Could not read proxy score table {}: {}. Starting empty.",
                    path.display(),
                    e
                );
                HashMap::new()
            }
        };
        log::debug!("Loaded {} proxy records from {}", records.len(), path.display());

        Self {
            path: Some(path),
            records,
        }
    }

    pub fn read_table(path: &Path) -> Result<HashMap<String, ProxyRecord>> {
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let content = fs::read_to_string(path)?;
        if content.trim().is_empty() {
            return Ok(HashMap::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    pub fn record(&mut self, proxy: &str, success: bool, latency: f64, blocked: bool) {
        let entry = self.records.entry(proxy.to_string()).or_default();
        if success {
            entry.success += 1;
            // non-finite samples serialize as null and would make the table unreadable
            if latency.is_finite() && latency >= 0.0 {
                entry.latencies.push(latency);
            } else {
                log::warn!("Ignoring invalid latency {} for proxy {}", latency, proxy);
            }
        } else {
            entry.fail += 1;
        }
        if blocked {
            entry.blocked += 1;
        }

        if let Err(e) = self.persist() {
            log::warn!("Failed to persist proxy scores: {}", e);
        }
    }

    pub fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, &self.records)?;
        Ok(())
    }

    pub fn score(&self, proxy: &str) -> f64 {
        self.records
            .get(proxy)
            .map(ProxyRecord::score)
            .unwrap_or(NEUTRAL_SCORE)
    }

    /// Orders `proxies` by score, best first. Equal scores keep their input order.
    pub fn rank<'a>(&self, proxies: &'a [String]) -> Vec<(&'a str, f64)> {
        let mut ranked: Vec<(&str, f64)> = proxies
            .iter()
            .map(|p| (p.as_str(), self.score(p)))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }

    pub fn get(&self, proxy: &str) -> Option<&ProxyRecord> {
        self.records.get(proxy)
    }

    pub fn records(&self) -> &HashMap<String, ProxyRecord> {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unseen_proxy_is_neutral() {
        let scorer = ProxyScorer::in_memory();
        assert_eq!(scorer.score("10.0.0.1:8080"), NEUTRAL_SCORE);
        assert_eq!(scorer.score(""), NEUTRAL_SCORE);
    }

    #[test]
    fn score_formula_uses_latency_blocks_and_failures() {
        let mut scorer = ProxyScorer::in_memory();
        scorer.record("p", true, 1.0, false);
        scorer.record("p", true, 3.0, false);
        // avg 2.0 -> 100 - 20
        assert_eq!(scorer.score("p"), 80.0);

        scorer.record("p", false, 100.0, true);
        // failures never add latency samples: 100 - 20 - 20 - 5
        assert_eq!(scorer.score("p"), 55.0);
    }

    #[test]
    fn invalid_latency_does_not_corrupt_the_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scores.json");

        let mut scorer = ProxyScorer::load(&path);
        for _ in 0..5 {
            scorer.record("good:1", true, 0.5, false);
        }
        scorer.record("p:1", true, f64::NAN, false);
        scorer.record("p:1", true, f64::INFINITY, false);
        scorer.record("p:1", true, -1.0, false);

        let reloaded = ProxyScorer::load(&path);
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.get("good:1").unwrap().success, 5);
        let p = reloaded.get("p:1").unwrap();
        assert_eq!(p.success, 3);
        assert!(p.latencies.is_empty());
    }

    #[test]
    fn default_latency_applies_without_successes() {
        let mut scorer = ProxyScorer::in_memory();
        scorer.record("p", false, 100.0, false);
        // 100 - 5*10 - 5
        assert_eq!(scorer.score("p"), 45.0);
        assert!(scorer.get("p").unwrap().latencies.is_empty());
    }

    #[test]
    fn score_never_drops_below_floor() {
        let mut scorer = ProxyScorer::in_memory();
        for _ in 0..500 {
            scorer.record("bad", false, 100.0, true);
        }
        scorer.record("slow", true, 10_000.0, false);

        assert_eq!(scorer.score("bad"), MIN_SCORE);
        assert_eq!(scorer.score("slow"), MIN_SCORE);
    }

    #[test]
    fn rank_is_descending_and_stable() {
        let mut scorer = ProxyScorer::in_memory();
        scorer.record("b", true, 0.5, false);
        scorer.record("c", false, 100.0, true);
        let pool = vec!["a".to_string(), "b".to_string(), "c".to_string(), "d".to_string()];

        let ranked: Vec<&str> = scorer.rank(&pool).into_iter().map(|(p, _)| p).collect();
        assert_eq!(ranked, vec!["b", "a", "d", "c"]);
    }

    #[test]
    fn table_is_rewritten_after_every_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scores.json");

        let mut scorer = ProxyScorer::load(&path);
        scorer.record("1.1.1.1:80", true, 0.8, false);
        scorer.record("1.1.1.1:80", false, 100.0, true);

        let table = ProxyScorer::read_table(&path).unwrap();
        let record = &table["1.1.1.1:80"];
        assert_eq!(record.success, 1);
        assert_eq!(record.fail, 1);
        assert_eq!(record.blocked, 1);
        assert_eq!(record.latencies, vec![0.8]);

        let reloaded = ProxyScorer::load(&path);
        assert_eq!(reloaded.score("1.1.1.1:80"), scorer.score("1.1.1.1:80"));
    }

    #[test]
    fn corrupt_table_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scores.json");
        fs::write(&path, "{\"1.1.1.1:80\": {\"success\": 3, \"fa").unwrap();

        let scorer = ProxyScorer::load(&path);
        assert!(scorer.is_empty());
        assert_eq!(scorer.score("1.1.1.1:80"), NEUTRAL_SCORE);
    }
}
