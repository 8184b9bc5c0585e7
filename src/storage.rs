use crate::config::schema::StorageConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use indicatif::MultiProgress;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Sink for extracted records.
///
/// `save` never fails the caller: a record that could not be stored is
/// logged and reported as `false`.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn save(&self, category: &str, item: Value) -> bool;

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

pub struct ConsoleStorage {
    multi: Option<Arc<MultiProgress>>,
}

impl ConsoleStorage {
    pub fn new(multi: Option<Arc<MultiProgress>>) -> Self {
        Self { multi }
    }
}

impl Default for ConsoleStorage {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl Storage for ConsoleStorage {
    async fn save(&self, category: &str, item: Value) -> bool {
        let line = format!("[{}] {}", category, item);
        match &self.multi {
            Some(multi) => {
                if let Err(e) = multi.println(&line) {
                    log::warn!("Failed to print item: {}", e);
                    return false;
                }
            }
            None => println!("{}", line),
        }
        true
    }
}

/// Appends one JSON document per line to `<dir>/<category>.jsonl`.
pub struct JsonLinesStorage {
    dir: PathBuf,
    files: Mutex<HashMap<String, File>>,
}

impl JsonLinesStorage {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            files: Mutex::new(HashMap::new()),
        }
    }

    pub fn path_for(&self, category: &str) -> PathBuf {
        let safe: String = category
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.jsonl", safe))
    }

    async fn append(&self, category: &str, item: &Value) -> Result<()> {
        let mut line = serde_json::to_vec(item)?;
        line.push(b'\n');

        let mut files = self.files.lock().await;
        if !files.contains_key(category) {
            fs::create_dir_all(&self.dir).await?;
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.path_for(category))
                .await?;
            files.insert(category.to_string(), file);
        }
        let file = files
            .get_mut(category)
            .ok_or_else(|| Error::Internal(format!("no output file for {}", category)))?;
        file.write_all(&line).await?;
        Ok(())
    }
}

#[async_trait]
impl Storage for JsonLinesStorage {
    async fn save(&self, category: &str, item: Value) -> bool {
        match self.append(category, &item).await {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Failed to store item for {}: {}", category, e);
                false
            }
        }
    }

    async fn close(&self) -> Result<()> {
        let mut files = self.files.lock().await;
        for (_, file) in files.iter_mut() {
            file.flush().await?;
        }
        files.clear();
        Ok(())
    }
}

/// Discards everything.
pub struct NullStorage;

#[async_trait]
impl Storage for NullStorage {
    async fn save(&self, _category: &str, _item: Value) -> bool {
        true
    }
}

pub fn from_config(config: &StorageConfig, multi: Option<Arc<MultiProgress>>) -> Arc<dyn Storage> {
    match config {
        StorageConfig::Console => Arc::new(ConsoleStorage::new(multi)),
        StorageConfig::Jsonl { dir } => Arc::new(JsonLinesStorage::new(PathBuf::from(dir))),
        StorageConfig::None => Arc::new(NullStorage),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn jsonl_appends_one_line_per_item() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonLinesStorage::new(dir.path().join("out"));

        assert!(storage.save("real estate", json!({"id": 1})).await);
        assert!(storage.save("real estate", json!({"id": 2})).await);
        assert!(storage.save("jobs", json!({"id": 3})).await);
        storage.close().await.unwrap();

        let content = std::fs::read_to_string(dir.path().join("out/real_estate.jsonl")).unwrap();
        let ids: Vec<i64> = content
            .lines()
            .map(|l| serde_json::from_str::<Value>(l).unwrap()["id"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(dir.path().join("out/jobs.jsonl").exists());
    }

    #[tokio::test]
    async fn unwritable_location_reports_false() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();

        let storage = JsonLinesStorage::new(blocker.join("nested"));
        assert!(!storage.save("jobs", json!({"id": 1})).await);
    }

    #[tokio::test]
    async fn null_storage_accepts_everything() {
        assert!(NullStorage.save("jobs", json!(null)).await);
        assert!(NullStorage.close().await.is_ok());
    }
}
