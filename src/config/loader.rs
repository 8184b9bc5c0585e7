use crate::config::schema::{DispatcherConfig, TelegramConfig};
use crate::error::{Error, Result};
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use validator::Validate;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads, merges parents, applies environment overrides and validates.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<DispatcherConfig> {
        let mut config = Self::load_without_env(path)?;
        Self::apply_overrides(&mut config, |key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn load_without_env<P: AsRef<Path>>(path: P) -> Result<DispatcherConfig> {
        let mut visited = HashSet::new();
        let merged = Self::load_with_inheritance(path.as_ref(), &mut visited)?;
        let mut config: DispatcherConfig = serde_json::from_value(merged)?;
        config.extends = None;
        config.validate()?;
        Ok(config)
    }

    fn load_with_inheritance(path: &Path, visited: &mut HashSet<PathBuf>) -> Result<Value> {
        let path = fs::canonicalize(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;

        if visited.contains(&path) {
            return Err(Error::Config(format!(
                "Circular inheritance detected involving {}",
                path.display()
            )));
        }
        visited.insert(path.clone());

        let config = Self::load_file(&path)?;

        let parent = config.get("extends").and_then(Value::as_str).map(str::to_string);
        match parent {
            Some(parent_path_str) => {
                let parent_path = path
                    .parent()
                    .ok_or_else(|| {
                        Error::Config(format!(
                            "Cannot determine parent directory for {}",
                            path.display()
                        ))
                    })?
                    .join(parent_path_str);

                let mut parent_config = Self::load_with_inheritance(&parent_path, visited)?;
                merge_values(&mut parent_config, config);
                Ok(parent_config)
            }
            None => Ok(config),
        }
    }

    fn load_file(path: &Path) -> Result<Value> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;

        let value: Value = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
            Some("toml") => toml::from_str(&content)?,
            _ => {
                return Err(Error::Config(format!(
                    "Unsupported file extension: {}",
                    path.display()
                )));
            }
        };

        if !value.is_object() {
            return Err(Error::Config(format!(
                "{}: top level must be a table",
                path.display()
            )));
        }
        Ok(value)
    }

    /// Secrets and the run mode can come from the environment instead of the file.
    pub fn apply_overrides<F>(config: &mut DispatcherConfig, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("TELEGRAM_BOT_TOKEN") {
            config
                .alerts
                .telegram
                .get_or_insert_with(TelegramConfig::default)
                .bot_token = token;
        }
        if let Some(chat_id) = lookup("TELEGRAM_CHAT_ID") {
            config
                .alerts
                .telegram
                .get_or_insert_with(TelegramConfig::default)
                .chat_id = chat_id;
        }
        if let Some(password) = lookup("SMTP_PASSWORD") {
            if let Some(email) = config.alerts.email.as_mut() {
                email.password = password;
            }
        }
        if let Some(flag) = lookup("SCRAPER_SINGLE_RUN") {
            config.single_run = matches!(flag.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }
    }
}

/// Child tables are merged key by key; any other child value replaces the parent's.
fn merge_values(parent: &mut Value, child: Value) {
    match (parent, child) {
        (Value::Object(parent), Value::Object(child)) => {
            for (key, value) in child {
                let both_tables = value.is_object() && parent.get(&key).is_some_and(Value::is_object);
                match parent.get_mut(&key) {
                    Some(existing) if both_tables => merge_values(existing, value),
                    _ => {
                        parent.insert(key, value);
                    }
                }
            }
        }
        (parent, child) => *parent = child,
    }
}
