use crate::alert::{AlertChannel, AlertLevel, EmailChannel, TelegramChannel};
use crate::config::schema::AlertConfig;
use crate::error::Result;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

/// Every this many scraped items a category reports progress.
pub const PROGRESS_EVERY: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Block,
    Captcha,
}

/// Per-category alert counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlertStats {
    pub consecutive_errors: u32,
    pub blocks_detected: u32,
    pub captchas_detected: u32,
    pub items_scraped: u64,
    pub last_alert_time: Option<DateTime<Utc>>,
    pub last_success_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub errors: u32,
    pub blocks: u32,
    pub captchas: u32,
}

impl From<&AlertConfig> for Thresholds {
    fn from(config: &AlertConfig) -> Self {
        Self {
            errors: config.error_threshold.max(1),
            blocks: config.block_threshold.max(1),
            captchas: config.captcha_threshold.max(1),
        }
    }
}

/// Fans alerts out to the configured channels and debounces noisy events.
///
/// Error, block and captcha events each bump a per-category counter. When a
/// counter reaches its threshold a single alert fires and the counter goes
/// back to zero.
pub struct AlertManager {
    enabled: bool,
    thresholds: Thresholds,
    error_text_limit: usize,
    channels: Vec<Box<dyn AlertChannel>>,
    stats: Mutex<HashMap<String, AlertStats>>,
}

impl AlertManager {
    pub fn new(config: &AlertConfig, channels: Vec<Box<dyn AlertChannel>>) -> Self {
        Self {
            enabled: config.enabled,
            thresholds: Thresholds::from(config),
            error_text_limit: config.error_text_limit,
            channels,
            stats: Mutex::new(HashMap::new()),
        }
    }

    /// Builds the Telegram and email channels described by `config`.
    pub fn from_config(config: &AlertConfig) -> Result<Self> {
        let mut channels: Vec<Box<dyn AlertChannel>> = Vec::new();
        if let Some(telegram) = &config.telegram {
            let channel = TelegramChannel::new(telegram);
            if channel.is_configured() {
                channels.push(Box::new(channel));
            } else {
                log::warn!("Telegram alerts configured without bot token or chat id; skipping");
            }
        }
        if let Some(email) = &config.email {
            channels.push(Box::new(EmailChannel::new(email)?));
        }
        Ok(Self::new(config, channels))
    }

    /// Manager with no channels; alerts are only logged.
    pub fn log_only(config: &AlertConfig) -> Self {
        Self::new(config, Vec::new())
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    pub fn stats(&self, category: &str) -> AlertStats {
        self.stats.lock().get(category).cloned().unwrap_or_default()
    }

    /// Sends `message` to every channel that accepts `level`.
    ///
    /// Returns `true` if at least one channel delivered it.
    pub async fn alert(&self, message: &str, level: AlertLevel) -> bool {
        match level {
            AlertLevel::Info => log::info!("[alert] {}", message),
            AlertLevel::Warning => log::warn!("[alert] {}", message),
            AlertLevel::Error | AlertLevel::Critical => log::error!("[alert] {}", message),
        }

        if !self.enabled {
            return false;
        }

        let text = format!("{} {}", level.emoji(), message);
        let mut delivered = false;
        for channel in self.channels.iter().filter(|c| c.accepts(level)) {
            match channel.send(&text, level).await {
                Ok(()) => delivered = true,
                Err(e) => log::warn!("Alert channel {} failed: {}", channel.name(), e),
            }
        }
        delivered
    }

    pub async fn on_scrape_success(&self, category: &str, site: &str) {
        let items = {
            let mut stats = self.stats.lock();
            let entry = stats.entry(category.to_string()).or_default();
            entry.items_scraped += 1;
            entry.consecutive_errors = 0;
            entry.last_success_time = Some(Utc::now());
            entry.items_scraped
        };

        if items % PROGRESS_EVERY == 0 {
            let message = format!(
                "<b>Progress</b> [{}] {} items scraped (last from {})",
                escape(category),
                items,
                escape(site)
            );
            self.alert(&message, AlertLevel::Info).await;
        }
    }

    pub async fn on_scrape_error(&self, category: &str, error: &str, url: Option<&str>) {
        let fire = {
            let mut stats = self.stats.lock();
            let entry = stats.entry(category.to_string()).or_default();
            entry.consecutive_errors += 1;
            if entry.consecutive_errors >= self.thresholds.errors {
                let count = entry.consecutive_errors;
                entry.consecutive_errors = 0;
                entry.last_alert_time = Some(Utc::now());
                Some(count)
            } else {
                None
            }
        };

        if let Some(count) = fire {
            let mut message = format!(
                "<b>{} consecutive errors</b> in [{}]\n<code>{}</code>",
                count,
                escape(category),
                escape(&truncate(error, self.error_text_limit))
            );
            if let Some(url) = url {
                message.push_str(&format!("\nLast URL: {}", escape(url)));
            }
            self.alert(&message, AlertLevel::Error).await;
        }
    }

    pub async fn on_block_detected(&self, category: &str, kind: BlockKind, url: Option<&str>) {
        let fire = {
            let mut stats = self.stats.lock();
            let entry = stats.entry(category.to_string()).or_default();
            let (counter, threshold) = match kind {
                BlockKind::Block => (&mut entry.blocks_detected, self.thresholds.blocks),
                BlockKind::Captcha => (&mut entry.captchas_detected, self.thresholds.captchas),
            };
            *counter += 1;
            if *counter >= threshold {
                let count = *counter;
                *counter = 0;
                entry.last_alert_time = Some(Utc::now());
                Some(count)
            } else {
                None
            }
        };

        if let Some(count) = fire {
            let what = match kind {
                BlockKind::Block => "blocks",
                BlockKind::Captcha => "captchas",
            };
            let mut message = format!("<b>{} {} detected</b> in [{}]", count, what, escape(category));
            if let Some(url) = url {
                message.push_str(&format!("\nURL: {}", escape(url)));
            }
            self.alert(&message, AlertLevel::Warning).await;
        }
    }

    pub async fn on_category_complete(
        &self,
        category: &str,
        items: u64,
        errors: u64,
        duration: Duration,
    ) {
        let message = format!(
            "<b>Category complete</b> [{}]\nItems: {} | Errors: {} | Duration: {}",
            escape(category),
            items,
            errors,
            format_duration(duration)
        );
        self.alert(&message, AlertLevel::Info).await;
    }

    pub async fn on_category_timeout(&self, category: &str, timeout: Duration) {
        let message = format!(
            "<b>Category timed out</b> [{}] after {}; work abandoned",
            escape(category),
            format_duration(timeout)
        );
        self.alert(&message, AlertLevel::Warning).await;
    }

    pub async fn on_cycle_complete(
        &self,
        cycle: u64,
        results: &[(String, u64, u64)],
        duration: Duration,
    ) {
        let items: u64 = results.iter().map(|(_, items, _)| items).sum();
        let errors: u64 = results.iter().map(|(_, _, errors)| errors).sum();
        let mut message = format!(
            "<b>Cycle {} complete</b>\nItems: {} | Errors: {} | Duration: {}",
            cycle,
            items,
            errors,
            format_duration(duration)
        );
        for (category, items, errors) in results {
            message.push_str(&format!("\n\u{2022} {}: {} items, {} errors", escape(category), items, errors));
        }
        self.alert(&message, AlertLevel::Info).await;
    }

    pub async fn on_startup(&self, categories: &[String], proxies: usize) {
        let message = format!(
            "<b>Dispatcher started</b>\nCategories: {}\nProxies: {}",
            escape(&categories.join(", ")),
            proxies
        );
        self.alert(&message, AlertLevel::Info).await;
    }

    pub async fn on_shutdown(&self, reason: &str, items: u64, errors: u64, runtime: Duration) {
        let message = format!(
            "<b>Dispatcher stopped</b>: {}\nItems: {} | Errors: {} | Runtime: {}",
            escape(reason),
            items,
            errors,
            format_duration(runtime)
        );
        self.alert(&message, AlertLevel::Info).await;
    }

    pub async fn on_fatal(&self, error: &str) {
        let message = format!(
            "<b>Dispatcher crashed</b>\n<code>{}</code>",
            escape(&truncate(error, self.error_text_limit))
        );
        self.alert(&message, AlertLevel::Critical).await;
    }

    pub async fn close(&self) {
        for channel in &self.channels {
            channel.close().await;
        }
    }
}

fn escape(text: &str) -> String {
    html_escape::encode_text(text).into_owned()
}

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        text.to_string()
    } else {
        let mut cut: String = text.chars().take(limit).collect();
        cut.push_str("...");
        cut
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{:.1}s", duration.as_secs_f64())
    }
}
