use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DispatcherConfig {
    #[serde(default)]
    #[validate(custom(function = "validate_categories"))]
    pub categories: Vec<CategoryConfig>,

    #[serde(default = "default_category_timeout")]
    #[validate(range(min = 1))]
    pub category_timeout_secs: u64,

    #[serde(default = "default_stagger_delay")]
    pub stagger_delay_secs: u64,

    #[serde(default = "default_cycle_delay")]
    pub cycle_delay_secs: u64,

    /// Pause between two sites of the same category.
    #[serde(default = "default_site_delay")]
    pub site_delay_ms: u64,

    #[serde(default)]
    pub single_run: bool,

    #[serde(default)]
    #[validate(nested)]
    pub alerts: AlertConfig,

    #[serde(default)]
    pub proxy: ProxyConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    /// Optional path to a parent configuration file to inherit from
    #[serde(default)]
    pub extends: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CategoryConfig {
    #[validate(length(min = 1))]
    pub name: String,

    #[serde(default)]
    #[validate(range(min = 1))]
    pub timeout_secs: Option<u64>,

    #[serde(default)]
    pub stagger_delay_secs: Option<u64>,

    /// Run only these sites when set.
    #[serde(default)]
    pub only_sites: Option<Vec<String>>,

    #[serde(default)]
    pub excluded_sites: Vec<String>,

    /// Built-in page-fetch sites for this category.
    #[serde(default)]
    #[validate(nested)]
    pub pages: Vec<PageSiteConfig>,
}

impl CategoryConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            timeout_secs: None,
            stagger_delay_secs: None,
            only_sites: None,
            excluded_sites: Vec::new(),
            pages: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PageSiteConfig {
    #[validate(length(min = 1))]
    pub name: String,

    #[serde(default)]
    pub priority: i32,

    #[validate(length(min = 1))]
    pub urls: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AlertConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_error_threshold")]
    #[validate(range(min = 1))]
    pub error_threshold: u32,

    #[serde(default = "default_block_threshold")]
    #[validate(range(min = 1))]
    pub block_threshold: u32,

    #[serde(default = "default_captcha_threshold")]
    #[validate(range(min = 1))]
    pub captcha_threshold: u32,

    /// Maximum characters of error text quoted in an alert.
    #[serde(default = "default_error_text_limit")]
    pub error_text_limit: usize,

    #[serde(default)]
    pub telegram: Option<TelegramConfig>,

    #[serde(default)]
    pub email: Option<EmailConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,

    #[serde(default)]
    pub chat_id: String,

    #[serde(default = "default_telegram_api")]
    pub api_base: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: String,

    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    pub from: String,

    pub to: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default)]
    pub source: ProxySourceConfig,

    /// Where the proxy score table is persisted. In-memory when unset.
    #[serde(default)]
    pub score_file: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProxySourceConfig {
    #[default]
    None,
    Static {
        proxies: Vec<String>,
    },
    Url {
        url: String,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    #[default]
    Console,
    Jsonl {
        dir: String,
    },
    None,
}

impl DispatcherConfig {
    pub fn category(&self, name: &str) -> Option<&CategoryConfig> {
        self.categories.iter().find(|c| c.name == name)
    }

    pub fn category_names(&self) -> Vec<String> {
        self.categories.iter().map(|c| c.name.clone()).collect()
    }

    pub fn timeout_for(&self, name: &str) -> Duration {
        let secs = self
            .category(name)
            .and_then(|c| c.timeout_secs)
            .unwrap_or(self.category_timeout_secs);
        Duration::from_secs(secs)
    }

    pub fn stagger_for(&self, name: &str) -> Duration {
        let secs = self
            .category(name)
            .and_then(|c| c.stagger_delay_secs)
            .unwrap_or(self.stagger_delay_secs);
        Duration::from_secs(secs)
    }

    pub fn cycle_delay(&self) -> Duration {
        Duration::from_secs(self.cycle_delay_secs)
    }

    pub fn site_delay(&self) -> Duration {
        Duration::from_millis(self.site_delay_ms)
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            categories: Vec::new(),
            category_timeout_secs: default_category_timeout(),
            stagger_delay_secs: default_stagger_delay(),
            cycle_delay_secs: default_cycle_delay(),
            site_delay_ms: default_site_delay(),
            single_run: false,
            alerts: AlertConfig::default(),
            proxy: ProxyConfig::default(),
            storage: StorageConfig::default(),
            extends: None,
        }
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            chat_id: String::new(),
            api_base: default_telegram_api(),
        }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            error_threshold: default_error_threshold(),
            block_threshold: default_block_threshold(),
            captcha_threshold: default_captcha_threshold(),
            error_text_limit: default_error_text_limit(),
            telegram: None,
            email: None,
        }
    }
}

fn validate_categories(categories: &[CategoryConfig]) -> Result<(), ValidationError> {
    if categories.is_empty() {
        return Err(ValidationError::new("at_least_one_category"));
    }
    let mut seen = HashSet::new();
    for category in categories {
        if !seen.insert(category.name.as_str()) {
            let mut err = ValidationError::new("duplicate_category");
            err.message = Some(format!("category '{}' is listed twice", category.name).into());
            return Err(err);
        }
        if let Err(e) = category.validate() {
            let mut err = ValidationError::new("invalid_category");
            err.message = Some(format!("category '{}': {}", category.name, e).into());
            return Err(err);
        }
    }
    Ok(())
}

fn default_true() -> bool {
    true
}

fn default_category_timeout() -> u64 {
    3600
}

fn default_stagger_delay() -> u64 {
    30
}

fn default_cycle_delay() -> u64 {
    1800
}

fn default_site_delay() -> u64 {
    2000
}

fn default_error_threshold() -> u32 {
    5
}

fn default_block_threshold() -> u32 {
    3
}

fn default_captcha_threshold() -> u32 {
    1
}

fn default_error_text_limit() -> usize {
    300
}

fn default_smtp_port() -> u16 {
    587
}

fn default_telegram_api() -> String {
    "https://api.telegram.org".to_string()
}
