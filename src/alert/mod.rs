pub mod email;
pub mod manager;
pub mod telegram;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use email::EmailChannel;
pub use manager::{AlertManager, AlertStats, BlockKind};
pub use telegram::TelegramChannel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warning,
    Error,
    Critical,
}

impl AlertLevel {
    pub const fn emoji(self) -> &'static str {
        match self {
            AlertLevel::Info => "\u{2139}\u{fe0f}",
            AlertLevel::Warning => "\u{26a0}\u{fe0f}",
            AlertLevel::Error => "\u{274c}",
            AlertLevel::Critical => "\u{1f6a8}",
        }
    }

    pub fn is_urgent(self) -> bool {
        self >= AlertLevel::Error
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            AlertLevel::Info => "INFO",
            AlertLevel::Warning => "WARNING",
            AlertLevel::Error => "ERROR",
            AlertLevel::Critical => "CRITICAL",
        };
        f.write_str(label)
    }
}

/// One outbound notification path (chat, email, ...).
#[async_trait]
pub trait AlertChannel: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this channel should be attempted for `level` at all.
    fn accepts(&self, level: AlertLevel) -> bool;

    async fn send(&self, message: &str, level: AlertLevel) -> Result<()>;

    /// Releases any connection held by the channel.
    async fn close(&self) {}
}
