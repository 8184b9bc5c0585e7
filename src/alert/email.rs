use crate::alert::{AlertChannel, AlertLevel};
use crate::config::schema::EmailConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

/// SMTP channel for urgent alerts only (ERROR and CRITICAL).
pub struct EmailChannel {
    from: Mailbox,
    to: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailChannel {
    pub fn new(config: &EmailConfig) -> Result<Self> {
        let from = parse_mailbox(&config.from)?;
        let to = parse_mailbox(&config.to)?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| Error::Config(format!("smtp relay {}: {}", config.smtp_host, e)))?
            .port(config.smtp_port);
        if !config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ));
        }

        Ok(Self {
            from,
            to,
            transport: builder.build(),
        })
    }

    pub fn build_message(&self, message: &str, level: AlertLevel) -> Result<Message> {
        let subject = format!("[{}] scrape-dispatch alert", level);
        let body = format!(
            "<html><body>{}</body></html>",
            message.replace('\n', "<br>\n")
        );

        Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(body)
            .map_err(|e| Error::Alert(format!("building email: {}", e)))
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox> {
    address
        .parse()
        .map_err(|e| Error::Config(format!("invalid email address '{}': {}", address, e)))
}

#[async_trait]
impl AlertChannel for EmailChannel {
    fn name(&self) -> &str {
        "email"
    }

    fn accepts(&self, level: AlertLevel) -> bool {
        level.is_urgent()
    }

    async fn send(&self, message: &str, level: AlertLevel) -> Result<()> {
        let email = self.build_message(message, level)?;
        self.transport
            .send(email)
            .await
            .map_err(|e| Error::Alert(format!("smtp: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EmailConfig {
        EmailConfig {
            smtp_host: "smtp.example.com".to_string(),
            smtp_port: 587,
            username: "ops".to_string(),
            password: "secret".to_string(),
            from: "Dispatcher <dispatch@example.com>".to_string(),
            to: "oncall@example.com".to_string(),
        }
    }

    #[tokio::test]
    async fn only_urgent_levels_are_accepted() {
        let channel = EmailChannel::new(&config()).unwrap();
        assert!(!channel.accepts(AlertLevel::Info));
        assert!(!channel.accepts(AlertLevel::Warning));
        assert!(channel.accepts(AlertLevel::Error));
        assert!(channel.accepts(AlertLevel::Critical));
    }

    #[tokio::test]
    async fn invalid_address_is_a_config_error() {
        let mut bad = config();
        bad.to = "not an address".to_string();
        assert!(matches!(EmailChannel::new(&bad), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn message_carries_level_in_subject() {
        let channel = EmailChannel::new(&config()).unwrap();
        let message = channel
            .build_message("line one\nline two", AlertLevel::Critical)
            .unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Subject: [CRITICAL] scrape-dispatch alert"));
        assert!(raw.contains("line one<br>"));
    }
}
