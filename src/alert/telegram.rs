use crate::alert::{AlertChannel, AlertLevel};
use crate::config::schema::TelegramConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tokio::sync::Mutex;

/// Telegram bot channel. Accepts every level.
///
/// The HTTP client is created on first send and kept until [`AlertChannel::close`].
pub struct TelegramChannel {
    bot_token: String,
    chat_id: String,
    api_base: String,
    client: Mutex<Option<Client>>,
}

impl TelegramChannel {
    pub fn new(config: &TelegramConfig) -> Self {
        Self {
            bot_token: config.bot_token.clone(),
            chat_id: config.chat_id.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            client: Mutex::new(None),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.bot_token.is_empty() && !self.chat_id.is_empty()
    }

    fn endpoint(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.bot_token)
    }

    async fn client(&self) -> Result<Client> {
        let mut guard = self.client.lock().await;
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        *guard = Some(client.clone());
        Ok(client)
    }

    pub async fn is_connected(&self) -> bool {
        self.client.lock().await.is_some()
    }
}

#[async_trait]
impl AlertChannel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    fn accepts(&self, _level: AlertLevel) -> bool {
        true
    }

    async fn send(&self, message: &str, _level: AlertLevel) -> Result<()> {
        let client = self.client().await?;
        let payload = json!({
            "chat_id": self.chat_id,
            "text": message,
            "parse_mode": "HTML",
        });

        let res = client.post(self.endpoint()).json(&payload).send().await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(Error::Alert(format!("telegram HTTP {}: {}", status, body)));
        }
        Ok(())
    }

    async fn close(&self) {
        self.client.lock().await.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn channel(server: &MockServer) -> TelegramChannel {
        TelegramChannel::new(&TelegramConfig {
            bot_token: "123:abc".to_string(),
            chat_id: "-42".to_string(),
            api_base: format!("{}/", server.uri()),
        })
    }

    #[tokio::test]
    async fn sends_message_with_html_parse_mode() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .and(body_partial_json(json!({
                "chat_id": "-42",
                "text": "<b>hello</b>",
                "parse_mode": "HTML"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let telegram = channel(&server);
        telegram.send("<b>hello</b>", AlertLevel::Info).await.unwrap();
    }

    #[tokio::test]
    async fn client_is_reused_until_closed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&server)
            .await;

        let telegram = channel(&server);
        assert!(!telegram.is_connected().await);
        telegram.send("one", AlertLevel::Info).await.unwrap();
        assert!(telegram.is_connected().await);
        telegram.send("two", AlertLevel::Warning).await.unwrap();

        telegram.close().await;
        assert!(!telegram.is_connected().await);
    }

    #[tokio::test]
    async fn api_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("chat not found"))
            .mount(&server)
            .await;

        let err = channel(&server).send("x", AlertLevel::Error).await.unwrap_err();
        assert!(err.to_string().contains("chat not found"));
    }
}
