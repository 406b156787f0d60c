use std::time::Duration;

use async_trait::async_trait;
use region_sweep::{NotificationChannel, NotificationError};
use reqwest::Client;

/// Public Bot API endpoint
pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Sends messages to one chat through the Telegram Bot API.
pub struct TelegramChannel {
    client: Client,
    api_base: String,
    token: String,
    chat_id: String,
}

impl TelegramChannel {
    /// Creates a channel for `chat_id` using the bot `token`.
    pub fn new(token: impl Into<String>, chat_id: impl Into<String>) -> Result<Self, NotificationError> {
        let token = token.into();
        let chat_id = chat_id.into();

        if token.trim().is_empty() || chat_id.trim().is_empty() {
            return Err(NotificationError::Config(
                "Telegram bot token and chat id must not be empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| NotificationError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: TELEGRAM_API_BASE.to_string(),
            token,
            chat_id,
        })
    }

    /// Points the channel at another Bot API server.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn send_message_url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.token)
    }
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    async fn send(&self, message: &str) -> Result<(), NotificationError> {
        log::debug!("📨 Sending Telegram message to chat {}", self.chat_id);

        let response = self
            .client
            .post(self.send_message_url())
            .form(&[("chat_id", self.chat_id.as_str()), ("text", message)])
            .send()
            .await
            // The URL embeds the bot token, keep it out of logs.
            .map_err(|e| NotificationError::Transport(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotificationError::Rejected(format!("{}: {}", status, body)));
        }

        Ok(())
    }
}
