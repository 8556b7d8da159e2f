//! Telegram bot notifier (`telegram` feature).
//!
//! Credentials come from `[telegram] bot_token` / `chat_id`, falling back to
//! the `TELEGRAM_BOT_TOKEN` / `TELEGRAM_CHAT_ID` environment variables.

use std::time::Duration;

use crate::domain::error::RsTraderError;
use crate::ports::config_port::ConfigPort;
use crate::ports::notify_port::NotifierPort;

const API_BASE: &str = "https://api.telegram.org";

pub struct TelegramNotifier {
    client: reqwest::blocking::Client,
    bot_token: String,
    chat_id: String,
}

fn setting(config: &dyn ConfigPort, key: &str, env: &str) -> Option<String> {
    config
        .get_string("telegram", key)
        .or_else(|| std::env::var(env).ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl TelegramNotifier {
    /// `Ok(None)` when credentials are not configured.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Option<Self>, RsTraderError> {
        let (Some(bot_token), Some(chat_id)) = (
            setting(config, "bot_token", "TELEGRAM_BOT_TOKEN"),
            setting(config, "chat_id", "TELEGRAM_CHAT_ID"),
        ) else {
            return Ok(None);
        };

        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RsTraderError::Notification {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Some(Self {
            client,
            bot_token,
            chat_id,
        }))
    }
}

impl NotifierPort for TelegramNotifier {
    fn send(&self, message: &str) -> Result<(), RsTraderError> {
        let url = format!("{API_BASE}/bot{}/sendMessage", self.bot_token);
        let payload = serde_json::json!({
            "chat_id": self.chat_id,
            "text": message,
        });

        let resp = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .map_err(|e| RsTraderError::Notification {
                reason: e.without_url().to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(RsTraderError::Notification {
                reason: format!("telegram responded with HTTP {status}"),
            });
        }
        Ok(())
    }
}
