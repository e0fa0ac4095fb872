use std::time::Duration;

use reqwest::Client;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::info;

use crate::config::{ConfigError, Credentials};

const API_BASE: &str = "https://api.telegram.org";
const SEND_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("http error: {0}")]
    Http(String),
    #[error("telegram api error on chunk {chunk}: {body}")]
    Api { chunk: usize, body: String },
}

pub struct TelegramPoster {
    token: String,
    chat_id: i64,
    client: Client,
}

impl TelegramPoster {
    pub fn from_credentials(credentials: &Credentials) -> Result<Self, ConfigError> {
        let (token, chat_id) = credentials.require_telegram()?;
        let client = Client::builder()
            .timeout(Duration::from_secs(SEND_TIMEOUT_SECS))
            .build()
            .map_err(|err| ConfigError::Invalid(format!("telegram http client: {err}")))?;
        Ok(Self {
            token: token.to_string(),
            chat_id,
            client,
        })
    }

    pub async fn deliver(
        &self,
        chunks: &[String],
        thread_id: Option<i64>,
    ) -> Result<usize, TelegramError> {
        for (idx, chunk) in chunks.iter().enumerate() {
            self.send(idx + 1, chunk, thread_id).await?;
        }
        info!(chunks = chunks.len(), chat_id = self.chat_id, "digest delivered");
        Ok(chunks.len())
    }

    async fn send(
        &self,
        chunk_number: usize,
        text: &str,
        thread_id: Option<i64>,
    ) -> Result<(), TelegramError> {
        let url = format!("{API_BASE}/bot{}/sendMessage", self.token);
        let response = self
            .client
            .post(url)
            .json(&message_payload(self.chat_id, text, thread_id))
            .send()
            .await
            .map_err(|err| TelegramError::Http(err.without_url().to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| TelegramError::Http(err.without_url().to_string()))?;

        if !status.is_success() {
            return Err(TelegramError::Api {
                chunk: chunk_number,
                body,
            });
        }
        Ok(())
    }
}

pub fn message_payload(chat_id: i64, text: &str, thread_id: Option<i64>) -> Value {
    let mut payload = json!({
        "chat_id": chat_id,
        "text": text,
        "parse_mode": "HTML",
        "disable_web_page_preview": true,
    });
    if let Some(thread_id) = thread_id {
        payload["message_thread_id"] = json!(thread_id);
    }
    payload
}
