//! Bot-API notification adapter.
//!
//! Sends plain-text messages through the chat platform's HTTP bot API. A
//! 403 means the recipient blocked the bot - reported as
//! [`Delivery::Blocked`] so the caller stops retrying.

use async_trait::async_trait;
use serde_json::json;

use subvend_sdk::objects::AccountId;

use super::{Delivery, Notifier, NotifyError};
use crate::clients::ApiGate;

pub struct BotApiNotifier {
    base_url: String,
    token: String,
    gate: ApiGate,
    http: reqwest::Client,
}

impl BotApiNotifier {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, gate: ApiGate) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            gate,
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Notifier for BotApiNotifier {
    async fn notify(&self, account: AccountId, text: &str) -> Result<Delivery, NotifyError> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.token);

        let _permit = self.gate.acquire().await.ok();
        let response = self
            .http
            .post(url)
            .json(&json!({
                "chat_id": account.0,
                "text": text,
            }))
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::FORBIDDEN {
            return Ok(Delivery::Blocked);
        }
        if !status.is_success() {
            return Err(NotifyError::Rejected(status.as_u16()));
        }
        Ok(Delivery::Delivered)
    }
}
