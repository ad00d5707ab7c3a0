//! HTTP adapter for the external fulfillment provider.
//!
//! The provider speaks a form-encoded, method-dispatched API behind an
//! authenticated session. Responses are JSON objects that either carry the
//! requested fields or an `error` string.

use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{info, warn};

use async_trait::async_trait;
use subvend_sdk::objects::Tier;

use crate::clients::{ApiGate, MAX_HTTP_RETRIES, backoff_delay};
use crate::fulfill::{PaymentRequest, ProviderApi, ProviderError, ProviderOrder, Recipient};

pub struct HttpProvider {
    api_url: String,
    session_cookie: String,
    gate: ApiGate,
    http: reqwest::Client,
}

impl HttpProvider {
    pub fn new(
        api_url: impl Into<String>,
        session_cookie: impl Into<String>,
        gate: ApiGate,
    ) -> Self {
        Self {
            api_url: api_url.into(),
            session_cookie: session_cookie.into(),
            gate,
            http: reqwest::Client::new(),
        }
    }

    /// Send one method call, retried with exponential backoff behind the
    /// shared rate gate.
    async fn send(&self, method: &str, fields: &[(&str, String)]) -> Result<Value, ProviderError> {
        let mut form: Vec<(&str, String)> = fields.to_vec();
        form.push(("method", method.to_string()));

        let mut last_err = None;
        for attempt in 0..MAX_HTTP_RETRIES {
            let _permit = self.gate.acquire().await.ok();
            info!(method, attempt = attempt + 1, "Provider request");
            match self.send_once(&form).await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    warn!(method, attempt = attempt + 1, error = %e, "Provider request failed");
                    last_err = Some(e);
                    if attempt + 1 < MAX_HTTP_RETRIES {
                        tokio::time::sleep(backoff_delay(attempt)).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| ProviderError::Request("no attempts made".to_string())))
    }

    async fn send_once(&self, form: &[(&str, String)]) -> Result<Value, ProviderError> {
        let response = self
            .http
            .post(&self.api_url)
            .header("Cookie", &self.session_cookie)
            .form(form)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        let value: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Request(format!("non-JSON response: {e}")))?;

        if let Some(error) = value.get("error").and_then(Value::as_str) {
            return Err(ProviderError::Request(error.to_string()));
        }
        Ok(value)
    }

    fn text_field(value: &Value, key: &str) -> Result<String, ProviderError> {
        value
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ProviderError::Request(format!("missing field: {key}")))
    }

    fn decimal_field(value: &Value, key: &str) -> Result<Decimal, ProviderError> {
        let field = value
            .get(key)
            .ok_or_else(|| ProviderError::Request(format!("missing field: {key}")))?;
        let raw = match field {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        raw.parse::<Decimal>()
            .map_err(|_| ProviderError::Request(format!("bad decimal in {key}: {raw}")))
    }
}

#[async_trait]
impl ProviderApi for HttpProvider {
    async fn resolve_subject(&self, subject: &str, tier: Tier) -> Result<Recipient, ProviderError> {
        let result = self
            .send(
                "resolveRecipient",
                &[
                    ("query", subject.to_string()),
                    ("months", tier.months().to_string()),
                ],
            )
            .await;
        match result {
            Ok(value) => Ok(Recipient {
                id: Self::text_field(&value, "recipient")?,
                display_name: Self::text_field(&value, "name")
                    .unwrap_or_else(|_| subject.to_string()),
            }),
            Err(ProviderError::Request(message)) if message.contains("not found") => {
                Err(ProviderError::RecipientNotFound(subject.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    async fn quote(&self, recipient: &Recipient, tier: Tier) -> Result<Decimal, ProviderError> {
        let value = self
            .send(
                "quoteOrder",
                &[
                    ("recipient", recipient.id.clone()),
                    ("months", tier.months().to_string()),
                ],
            )
            .await?;
        Self::decimal_field(&value, "amount")
    }

    async fn create_order(
        &self,
        recipient: &Recipient,
        tier: Tier,
    ) -> Result<ProviderOrder, ProviderError> {
        let value = self
            .send(
                "createOrder",
                &[
                    ("recipient", recipient.id.clone()),
                    ("months", tier.months().to_string()),
                ],
            )
            .await?;
        Ok(ProviderOrder {
            order_id: Self::text_field(&value, "order_id")?,
            cost: Self::decimal_field(&value, "amount")?,
        })
    }

    async fn payment_request(&self, order_id: &str) -> Result<PaymentRequest, ProviderError> {
        let value = self
            .send("paymentRequest", &[("order_id", order_id.to_string())])
            .await?;
        Ok(PaymentRequest {
            amount: Self::decimal_field(&value, "amount")?,
            memo: Self::text_field(&value, "memo")?,
        })
    }
}
