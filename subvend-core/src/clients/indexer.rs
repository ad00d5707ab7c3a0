//! Chain indexer polling.
//!
//! The underlying transfer protocol carries no reference field, so all the
//! matcher gets from the indexer is `{amount, counterparty, observed_at}`
//! per inbound transfer; the amount is the only correlation key.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::clients::{ApiGate, MAX_HTTP_RETRIES, backoff_delay};

/// One inbound transfer to the treasury address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEvent {
    pub amount: Decimal,
    pub counterparty: String,
    pub observed_at: time::OffsetDateTime,
}

#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    #[error("indexer request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("indexer response parsing error: {0}")]
    Parse(String),
}

#[async_trait]
pub trait ChainIndexer: Send + Sync {
    /// Inbound transfers to `address` observed at or after `since`.
    async fn incoming_transfers(
        &self,
        address: &str,
        since: time::OffsetDateTime,
    ) -> Result<Vec<TransferEvent>, IndexerError>;
}

/// Tronscan-style contract-events API client.
pub struct HttpChainIndexer {
    base_url: String,
    token_contract: String,
    gate: ApiGate,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct EventsResponse {
    #[serde(default)]
    data: Vec<EventItem>,
}

#[derive(Debug, Deserialize)]
struct EventItem {
    #[serde(rename = "transferToAddress")]
    to_address: String,
    #[serde(rename = "transferFromAddress", default)]
    from_address: String,
    /// Token amount in base units (1e-6).
    amount: String,
    #[serde(default)]
    timestamp: i64,
}

impl HttpChainIndexer {
    /// Base units per whole token on the transfer contract.
    const UNIT_SCALE: u32 = 6;

    pub fn new(
        base_url: impl Into<String>,
        token_contract: impl Into<String>,
        gate: ApiGate,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            token_contract: token_contract.into(),
            gate,
            http: reqwest::Client::new(),
        }
    }

    async fn fetch(
        &self,
        address: &str,
        since_ms: i64,
    ) -> Result<EventsResponse, IndexerError> {
        let url = format!("{}/api/contract/events", self.base_url);
        let response = self
            .http
            .get(url)
            .query(&[
                ("address", address),
                ("start", "0"),
                ("limit", "20"),
                ("start_timestamp", &since_ms.to_string()),
                ("contract", &self.token_contract),
            ])
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json::<EventsResponse>().await?)
    }

    fn parse_amount(raw: &str) -> Result<Decimal, IndexerError> {
        let base_units: i128 = raw
            .parse()
            .map_err(|_| IndexerError::Parse(format!("bad amount: {raw}")))?;
        Decimal::try_from_i128_with_scale(base_units, Self::UNIT_SCALE)
            .map_err(|e| IndexerError::Parse(e.to_string()))
    }
}

#[async_trait]
impl ChainIndexer for HttpChainIndexer {
    async fn incoming_transfers(
        &self,
        address: &str,
        since: time::OffsetDateTime,
    ) -> Result<Vec<TransferEvent>, IndexerError> {
        let since_ms = since.unix_timestamp() * 1000;

        let mut last_err = None;
        for attempt in 0..MAX_HTTP_RETRIES {
            let _permit = self.gate.acquire().await.ok();
            match self.fetch(address, since_ms).await {
                Ok(response) => {
                    let mut events = Vec::new();
                    for item in response.data {
                        if item.to_address != address {
                            continue;
                        }
                        let amount = Self::parse_amount(&item.amount)?;
                        let observed_at =
                            time::OffsetDateTime::from_unix_timestamp(item.timestamp / 1000)
                                .unwrap_or(since);
                        events.push(TransferEvent {
                            amount,
                            counterparty: item.from_address,
                            observed_at,
                        });
                    }
                    debug!(count = events.len(), "Fetched inbound transfers");
                    return Ok(events);
                }
                Err(e) => {
                    warn!(attempt = attempt + 1, error = %e, "Indexer poll failed");
                    last_err = Some(e);
                    if attempt + 1 < MAX_HTTP_RETRIES {
                        tokio::time::sleep(backoff_delay(attempt)).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| IndexerError::Parse("no attempts made".to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amounts_scale_from_base_units() {
        assert_eq!(
            HttpChainIndexer::parse_amount("10004300").unwrap(),
            Decimal::new(100043, 4).normalize()
        );
        assert_eq!(
            HttpChainIndexer::parse_amount("1000000").unwrap(),
            Decimal::ONE.normalize()
        );
        assert!(HttpChainIndexer::parse_amount("not-a-number").is_err());
    }
}
