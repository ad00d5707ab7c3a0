//! HTTP adapter for the treasury wallet daemon.
//!
//! Key material and transaction signing live in an external daemon; this
//! adapter only asks it for the balance, submits transfers, and verifies
//! that a submitted transfer actually landed.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::clients::{ApiGate, MAX_HTTP_RETRIES, backoff_delay};
use crate::fulfill::{PaymentRequest, SettlementWallet, WalletError};

pub struct WalletRpc {
    base_url: String,
    address: String,
    gate: ApiGate,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    balance: String,
}

#[derive(Debug, Deserialize)]
struct TransferResponse {
    tx_hash: String,
}

#[derive(Debug, Deserialize)]
struct TransactionsResponse {
    #[serde(default)]
    transactions: Vec<TransactionItem>,
}

#[derive(Debug, Deserialize)]
struct TransactionItem {
    hash: String,
}

impl WalletRpc {
    pub fn new(base_url: impl Into<String>, address: impl Into<String>, gate: ApiGate) -> Self {
        Self {
            base_url: base_url.into(),
            address: address.into(),
            gate,
            http: reqwest::Client::new(),
        }
    }

    async fn submit_transfer(&self, request: &PaymentRequest) -> Result<String, WalletError> {
        let url = format!("{}/transfer", self.base_url);
        let mut last_err = None;
        for attempt in 0..MAX_HTTP_RETRIES {
            let _permit = self.gate.acquire().await.ok();
            let result = async {
                let response = self
                    .http
                    .post(&url)
                    .json(&json!({
                        "amount": request.amount.to_string(),
                        "memo": request.memo,
                    }))
                    .send()
                    .await
                    .map_err(|e| WalletError::Request(e.to_string()))?
                    .error_for_status()
                    .map_err(|e| WalletError::Request(e.to_string()))?;
                let body: TransferResponse = response
                    .json()
                    .await
                    .map_err(|e| WalletError::Request(e.to_string()))?;
                Ok::<_, WalletError>(body.tx_hash)
            }
            .await;

            match result {
                Ok(tx_hash) => return Ok(tx_hash),
                Err(e) => {
                    warn!(attempt = attempt + 1, error = %e, "Transfer submission failed");
                    last_err = Some(e);
                    if attempt + 1 < MAX_HTTP_RETRIES {
                        tokio::time::sleep(backoff_delay(attempt)).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| WalletError::Request("no attempts made".to_string())))
    }

    /// Confirm the submitted transfer is the wallet's latest transaction.
    async fn confirm_transfer(&self, tx_hash: &str) -> Result<(), WalletError> {
        let url = format!("{}/transactions", self.base_url);
        for attempt in 0..MAX_HTTP_RETRIES {
            tokio::time::sleep(backoff_delay(attempt)).await;

            let _permit = self.gate.acquire().await.ok();
            let confirmed = async {
                let response = self
                    .http
                    .get(&url)
                    .query(&[("limit", "1")])
                    .send()
                    .await
                    .map_err(|e| WalletError::Request(e.to_string()))?;
                let body: TransactionsResponse = response
                    .json()
                    .await
                    .map_err(|e| WalletError::Request(e.to_string()))?;
                Ok::<_, WalletError>(body.transactions.iter().any(|t| t.hash == tx_hash))
            }
            .await;

            match confirmed {
                Ok(true) => {
                    info!(%tx_hash, "Settlement transfer confirmed on chain");
                    return Ok(());
                }
                Ok(false) => {
                    warn!(%tx_hash, attempt = attempt + 1, "Transfer not visible yet");
                }
                Err(e) => {
                    warn!(%tx_hash, attempt = attempt + 1, error = %e, "Confirmation check failed");
                }
            }
        }
        Err(WalletError::Unconfirmed(tx_hash.to_string()))
    }
}

#[async_trait]
impl SettlementWallet for WalletRpc {
    fn address(&self) -> String {
        self.address.clone()
    }

    async fn balance(&self) -> Result<Decimal, WalletError> {
        let url = format!("{}/balance", self.base_url);
        let _permit = self.gate.acquire().await.ok();
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| WalletError::Request(e.to_string()))?;
        let body: BalanceResponse = response
            .json()
            .await
            .map_err(|e| WalletError::Request(e.to_string()))?;
        body.balance
            .parse::<Decimal>()
            .map_err(|_| WalletError::Request(format!("bad balance: {}", body.balance)))
    }

    async fn transfer(&self, request: &PaymentRequest) -> Result<String, WalletError> {
        let tx_hash = self.submit_transfer(request).await?;
        self.confirm_transfer(&tx_hash).await?;
        Ok(tx_hash)
    }
}
