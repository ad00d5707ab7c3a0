//! Fulfillment orchestration over the provider and the treasury wallet.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use subvend_sdk::objects::Tier;

use super::{FulfillError, Fulfiller, Settlement};

/// Provider-side identity of a resolved recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub id: String,
    pub display_name: String,
}

/// A provider order: the settlement id and the realized cost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderOrder {
    pub order_id: String,
    pub cost: Decimal,
}

/// What the provider wants transferred on-chain to settle an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    pub amount: Decimal,
    pub memo: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("recipient not found: {0}")]
    RecipientNotFound(String),
    #[error("provider request failed: {0}")]
    Request(String),
}

#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    #[error("wallet request failed: {0}")]
    Request(String),
    #[error("transfer not confirmed: {0}")]
    Unconfirmed(String),
}

/// The external fulfillment provider, behind a narrow interface; its actual
/// request/response shapes stay in the HTTP adapter.
#[async_trait]
pub trait ProviderApi: Send + Sync {
    async fn resolve_subject(&self, subject: &str, tier: Tier) -> Result<Recipient, ProviderError>;

    /// Price estimate used for the treasury funding check; does not open an
    /// order.
    async fn quote(&self, recipient: &Recipient, tier: Tier) -> Result<Decimal, ProviderError>;

    /// Open a provider order. This issues the settlement id.
    async fn create_order(
        &self,
        recipient: &Recipient,
        tier: Tier,
    ) -> Result<ProviderOrder, ProviderError>;

    /// The transfer the provider expects for an order.
    async fn payment_request(&self, order_id: &str) -> Result<PaymentRequest, ProviderError>;
}

/// The treasury wallet, behind a narrow interface. Key material and signing
/// live outside the process.
#[async_trait]
pub trait SettlementWallet: Send + Sync {
    fn address(&self) -> String;

    async fn balance(&self) -> Result<Decimal, WalletError>;

    /// Execute the transfer and confirm it landed; returns the transaction
    /// reference.
    async fn transfer(&self, request: &PaymentRequest) -> Result<String, WalletError>;
}

/// Orchestrates one fulfillment: resolve, quote, funding check, order,
/// payment request, on-chain transfer.
///
/// Transfers are globally serialized through `transfer_lock` - the treasury
/// account has a single monotonically-increasing sequence number, and
/// concurrent transfers would race on it.
pub struct FulfillmentClient {
    provider: Arc<dyn ProviderApi>,
    wallet: Arc<dyn SettlementWallet>,
    transfer_lock: Mutex<()>,
}

impl FulfillmentClient {
    pub fn new(provider: Arc<dyn ProviderApi>, wallet: Arc<dyn SettlementWallet>) -> Self {
        Self {
            provider,
            wallet,
            transfer_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl Fulfiller for FulfillmentClient {
    async fn fulfill(&self, subject: &str, tier: Tier) -> Result<Settlement, FulfillError> {
        let recipient = match self.provider.resolve_subject(subject, tier).await {
            Ok(recipient) => recipient,
            Err(ProviderError::RecipientNotFound(name)) => {
                return Err(FulfillError::SubjectNotFound(name));
            }
            Err(e) => return Err(FulfillError::Provider(e.to_string())),
        };
        info!(subject, recipient = %recipient.id, "Resolved fulfillment recipient");

        let quoted = self
            .provider
            .quote(&recipient, tier)
            .await
            .map_err(|e| FulfillError::Provider(e.to_string()))?;

        // Funding check before committing to an order with the provider.
        let treasury = self
            .wallet
            .balance()
            .await
            .map_err(|e| FulfillError::Transfer(e.to_string()))?;
        if treasury < quoted {
            warn!(%treasury, %quoted, "Treasury cannot cover quoted settlement");
            return Err(FulfillError::TreasuryUnderfunded {
                needed: quoted,
                available: treasury,
                address: self.wallet.address(),
            });
        }

        let order = self
            .provider
            .create_order(&recipient, tier)
            .await
            .map_err(|e| FulfillError::Provider(e.to_string()))?;
        info!(order_id = %order.order_id, cost = %order.cost, "Provider order created");

        let payment = self
            .provider
            .payment_request(&order.order_id)
            .await
            .map_err(|e| FulfillError::Provider(e.to_string()))?;

        let chain_ref = {
            let _guard = self.transfer_lock.lock().await;
            self.wallet
                .transfer(&payment)
                .await
                .map_err(|e| FulfillError::Transfer(e.to_string()))?
        };
        info!(order_id = %order.order_id, %chain_ref, "Settlement transfer confirmed");

        Ok(Settlement {
            settlement_id: order.order_id,
            cost: order.cost,
            chain_ref,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    struct FixedProvider {
        cost: Decimal,
    }

    #[async_trait]
    impl ProviderApi for FixedProvider {
        async fn resolve_subject(
            &self,
            subject: &str,
            _tier: Tier,
        ) -> Result<Recipient, ProviderError> {
            if subject == "missing" {
                return Err(ProviderError::RecipientNotFound(subject.to_string()));
            }
            Ok(Recipient {
                id: format!("id-{subject}"),
                display_name: subject.to_string(),
            })
        }

        async fn quote(&self, _recipient: &Recipient, _tier: Tier) -> Result<Decimal, ProviderError> {
            Ok(self.cost)
        }

        async fn create_order(
            &self,
            recipient: &Recipient,
            _tier: Tier,
        ) -> Result<ProviderOrder, ProviderError> {
            Ok(ProviderOrder {
                order_id: format!("order-{}", recipient.id),
                cost: self.cost,
            })
        }

        async fn payment_request(&self, order_id: &str) -> Result<PaymentRequest, ProviderError> {
            Ok(PaymentRequest {
                amount: self.cost,
                memo: format!("ref#{order_id}"),
            })
        }
    }

    struct TrackingWallet {
        balance: Decimal,
        in_transfer: AtomicBool,
        overlapped: AtomicBool,
        transfers: AtomicU32,
    }

    impl TrackingWallet {
        fn new(balance: Decimal) -> Self {
            Self {
                balance,
                in_transfer: AtomicBool::new(false),
                overlapped: AtomicBool::new(false),
                transfers: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl SettlementWallet for TrackingWallet {
        fn address(&self) -> String {
            "treasury-address".to_string()
        }

        async fn balance(&self) -> Result<Decimal, WalletError> {
            Ok(self.balance)
        }

        async fn transfer(&self, request: &PaymentRequest) -> Result<String, WalletError> {
            if self.in_transfer.swap(true, Ordering::SeqCst) {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            self.in_transfer.store(false, Ordering::SeqCst);
            let n = self.transfers.fetch_add(1, Ordering::SeqCst);
            Ok(format!("tx-{n}-{}", request.memo))
        }
    }

    #[tokio::test]
    async fn fulfill_returns_provider_settlement() {
        let provider = Arc::new(FixedProvider {
            cost: Decimal::new(2980, 2),
        });
        let wallet = Arc::new(TrackingWallet::new(Decimal::new(100, 0)));
        let client = FulfillmentClient::new(provider, wallet);

        let settlement = client.fulfill("alice", Tier::Months3).await.unwrap();
        assert_eq!(settlement.settlement_id, "order-id-alice");
        assert_eq!(settlement.cost, Decimal::new(2980, 2));
        assert!(settlement.chain_ref.starts_with("tx-"));
    }

    #[tokio::test]
    async fn underfunded_treasury_stops_before_ordering() {
        let provider = Arc::new(FixedProvider {
            cost: Decimal::new(50, 0),
        });
        let wallet = Arc::new(TrackingWallet::new(Decimal::new(10, 0)));
        let client = FulfillmentClient::new(provider, wallet.clone());

        let err = client.fulfill("alice", Tier::Months6).await.unwrap_err();
        match err {
            FulfillError::TreasuryUnderfunded {
                needed, available, ..
            } => {
                assert_eq!(needed, Decimal::new(50, 0));
                assert_eq!(available, Decimal::new(10, 0));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(wallet.transfers.load(Ordering::SeqCst), 0);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn unknown_recipient_is_not_retryable() {
        let provider = Arc::new(FixedProvider {
            cost: Decimal::ONE,
        });
        let wallet = Arc::new(TrackingWallet::new(Decimal::new(100, 0)));
        let client = FulfillmentClient::new(provider, wallet);

        let err = client.fulfill("missing", Tier::Months3).await.unwrap_err();
        assert!(matches!(err, FulfillError::SubjectNotFound(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn concurrent_fulfillments_serialize_transfers() {
        let provider = Arc::new(FixedProvider {
            cost: Decimal::ONE,
        });
        let wallet = Arc::new(TrackingWallet::new(Decimal::new(100, 0)));
        let client = Arc::new(FulfillmentClient::new(provider, wallet.clone()));

        let a = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.fulfill("alice", Tier::Months3).await })
        };
        let b = {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.fulfill("bob", Tier::Months3).await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        assert_eq!(wallet.transfers.load(Ordering::SeqCst), 2);
        assert!(!wallet.overlapped.load(Ordering::SeqCst));
    }
}
