//! External fulfillment.
//!
//! The queue drives fulfillment through the narrow [`Fulfiller`] trait; the
//! shipped implementation ([`client::FulfillmentClient`]) orchestrates the
//! provider and the treasury wallet. Retried `fulfill` calls for the same
//! `(subject, tier)` may legitimately return a new settlement id - the
//! provider opens a new order each time - so deduplication against
//! double-settlement is the caller's job via the idempotency registry, not
//! this layer's.

pub mod client;

use async_trait::async_trait;
use rust_decimal::Decimal;

use subvend_sdk::objects::Tier;

pub use client::{
    FulfillmentClient, PaymentRequest, ProviderApi, ProviderError, ProviderOrder, Recipient,
    SettlementWallet, WalletError,
};

/// A confirmed fulfillment: the provider's settlement id, the realized cost
/// in the ledger's accounting unit, and the on-chain transfer reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub settlement_id: String,
    pub cost: Decimal,
    pub chain_ref: String,
}

#[derive(Debug, thiserror::Error)]
pub enum FulfillError {
    /// Provider-side failure; retryable up to the task retry cap.
    #[error("provider error: {0}")]
    Provider(String),

    /// The settlement transfer failed or could not be confirmed; retryable.
    #[error("settlement transfer error: {0}")]
    Transfer(String),

    /// The treasury cannot cover the settlement; retryable once topped up.
    /// Carries the treasury address so admins can be told where to fund.
    #[error("treasury underfunded: {available} available, {needed} needed")]
    TreasuryUnderfunded {
        needed: Decimal,
        available: Decimal,
        address: String,
    },

    /// The recipient does not exist; retrying cannot change the outcome.
    #[error("no such recipient: {0}")]
    SubjectNotFound(String),
}

impl FulfillError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, FulfillError::SubjectNotFound(_))
    }
}

/// One fulfillment operation as seen by the queue: either a confirmed
/// settlement or a classified error. Each call is one task attempt,
/// whatever HTTP-level retries happen inside.
#[async_trait]
pub trait Fulfiller: Send + Sync {
    async fn fulfill(&self, subject: &str, tier: Tier) -> Result<Settlement, FulfillError>;
}
