//! Admin API request types.
//!
//! Consumed by the authorization-gated command interface: balance
//! adjustment, price updates, treasury address updates.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{AccountId, TierPrices};

/// Signed delta applied to an account's balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustBalanceRequest {
    pub account_id: AccountId,
    pub delta: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePricesRequest {
    pub prices: TierPrices,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateAddressRequest {
    pub payment_address: String,
}
