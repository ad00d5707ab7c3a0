//! Deposit order request and response types.
//!
//! A deposit order reserves a collision-free payment amount for one top-up.
//! The frontend relays the instructions (treasury address + exact amount) to
//! the user, who must transfer that exact amount before the order expires.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AccountId;

/// Lifecycle of a deposit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepositStatus {
    Open,
    Matched,
    Canceled,
}

/// Request body for creating a deposit order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateDepositRequest {
    pub account_id: AccountId,
    /// Display name of the account, stored on first contact.
    pub username: String,
    /// Requested top-up amount before unique-amount disambiguation.
    pub amount: Decimal,
}

/// Payment instructions returned after a deposit order is created.
///
/// `amount` differs from `requested_amount` by a small random offset; the
/// user must transfer `amount` exactly, decimals included, because the
/// transfer carries no reference field and the amount is the only
/// correlation key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositInstructions {
    pub order_token: Uuid,
    pub pay_to: String,
    pub amount: Decimal,
    pub requested_amount: Decimal,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: time::OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: time::OffsetDateTime,
}
