//! Shared configuration types.
//!
//! The shop configuration is loaded from the server's TOML file and swapped
//! atomically at runtime when an admin updates prices or the treasury
//! address; readers always observe a complete version, never a half-updated
//! one.

use serde::{Deserialize, Serialize};

use crate::objects::{AccountId, TierPrices};

/// Runtime shop configuration consumed by the matcher and the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopConfig {
    pub prices: TierPrices,
    /// Treasury address users deposit to.
    pub payment_address: String,
    /// Support contact included in failure notifications.
    pub support_contact: String,
    /// Accounts alerted on credited deposits and treasury problems.
    #[serde(default)]
    pub admins: Vec<AccountId>,
}

impl ShopConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.prices
            .validate()
            .map_err(|e| ConfigError::InvalidPrice(e.to_string()))?;
        if !is_valid_deposit_address(&self.payment_address) {
            return Err(ConfigError::InvalidAddress(self.payment_address.clone()));
        }
        Ok(())
    }
}

/// Validate a treasury deposit address: `T` followed by 33 alphanumerics.
pub fn is_valid_deposit_address(address: &str) -> bool {
    let mut chars = address.chars();
    if chars.next() != Some('T') {
        return false;
    }
    let rest: Vec<char> = chars.collect();
    rest.len() == 33 && rest.iter().all(|c| c.is_ascii_alphanumeric())
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid price: {0}")]
    InvalidPrice(String),
    #[error("invalid deposit address: {0}")]
    InvalidAddress(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    const ADDRESS: &str = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";

    fn config() -> ShopConfig {
        ShopConfig {
            prices: TierPrices {
                three_months: Decimal::new(1250, 2),
                six_months: Decimal::new(1900, 2),
                twelve_months: Decimal::new(3000, 2),
            },
            payment_address: ADDRESS.to_string(),
            support_contact: "@support".to_string(),
            admins: vec![AccountId(1)],
        }
    }

    #[test]
    fn address_validation() {
        assert!(is_valid_deposit_address(ADDRESS));
        assert!(!is_valid_deposit_address("XR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t"));
        assert!(!is_valid_deposit_address("T123"));
        assert!(!is_valid_deposit_address("TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6!"));
        assert!(!is_valid_deposit_address(""));
    }

    #[test]
    fn valid_config_passes() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn zero_price_rejected() {
        let mut cfg = config();
        cfg.prices.three_months = Decimal::ZERO;
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidPrice(_))));
    }

    #[test]
    fn bad_address_rejected() {
        let mut cfg = config();
        cfg.payment_address = "not-an-address".to_string();
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidAddress(_))));
    }
}
