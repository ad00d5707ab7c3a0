//! Subscription tiers and their configured prices.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A purchasable subscription duration.
///
/// Serialized as the number of months so the chat frontend and the config
/// file can both speak plain integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Tier {
    Months3,
    Months6,
    Months12,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Months3, Tier::Months6, Tier::Months12];

    /// Duration in months.
    pub fn months(self) -> u8 {
        match self {
            Tier::Months3 => 3,
            Tier::Months6 => 6,
            Tier::Months12 => 12,
        }
    }

    /// Human-readable duration, as shown in user notifications.
    pub fn label(self) -> &'static str {
        match self {
            Tier::Months3 => "3 months",
            Tier::Months6 => "6 months",
            Tier::Months12 => "1 year",
        }
    }
}

impl TryFrom<u8> for Tier {
    type Error = InvalidTier;

    fn try_from(months: u8) -> Result<Self, InvalidTier> {
        match months {
            3 => Ok(Tier::Months3),
            6 => Ok(Tier::Months6),
            12 => Ok(Tier::Months12),
            other => Err(InvalidTier(other)),
        }
    }
}

impl From<Tier> for u8 {
    fn from(tier: Tier) -> u8 {
        tier.months()
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Rejected duration; only 3, 6 and 12 months are sold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid subscription duration: {0} months")]
pub struct InvalidTier(pub u8);

/// Nominal price per tier, in the ledger's accounting unit.
///
/// These are the advertised prices used for the optimistic balance check at
/// enqueue time; the authoritative charge is the realized settlement cost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierPrices {
    #[serde(rename = "3_months")]
    pub three_months: Decimal,
    #[serde(rename = "6_months")]
    pub six_months: Decimal,
    #[serde(rename = "12_months")]
    pub twelve_months: Decimal,
}

impl TierPrices {
    pub fn price(&self, tier: Tier) -> Decimal {
        match tier {
            Tier::Months3 => self.three_months,
            Tier::Months6 => self.six_months,
            Tier::Months12 => self.twelve_months,
        }
    }

    /// All prices must be strictly positive.
    pub fn validate(&self) -> Result<(), InvalidPrice> {
        for tier in Tier::ALL {
            let price = self.price(tier);
            if price <= Decimal::ZERO {
                return Err(InvalidPrice { tier, price });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("price for {tier} must be positive, got {price}")]
pub struct InvalidPrice {
    pub tier: Tier,
    pub price: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_round_trips_through_months() {
        for tier in Tier::ALL {
            assert_eq!(Tier::try_from(tier.months()), Ok(tier));
        }
        assert_eq!(Tier::try_from(9), Err(InvalidTier(9)));
    }

    #[test]
    fn twelve_months_labeled_as_one_year() {
        assert_eq!(Tier::Months12.label(), "1 year");
        assert_eq!(Tier::Months6.label(), "6 months");
    }

    #[test]
    fn tier_serializes_as_month_count() {
        assert_eq!(serde_json::to_string(&Tier::Months12).unwrap(), "12");
        let parsed: Tier = serde_json::from_str("6").unwrap();
        assert_eq!(parsed, Tier::Months6);
        assert!(serde_json::from_str::<Tier>("7").is_err());
    }

    #[test]
    fn prices_validate_positivity() {
        let mut prices = TierPrices {
            three_months: Decimal::new(1250, 2),
            six_months: Decimal::new(1900, 2),
            twelve_months: Decimal::new(3000, 2),
        };
        assert!(prices.validate().is_ok());
        assert_eq!(prices.price(Tier::Months12), Decimal::new(3000, 2));

        prices.six_months = Decimal::ZERO;
        assert!(prices.validate().is_err());
    }
}
