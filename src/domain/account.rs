use crate::error::{CoreError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// Who owns a wallet account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HolderType {
    Customer,
    Merchant,
    Agent,
}

impl fmt::Display for HolderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HolderType::Customer => write!(f, "customer"),
            HolderType::Merchant => write!(f, "merchant"),
            HolderType::Agent => write!(f, "agent"),
        }
    }
}

/// Identity of a wallet account: exactly one account exists per holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId {
    pub holder: HolderType,
    pub holder_id: u64,
}

impl AccountId {
    pub fn customer(id: u64) -> Self {
        Self {
            holder: HolderType::Customer,
            holder_id: id,
        }
    }

    pub fn merchant(id: u64) -> Self {
        Self {
            holder: HolderType::Merchant,
            holder_id: id,
        }
    }

    pub fn agent(id: u64) -> Self {
        Self {
            holder: HolderType::Agent,
            holder_id: id,
        }
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.holder, self.holder_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Frozen,
    Closed,
}

/// A wallet account. Balances are never stored here: the running balance on
/// the latest confirmed ledger entry is the only authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn open(id: AccountId) -> Self {
        Self {
            id,
            status: AccountStatus::Active,
            created_at: Utc::now(),
        }
    }
}

/// A positive monetary amount, fixed-point with at most two decimal places.
///
/// Wraps `rust_decimal::Decimal` to enforce the domain rules once, at the
/// boundary, instead of at every call site.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self> {
        if value <= Decimal::ZERO {
            return Err(CoreError::Validation(format!(
                "amount must be positive, got {value}"
            )));
        }
        if value.round_dp(2) != value {
            return Err(CoreError::Validation(format!(
                "amount {value} has more than two decimal places"
            )));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = CoreError;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A signed account balance.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Balance(pub Decimal);

impl Balance {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl From<Amount> for Balance {
    fn from(amount: Amount) -> Self {
        Self(amount.0)
    }
}

impl Add for Balance {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Balance {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl AddAssign for Balance {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Balance {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_amount_rejects_non_positive() {
        assert!(Amount::new(dec!(1.00)).is_ok());
        assert!(matches!(
            Amount::new(dec!(0.00)),
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            Amount::new(dec!(-5.00)),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_amount_rejects_sub_cent_precision() {
        assert!(Amount::new(dec!(10.25)).is_ok());
        assert!(matches!(
            Amount::new(dec!(10.251)),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_balance_arithmetic() {
        let a = Balance::new(dec!(10.00));
        let b = Balance::new(dec!(2.50));
        assert_eq!(a + b, Balance::new(dec!(12.50)));
        assert_eq!(a - b, Balance::new(dec!(7.50)));
    }

    #[test]
    fn test_account_id_display() {
        assert_eq!(AccountId::customer(42).to_string(), "customer:42");
        assert_eq!(AccountId::agent(7).to_string(), "agent:7");
    }
}
