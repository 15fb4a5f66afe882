use crate::error::{Result, ShiftpayError};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{AddAssign, SubAssign};

/// Identifier of the employer responsible for approving and funding payments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PayerId(pub u32);

impl fmt::Display for PayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Represents a monetary value with fixed-point precision.
///
/// This is a wrapper around `rust_decimal::Decimal` so balances can never be
/// mixed up with arbitrary decimals and never go through binary floating point.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Balance(pub Decimal);

/// A strictly positive monetary amount, used for pay rates and payments.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(ShiftpayError::Validation(
                "Amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Scales the amount by `percent / 100`, rounded to cents.
    pub fn scaled_by_percent(&self, percent: u8) -> Result<Self> {
        let scaled = (self.0 * Decimal::from(percent) / Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        Self::new(scaled)
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = ShiftpayError;

    fn try_from(value: Decimal) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl From<Amount> for Balance {
    fn from(amount: Amount) -> Self {
        Self(amount.0)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Balance {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount)
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

/// A payer's ledger entry.
///
/// Only the available balance is tracked: wages are debited when a payment is
/// approved and handed to the transfer network, and credited back only by an
/// explicit reconciliation.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct PayerAccount {
    /// The unique identifier for the payer.
    pub payer: PayerId,
    /// Funds available for wage payments.
    pub available: Balance,
}

impl PayerAccount {
    pub fn new(payer: PayerId) -> Self {
        Self {
            payer,
            available: Balance::ZERO,
        }
    }

    /// An account opened with `available` already deposited.
    pub fn with_balance(payer: PayerId, available: Decimal) -> Self {
        let mut account = Self::new(payer);
        account.deposit(Balance::new(available));
        account
    }

    /// Tops up the available balance.
    pub fn deposit(&mut self, amount: Balance) {
        self.available += amount;
    }

    /// Debits the available balance if it covers the amount
    pub fn debit(&mut self, amount: Amount) -> Result<()> {
        let amount = Balance::from(amount);
        if self.available >= amount {
            self.available -= amount;
            Ok(())
        } else {
            Err(ShiftpayError::InsufficientFunds {
                payer: self.payer.0,
                available: self.available.0,
                required: amount.0,
            })
        }
    }

    /// Credits a previously debited amount back
    pub fn credit(&mut self, amount: Amount) {
        self.available += Balance::from(amount);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_amount_validation() {
        assert!(Amount::new(dec!(1.0)).is_ok());
        assert!(matches!(
            Amount::new(dec!(0.0)),
            Err(ShiftpayError::Validation(_))
        ));
        assert!(matches!(
            Amount::new(dec!(-1.0)),
            Err(ShiftpayError::Validation(_))
        ));
    }

    #[test]
    fn test_amount_scaled_by_percent() {
        let rate = Amount::new(dec!(120.00)).unwrap();
        assert_eq!(rate.scaled_by_percent(90).unwrap().value(), dec!(108.00));
        assert_eq!(rate.scaled_by_percent(100).unwrap().value(), dec!(120.00));

        let odd = Amount::new(dec!(99.99)).unwrap();
        assert_eq!(odd.scaled_by_percent(33).unwrap().value(), dec!(33.00));

        assert!(rate.scaled_by_percent(0).is_err());
    }

    #[test]
    fn test_amount_deserialization_rejects_non_positive() {
        assert!(serde_json::from_str::<Amount>("\"12.5\"").is_ok());
        assert!(serde_json::from_str::<Amount>("\"0\"").is_err());
    }

    #[test]
    fn test_account_top_up() {
        let mut account = PayerAccount::with_balance(PayerId(1), dec!(250.00));
        account.deposit(Balance::new(dec!(50.00)));
        assert_eq!(account.available, Balance::new(dec!(300.00)));
    }

    #[test]
    fn test_account_debit_exact_balance() {
        let mut account = PayerAccount::with_balance(PayerId(1), dec!(120.00));
        let result = account.debit(Amount::new(dec!(120.00)).unwrap());
        assert!(result.is_ok());
        assert_eq!(account.available, Balance::ZERO);
    }

    #[test]
    fn test_account_debit_insufficient() {
        let mut account = PayerAccount::with_balance(PayerId(1), dec!(10.0));
        let result = account.debit(Amount::new(dec!(20.0)).unwrap());
        assert!(matches!(
            result,
            Err(ShiftpayError::InsufficientFunds { payer: 1, .. })
        ));
        assert_eq!(account.available, Balance::new(dec!(10.0)));
    }

    #[test]
    fn test_account_credit() {
        let mut account = PayerAccount::with_balance(PayerId(1), dec!(5.0));
        account.credit(Amount::new(dec!(5.0)).unwrap());
        assert_eq!(account.available, Balance::new(dec!(10.0)));
    }
}
