//! Movement domain model
//!
//! A movement is one signed ledger entry against a single user's wallet.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::result::{Error, Result};
use super::user::UserId;

/// Largest number of fractional digits the ledger stores exactly
pub const MAX_AMOUNT_SCALE: u32 = 10;

/// Exclusive bound on the magnitude of an amount or a balance (10^28)
///
/// `DECIMAL(38, 10)` keeps 28 integer digits.
pub const MAX_AMOUNT_ABS: Decimal =
    Decimal::from_parts(0x1000_0000, 0x3E25_0261, 0x204F_CE5E, false, 0);

/// Movement identifier, allocated from a monotonically increasing sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MovementId(pub i64);

impl fmt::Display for MovementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Closed set of movement kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    FundsDeposit,
    FundsWithdrawal,
    TransferDeposit,
    TransferWithdrawal,
    CardWithdrawal,
}

impl MovementType {
    pub const ALL: [MovementType; 5] = [
        MovementType::FundsDeposit,
        MovementType::FundsWithdrawal,
        MovementType::TransferDeposit,
        MovementType::TransferWithdrawal,
        MovementType::CardWithdrawal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::FundsDeposit => "FUNDS_DEPOSIT",
            MovementType::FundsWithdrawal => "FUNDS_WITHDRAWAL",
            MovementType::TransferDeposit => "TRANSFER_DEPOSIT",
            MovementType::TransferWithdrawal => "TRANSFER_WITHDRAWAL",
            MovementType::CardWithdrawal => "CARD_WITHDRAWAL",
        }
    }

    /// Transfer legs may only be created through the transfer flow
    pub fn is_transfer_leg(&self) -> bool {
        matches!(
            self,
            MovementType::TransferDeposit | MovementType::TransferWithdrawal
        )
    }
}

impl fmt::Display for MovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_uppercase().replace('-', "_");
        MovementType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| Error::invalid_type(format!("unknown movement type '{}'", s)))
    }
}

/// Reject amounts that represent no economic event or cannot be stored exactly
pub fn validate_amount(amount: Decimal) -> Result<()> {
    if amount.is_zero() {
        return Err(Error::invalid_amount(
            "if no money is moved, this is not a money movement",
        ));
    }
    if amount.normalize().scale() > MAX_AMOUNT_SCALE {
        return Err(Error::invalid_amount(format!(
            "{} has more than {} decimal places",
            amount, MAX_AMOUNT_SCALE
        )));
    }
    if amount.abs() >= MAX_AMOUNT_ABS {
        return Err(Error::invalid_amount(format!(
            "{} is too large to be stored",
            amount.normalize()
        )));
    }
    Ok(())
}

/// A signed ledger entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub id: MovementId,
    pub owner: UserId,
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub kind: MovementType,
    pub created_at: DateTime<Utc>,
}

impl Movement {
    /// Build a movement, validating the amount
    pub fn new(id: MovementId, owner: UserId, amount: Decimal, kind: MovementType) -> Result<Self> {
        validate_amount(amount)?;
        Ok(Self {
            id,
            owner,
            amount,
            kind,
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_movement_type_round_trips_through_str() {
        for kind in MovementType::ALL {
            assert_eq!(kind.as_str().parse::<MovementType>().unwrap(), kind);
        }
        assert_eq!(
            "funds-deposit".parse::<MovementType>().unwrap(),
            MovementType::FundsDeposit
        );
    }

    #[test]
    fn test_unknown_movement_type_is_invalid_type() {
        let err = "LOTTERY_WIN".parse::<MovementType>().unwrap_err();
        assert!(matches!(err, Error::InvalidType(_)));
    }

    #[test]
    fn test_zero_amount_rejected() {
        let err = validate_amount(Decimal::ZERO).unwrap_err();
        assert!(matches!(err, Error::InvalidAmount(_)));
        assert!(validate_amount(dec!(0.000)).is_err());
    }

    #[test]
    fn test_amount_scale_limit() {
        assert!(validate_amount(dec!(0.0000000001)).is_ok());
        assert!(matches!(
            validate_amount(dec!(0.00000000001)),
            Err(Error::InvalidAmount(_))
        ));
        // Trailing zeros do not count against the limit
        assert!(validate_amount(dec!(1.500000000000)).is_ok());
    }

    #[test]
    fn test_amount_magnitude_limit() {
        assert_eq!(MAX_AMOUNT_ABS, Decimal::from_str("10000000000000000000000000000").unwrap());

        let largest = dec!(9999999999999999999999999999);
        assert!(validate_amount(largest).is_ok());
        assert!(validate_amount(-largest).is_ok());
        assert!(validate_amount(dec!(1234567890123456789.0123456789)).is_ok());
        assert!(matches!(
            validate_amount(MAX_AMOUNT_ABS),
            Err(Error::InvalidAmount(_))
        ));
        assert!(matches!(
            validate_amount(-MAX_AMOUNT_ABS),
            Err(Error::InvalidAmount(_))
        ));
        assert!(matches!(
            validate_amount(Decimal::MAX),
            Err(Error::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_serializes_type_in_screaming_case() {
        let movement = Movement::new(
            MovementId(7),
            UserId::new("0000").unwrap(),
            dec!(-10),
            MovementType::CardWithdrawal,
        )
        .unwrap();
        let json = serde_json::to_value(&movement).unwrap();
        assert_eq!(json["type"], "CARD_WITHDRAWAL");
        assert_eq!(json["id"], 7);
        assert_eq!(json["owner"], "0000");
    }
}
