//! Transfer domain model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::movement::{Movement, MovementId};
use super::result::{Error, Result};

/// Transfer identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferId(pub i64);

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transfer visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferType {
    Public,
    Private,
}

impl TransferType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferType::Public => "PUBLIC",
            TransferType::Private => "PRIVATE",
        }
    }
}

impl fmt::Display for TransferType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransferType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "PUBLIC" => Ok(TransferType::Public),
            "PRIVATE" => Ok(TransferType::Private),
            _ => Err(Error::invalid_type(format!("unknown transfer type '{}'", s))),
        }
    }
}

/// A committed pair of movements moving money between two wallets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: TransferId,
    pub withdrawal_id: MovementId,
    pub deposit_id: MovementId,
    pub comment: String,
    #[serde(rename = "type")]
    pub kind: TransferType,
    pub created_at: DateTime<Utc>,
}

/// Check that two legs form a valid transfer
///
/// The withdrawal must take money out and the deposit must put back exactly
/// the same amount, with no rounding tolerance.
pub fn validate_legs(withdrawal: &Movement, deposit: &Movement) -> Result<()> {
    if withdrawal.amount >= Decimal::ZERO {
        return Err(Error::invalid_state(format!(
            "withdrawal amount must be negative, got {}",
            withdrawal.amount
        )));
    }
    if withdrawal.amount != -deposit.amount {
        return Err(Error::AsymmetricTransfer(format!(
            "deposit {} does not cancel withdrawal {}",
            deposit.amount, withdrawal.amount
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MovementType, UserId};
    use rust_decimal_macros::dec;

    fn leg(id: i64, owner: &str, amount: Decimal, kind: MovementType) -> Movement {
        Movement::new(MovementId(id), UserId::new(owner).unwrap(), amount, kind).unwrap()
    }

    #[test]
    fn test_symmetric_legs_pass() {
        let w = leg(1, "a", dec!(-25), MovementType::TransferWithdrawal);
        let d = leg(2, "b", dec!(25), MovementType::TransferDeposit);
        assert!(validate_legs(&w, &d).is_ok());
    }

    #[test]
    fn test_scale_does_not_matter_for_symmetry() {
        let w = leg(1, "a", dec!(-25.00), MovementType::TransferWithdrawal);
        let d = leg(2, "b", dec!(25), MovementType::TransferDeposit);
        assert!(validate_legs(&w, &d).is_ok());
    }

    #[test]
    fn test_asymmetric_legs_fail() {
        let w = leg(1, "a", dec!(-25), MovementType::TransferWithdrawal);
        let d = leg(2, "b", dec!(30), MovementType::TransferDeposit);
        assert!(matches!(
            validate_legs(&w, &d),
            Err(Error::AsymmetricTransfer(_))
        ));
    }

    #[test]
    fn test_positive_withdrawal_is_invalid_state() {
        let w = leg(1, "a", dec!(25), MovementType::TransferWithdrawal);
        let d = leg(2, "b", dec!(-25), MovementType::TransferDeposit);
        assert!(matches!(validate_legs(&w, &d), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_transfer_type_parsing() {
        assert_eq!("public".parse::<TransferType>().unwrap(), TransferType::Public);
        assert_eq!("PRIVATE".parse::<TransferType>().unwrap(), TransferType::Private);
        assert!(matches!(
            "SECRET".parse::<TransferType>(),
            Err(Error::InvalidType(_))
        ));
    }
}
