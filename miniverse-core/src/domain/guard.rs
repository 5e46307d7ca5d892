//! Balance guard - decides whether a delta may be applied to a wallet

use rust_decimal::Decimal;

use super::movement::MAX_AMOUNT_ABS;
use super::result::{Error, Result};

/// Ensure `balance + amount` stays non-negative
///
/// Only negative amounts are checked; deposits always pass. The caller must
/// pass the balance as read inside the same unit of work that applies the
/// delta.
pub fn ensure_sufficient(balance: Decimal, amount: Decimal) -> Result<()> {
    if amount >= Decimal::ZERO {
        return Ok(());
    }
    if balance + amount < Decimal::ZERO {
        return Err(Error::insufficient_funds(format!(
            "not enough money in the wallet: balance {}, requested {}",
            balance.normalize(),
            (-amount).normalize()
        )));
    }
    Ok(())
}

/// Ensure a deposit leaves the balance within what the ledger can store
pub fn ensure_capacity(balance: Decimal, amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Ok(());
    }
    match balance.checked_add(amount) {
        Some(total) if total < MAX_AMOUNT_ABS => Ok(()),
        _ => Err(Error::invalid_amount(format!(
            "a deposit of {} would take the balance past the storable limit",
            amount.normalize()
        ))),
    }
}
