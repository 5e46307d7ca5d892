//! Card service - payment cards charging their owner's wallet

use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use tracing::info;

use crate::domain::result::{Error, Result};
use crate::domain::{validate_amount, CardNumber, CreditCard, MovementId, MovementType, UserId};
use crate::ports::{LedgerStore, UnitOfWork};
use crate::services::journal::create_movement;
use crate::services::unit::{read_only, run_once, with_retry};

/// Attempts at drawing an unused random card number
const NUMBER_ATTEMPTS: usize = 8;

pub struct CardService {
    store: Arc<dyn LedgerStore>,
    max_retries: u32,
}

impl CardService {
    pub fn new(store: Arc<dyn LedgerStore>, max_retries: u32) -> Self {
        Self { store, max_retries }
    }

    /// Issue an inactive card to `owner`
    ///
    /// Without an explicit number a random unused one is drawn.
    pub fn issue(&self, owner: &UserId, number: Option<CardNumber>) -> Result<CreditCard> {
        let card = run_once(self.store.as_ref(), |uow| {
            if uow.get_user(owner)?.is_none() {
                return Err(Error::not_found(format!("user {}", owner)));
            }
            let number = match &number {
                Some(n) => {
                    if uow.get_card(n)?.is_some() {
                        return Err(Error::conflict(format!(
                            "card {} is already issued",
                            n.masked()
                        )));
                    }
                    n.clone()
                }
                None => unused_number(uow)?,
            };
            let card = CreditCard::issue(number, owner.clone());
            uow.insert_card(&card)?;
            Ok(card)
        })?;

        info!(card = %card.number.masked(), user = %owner, "card issued");
        Ok(card)
    }

    pub fn activate(&self, number: &CardNumber) -> Result<CreditCard> {
        self.update(number, |card| card.activate(Utc::now()))
    }

    pub fn cancel(&self, number: &CardNumber) -> Result<CreditCard> {
        self.update(number, |card| card.cancel())
    }

    /// Charge a purchase of `amount` (> 0) to the card's owner
    ///
    /// Recorded as a `CARD_WITHDRAWAL` movement of `-amount`.
    pub fn charge(&self, number: &CardNumber, amount: Decimal) -> Result<MovementId> {
        validate_amount(amount)?;
        if amount.is_sign_negative() {
            return Err(Error::invalid_amount(format!(
                "charge amount must be positive, got {}",
                amount
            )));
        }

        let id = with_retry(self.store.as_ref(), self.max_retries, |uow| {
            let card = load(uow, number)?;
            card.ensure_chargeable(Utc::now())?;
            create_movement(uow, &card.owner, -amount, MovementType::CardWithdrawal)
        })?;

        info!(card = %number.masked(), movement_id = id.0, "card charged");
        Ok(id)
    }

    pub fn get(&self, number: &CardNumber) -> Result<CreditCard> {
        read_only(self.store.as_ref(), |uow| load(uow, number))
    }

    pub fn list_for_user(&self, owner: &UserId) -> Result<Vec<CreditCard>> {
        read_only(self.store.as_ref(), |uow| {
            if uow.get_user(owner)?.is_none() {
                return Err(Error::not_found(format!("user {}", owner)));
            }
            uow.get_cards_for_user(owner)
        })
    }

    fn update(
        &self,
        number: &CardNumber,
        change: impl Fn(&mut CreditCard) -> Result<()>,
    ) -> Result<CreditCard> {
        let card = with_retry(self.store.as_ref(), self.max_retries, |uow| {
            let mut card = load(uow, number)?;
            change(&mut card)?;
            uow.update_card(&card)?;
            Ok(card)
        })?;

        info!(card = %number.masked(), status = %card.status, "card updated");
        Ok(card)
    }
}

fn load(uow: &dyn UnitOfWork, number: &CardNumber) -> Result<CreditCard> {
    uow.get_card(number)?
        .ok_or_else(|| Error::not_found(format!("card {}", number.masked())))
}

fn unused_number(uow: &dyn UnitOfWork) -> Result<CardNumber> {
    let mut rng = rand::thread_rng();
    for _ in 0..NUMBER_ATTEMPTS {
        let digits: String = (0..16)
            .map(|i| {
                // No leading zero
                let low = if i == 0 { 1 } else { 0 };
                char::from(b'0' + rng.gen_range(low..10u8))
            })
            .collect();
        let number = CardNumber::new(digits)?;
        if uow.get_card(&number)?.is_none() {
            return Ok(number);
        }
    }
    Err(Error::conflict("could not draw an unused card number"))
}
