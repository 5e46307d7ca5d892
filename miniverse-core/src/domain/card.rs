//! Credit card domain model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};

use super::result::{Error, Result};
use super::user::UserId;

/// Cards are valid for this many months after issue
pub const CARD_VALIDITY_MONTHS: u32 = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CardStatus {
    Inactive,
    Active,
    Cancelled,
}

impl CardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardStatus::Inactive => "INACTIVE",
            CardStatus::Active => "ACTIVE",
            CardStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for CardStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CardStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "INACTIVE" => Ok(CardStatus::Inactive),
            "ACTIVE" => Ok(CardStatus::Active),
            "CANCELLED" => Ok(CardStatus::Cancelled),
            _ => Err(Error::invalid_type(format!("unknown card status '{}'", s))),
        }
    }
}

/// Validated 16-digit card number
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CardNumber(String);

impl CardNumber {
    pub fn new(number: impl Into<String>) -> Result<Self> {
        let number: String = number.into().chars().filter(|c| !c.is_whitespace()).collect();
        if number.len() != 16 || !number.chars().all(|c| c.is_ascii_digit()) {
            return Err(Error::invalid_state(format!(
                "card number must have 16 digits, got '{}'",
                number
            )));
        }
        Ok(Self(number))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last four digits, for display
    pub fn masked(&self) -> String {
        format!("**** **** **** {}", &self.0[12..])
    }
}

impl fmt::Display for CardNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A payment card linked to a wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditCard {
    pub number: CardNumber,
    pub owner: UserId,
    pub status: CardStatus,
    pub issued_at: DateTime<Utc>,
    pub active_since: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

impl CreditCard {
    /// Issue a new, inactive card
    pub fn issue(number: CardNumber, owner: UserId) -> Self {
        let now = Utc::now();
        Self {
            number,
            owner,
            status: CardStatus::Inactive,
            issued_at: now,
            active_since: None,
            expires_at: now
                .checked_add_months(Months::new(CARD_VALIDITY_MONTHS))
                .unwrap_or(now),
        }
    }

    pub fn activate(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status != CardStatus::Inactive {
            return Err(Error::invalid_state(format!(
                "card {} is {}, only inactive cards can be activated",
                self.number.masked(),
                self.status
            )));
        }
        self.status = CardStatus::Active;
        self.active_since = Some(now);
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<()> {
        if self.status == CardStatus::Cancelled {
            return Err(Error::invalid_state(format!(
                "card {} is already cancelled",
                self.number.masked()
            )));
        }
        self.status = CardStatus::Cancelled;
        Ok(())
    }

    /// A card can be charged only while active and not expired
    pub fn ensure_chargeable(&self, now: DateTime<Utc>) -> Result<()> {
        if self.status != CardStatus::Active {
            return Err(Error::invalid_state(format!(
                "card {} is {}",
                self.number.masked(),
                self.status
            )));
        }
        if now >= self.expires_at {
            return Err(Error::invalid_state(format!(
                "card {} expired on {}",
                self.number.masked(),
                self.expires_at.date_naive()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn card() -> CreditCard {
        CreditCard::issue(
            CardNumber::new("4000 1234 5678 9010").unwrap(),
            UserId::new("0000").unwrap(),
        )
    }

    #[test]
    fn test_issue_is_inactive_and_expires_later() {
        let card = card();
        assert_eq!(card.status, CardStatus::Inactive);
        assert!(card.expires_at > card.issued_at);
        assert_eq!(card.number.masked(), "**** **** **** 9010");
    }

    #[test]
    fn test_card_number_validation() {
        assert!(CardNumber::new("1234").is_err());
        assert!(CardNumber::new("400012345678901x").is_err());
    }

    #[test]
    fn test_lifecycle() {
        let mut card = card();
        let now = Utc::now();
        assert!(card.ensure_chargeable(now).is_err());

        card.activate(now).unwrap();
        assert!(card.ensure_chargeable(now).is_ok());
        assert!(card.activate(now).is_err());

        card.cancel().unwrap();
        assert!(matches!(card.ensure_chargeable(now), Err(Error::InvalidState(_))));
        assert!(card.cancel().is_err());
    }

    #[test]
    fn test_expired_card_not_chargeable() {
        let mut card = card();
        let now = Utc::now();
        card.activate(now).unwrap();
        let later = card.expires_at + Duration::days(1);
        assert!(card.ensure_chargeable(later).is_err());
    }
}
