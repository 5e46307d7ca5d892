//! User domain model

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::result::{Error, Result};

/// Unique user identifier (the original wallets keyed users by phone number)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(Error::invalid_state("user id must not be empty"));
        }
        if trimmed.contains('/') {
            return Err(Error::invalid_state(format!(
                "user id '{}' must not contain '/'",
                trimmed
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A wallet owner
///
/// `balance` is a cached running sum of the user's committed movements; it is
/// only ever changed together with a movement insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub pass_hash: String,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Create a user with an empty wallet
    pub fn new(id: UserId, name: impl Into<String>, pass_hash: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            pass_hash: pass_hash.into(),
            balance: Decimal::ZERO,
            created_at: Utc::now(),
        }
    }
}
