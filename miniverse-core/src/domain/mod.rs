//! Core domain entities
//!
//! All ledger entities and their rules are defined here. These are pure data
//! structures with validation logic - no I/O.

mod card;
pub mod credential;
pub mod guard;
mod movement;
pub mod result;
mod transfer;
mod user;

pub use card::{CardNumber, CardStatus, CreditCard, CARD_VALIDITY_MONTHS};
pub use movement::{
    validate_amount, Movement, MovementId, MovementType, MAX_AMOUNT_ABS, MAX_AMOUNT_SCALE,
};
pub use transfer::{validate_legs, Transfer, TransferId, TransferType};
pub use user::{User, UserId};
