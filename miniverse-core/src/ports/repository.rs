//! Repository port - transactional ledger storage

use rust_decimal::Decimal;

use crate::domain::result::Result;
use crate::domain::{
    CardNumber, CreditCard, Movement, MovementId, Transfer, TransferId, User, UserId,
};

/// Outcome of a conditional balance update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceUpdate {
    /// The delta was applied; carries the new balance
    Applied(Decimal),
    /// The delta would have made the balance negative; nothing changed
    Insufficient,
    /// No such user
    UnknownUser,
}

/// Source of units of work
///
/// Every ledger operation runs inside exactly one unit of work obtained here
/// and passed down explicitly.
pub trait LedgerStore: Send + Sync {
    /// Start a new unit of work
    fn begin(&self) -> Result<Box<dyn UnitOfWork + '_>>;
}

/// One atomic unit of reads and writes
///
/// Writes become durable only on [`UnitOfWork::commit`]. Dropping a unit of
/// work without committing rolls everything back.
pub trait UnitOfWork {
    // === Users ===

    /// Insert a new user; a duplicate id is an integrity conflict
    fn insert_user(&mut self, user: &User) -> Result<()>;

    fn get_user(&self, id: &UserId) -> Result<Option<User>>;

    fn get_users(&self) -> Result<Vec<User>>;

    /// Add `delta` to the user's balance only if the result stays
    /// non-negative (deposits are never blocked)
    fn apply_balance_delta(&mut self, id: &UserId, delta: Decimal) -> Result<BalanceUpdate>;

    // === Movements ===

    /// Allocate the next movement id; ids are never reused
    fn next_movement_id(&mut self) -> Result<MovementId>;

    fn insert_movement(&mut self, movement: &Movement) -> Result<()>;

    fn get_movement(&self, id: MovementId) -> Result<Option<Movement>>;

    /// Movements owned by a user, in creation order
    fn get_movements_for_user(&self, id: &UserId) -> Result<Vec<Movement>>;

    /// Sum of all committed movement amounts for a user
    fn sum_movements_for_user(&self, id: &UserId) -> Result<Decimal>;

    // === Transfers ===

    fn next_transfer_id(&mut self) -> Result<TransferId>;

    fn insert_transfer(&mut self, transfer: &Transfer) -> Result<()>;

    fn get_transfer(&self, id: TransferId) -> Result<Option<Transfer>>;

    /// Transfers where the user owns either leg, in creation order
    fn get_transfers_for_user(&self, id: &UserId) -> Result<Vec<Transfer>>;

    /// The transfer that already uses this movement as a leg, if any
    fn find_transfer_for_movement(&self, id: MovementId) -> Result<Option<TransferId>>;

    // === Cards ===

    fn insert_card(&mut self, card: &CreditCard) -> Result<()>;

    fn update_card(&mut self, card: &CreditCard) -> Result<()>;

    fn get_card(&self, number: &CardNumber) -> Result<Option<CreditCard>>;

    fn get_cards_for_user(&self, id: &UserId) -> Result<Vec<CreditCard>>;

    // === Statistics ===

    fn count_records(&self) -> Result<RecordCounts>;

    // === Lifecycle ===

    /// Make every write since `begin` durable
    fn commit(self: Box<Self>) -> Result<()>;

    /// Undo every write since `begin`
    fn rollback(self: Box<Self>) -> Result<()>;
}

/// Row counts per table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct RecordCounts {
    pub users: i64,
    pub movements: i64,
    pub transfers: i64,
    pub cards: i64,
}
