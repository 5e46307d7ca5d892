//! Movement journal - creates and reads single ledger movements
//!
//! A movement is either written straight away (`create_movement`) or staged
//! (`stage_movement`) so a transfer can commit both of its legs together.
//! Staged movements have ids but touch neither the movements table nor any
//! balance.

use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::domain::guard::{ensure_capacity, ensure_sufficient};
use crate::domain::result::{Error, Result};
use crate::domain::{validate_amount, Movement, MovementId, MovementType, UserId};
use crate::ports::{BalanceUpdate, LedgerStore, ReferenceResolver, UnitOfWork};
use crate::services::expansion::{Expander, MovementView};
use crate::services::unit::{read_only, with_retry};

/// Caller-owned holding area for non-durable movements
///
/// Dropping it discards everything still staged.
#[derive(Debug, Default)]
pub struct StagedMovements {
    movements: BTreeMap<MovementId, Movement>,
}

impl StagedMovements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: MovementId) -> Option<&Movement> {
        self.movements.get(&id)
    }

    pub fn contains(&self, id: MovementId) -> bool {
        self.movements.contains_key(&id)
    }

    /// Remove a movement so it can be made durable
    pub fn take(&mut self, id: MovementId) -> Option<Movement> {
        self.movements.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.movements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.movements.is_empty()
    }

    fn insert(&mut self, movement: Movement) {
        self.movements.insert(movement.id, movement);
    }
}

/// Validate a new movement against its owner's current balance and allocate
/// its id.
fn prepare(
    uow: &mut dyn UnitOfWork,
    owner: &UserId,
    amount: Decimal,
    kind: MovementType,
) -> Result<Movement> {
    validate_amount(amount)?;
    let user = uow
        .get_user(owner)?
        .ok_or_else(|| Error::not_found(format!("user {}", owner)))?;
    ensure_sufficient(user.balance, amount)?;
    ensure_capacity(user.balance, amount)?;

    let id = uow.next_movement_id()?;
    Movement::new(id, owner.clone(), amount, kind)
}

/// Apply a balance delta, turning a refused conditional update into an error
pub(crate) fn apply_delta(
    uow: &mut dyn UnitOfWork,
    owner: &UserId,
    delta: Decimal,
) -> Result<Decimal> {
    match uow.apply_balance_delta(owner, delta)? {
        BalanceUpdate::Applied(balance) => Ok(balance),
        BalanceUpdate::Insufficient => Err(Error::insufficient_funds(format!(
            "not enough money in the wallet of {}",
            owner
        ))),
        BalanceUpdate::UnknownUser => Err(Error::not_found(format!("user {}", owner))),
    }
}

/// Record a movement durably and apply it to the owner's balance
pub fn create_movement(
    uow: &mut dyn UnitOfWork,
    owner: &UserId,
    amount: Decimal,
    kind: MovementType,
) -> Result<MovementId> {
    let movement = prepare(uow, owner, amount, kind)?;
    // Re-checked at application time; the pre-check above only gives the
    // caller an early, precise error.
    apply_delta(uow, owner, amount)?;
    uow.insert_movement(&movement)?;

    debug!(movement_id = movement.id.0, kind = %kind, "movement recorded");
    Ok(movement.id)
}

/// Validate a movement and park it in `staging` without writing anything
pub fn stage_movement(
    uow: &mut dyn UnitOfWork,
    staging: &mut StagedMovements,
    owner: &UserId,
    amount: Decimal,
    kind: MovementType,
) -> Result<MovementId> {
    let movement = prepare(uow, owner, amount, kind)?;
    let id = movement.id;
    staging.insert(movement);

    debug!(movement_id = id.0, kind = %kind, "movement staged");
    Ok(id)
}

pub fn get_movement(
    uow: &dyn UnitOfWork,
    expander: &Expander<'_>,
    id: MovementId,
    expand: bool,
) -> Result<MovementView> {
    let movement = uow
        .get_movement(id)?
        .ok_or_else(|| Error::not_found(format!("movement {}", id)))?;
    expander.movement_view(uow, &movement, expand)
}

/// Every committed movement of a user, oldest first
pub fn get_movements_for_user(
    uow: &dyn UnitOfWork,
    expander: &Expander<'_>,
    owner: &UserId,
    expand: bool,
) -> Result<Vec<MovementView>> {
    if uow.get_user(owner)?.is_none() {
        return Err(Error::not_found(format!("user {}", owner)));
    }
    uow.get_movements_for_user(owner)?
        .iter()
        .map(|movement| expander.movement_view(uow, movement, expand))
        .collect()
}

/// Service façade running each journal operation in its own unit of work
pub struct MovementJournal {
    store: Arc<dyn LedgerStore>,
    resolver: Arc<dyn ReferenceResolver>,
    max_retries: u32,
}

impl MovementJournal {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        resolver: Arc<dyn ReferenceResolver>,
        max_retries: u32,
    ) -> Self {
        Self {
            store,
            resolver,
            max_retries,
        }
    }

    /// Record a single deposit or withdrawal
    ///
    /// Transfer legs can only be created through a transfer.
    pub fn record(
        &self,
        owner: &UserId,
        amount: Decimal,
        kind: MovementType,
    ) -> Result<MovementId> {
        if kind.is_transfer_leg() {
            return Err(Error::invalid_type(format!(
                "{} movements can only be created by a transfer",
                kind
            )));
        }

        let id = with_retry(self.store.as_ref(), self.max_retries, |uow| {
            create_movement(uow, owner, amount, kind)
        })?;
        info!(movement_id = id.0, kind = %kind, "movement created");
        Ok(id)
    }

    pub fn get(&self, id: MovementId, expand: bool) -> Result<MovementView> {
        let expander = Expander::new(self.resolver.as_ref());
        read_only(self.store.as_ref(), |uow| {
            get_movement(uow, &expander, id, expand)
        })
    }

    pub fn list_for_user(&self, owner: &UserId, expand: bool) -> Result<Vec<MovementView>> {
        let expander = Expander::new(self.resolver.as_ref());
        read_only(self.store.as_ref(), |uow| {
            get_movements_for_user(uow, &expander, owner, expand)
        })
    }

    /// Reference token for a movement
    pub fn reference(&self, id: MovementId) -> String {
        self.resolver.movement(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::duckdb::DuckDbRepository;
    use crate::adapters::uri::UriReferences;
    use crate::domain::User;
    use rust_decimal_macros::dec;

    fn journal_with_user(id: &str) -> (MovementJournal, Arc<DuckDbRepository>, UserId) {
        let repo = Arc::new(DuckDbRepository::open_in_memory().unwrap());
        repo.ensure_schema().unwrap();
        let user_id = UserId::new(id).unwrap();
        let mut uow = repo.begin().unwrap();
        uow.insert_user(&User::new(user_id.clone(), id, "x")).unwrap();
        uow.commit().unwrap();

        let journal = MovementJournal::new(repo.clone(), Arc::new(UriReferences::default()), 3);
        (journal, repo, user_id)
    }

    #[test]
    fn test_record_rejects_transfer_legs() {
        let (journal, _, finn) = journal_with_user("finn");
        let err = journal
            .record(&finn, dec!(10), MovementType::TransferDeposit)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidType(_)));
    }

    #[test]
    fn test_zero_amount_is_rejected_before_any_write() {
        let (journal, repo, finn) = journal_with_user("finn");
        let err = journal
            .record(&finn, Decimal::ZERO, MovementType::FundsDeposit)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidAmount(_)));

        let uow = repo.begin().unwrap();
        assert!(uow.get_movements_for_user(&finn).unwrap().is_empty());
    }

    #[test]
    fn test_staging_writes_nothing() {
        let (_, repo, finn) = journal_with_user("finn");
        let mut staging = StagedMovements::new();
        let mut uow = repo.begin().unwrap();

        let id = stage_movement(
            uow.as_mut(),
            &mut staging,
            &finn,
            dec!(5),
            MovementType::TransferDeposit,
        )
        .unwrap();

        assert!(staging.contains(id));
        assert!(uow.get_movement(id).unwrap().is_none());
        assert_eq!(uow.get_user(&finn).unwrap().unwrap().balance, Decimal::ZERO);
    }

    #[test]
    fn test_staging_runs_the_guard() {
        let (_, repo, finn) = journal_with_user("finn");
        let mut staging = StagedMovements::new();
        let mut uow = repo.begin().unwrap();

        let err = stage_movement(
            uow.as_mut(),
            &mut staging,
            &finn,
            dec!(-1),
            MovementType::TransferWithdrawal,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InsufficientFunds(_)));
        assert!(staging.is_empty());
    }

    #[test]
    fn test_unknown_owner_is_not_found() {
        let (journal, _, _) = journal_with_user("finn");
        let ghost = UserId::new("ghost").unwrap();
        assert!(matches!(
            journal.record(&ghost, dec!(1), MovementType::FundsDeposit),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            journal.list_for_user(&ghost, false),
            Err(Error::NotFound(_))
        ));
    }
}
