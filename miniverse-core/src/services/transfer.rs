//! Transfer coordinator - pairs a withdrawal and a deposit into one transfer
//!
//! Both legs, both balance changes and the transfer record are written in a
//! single unit of work. If anything fails, none of it is kept.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::domain::result::{Error, Result};
use crate::domain::{
    validate_amount, validate_legs, Movement, MovementId, MovementType, Transfer, TransferId,
    TransferType, UserId,
};
use crate::ports::{LedgerStore, ReferenceResolver, UnitOfWork};
use crate::services::expansion::{Expander, TransferView};
use crate::services::journal::{apply_delta, stage_movement, StagedMovements};
use crate::services::unit::{read_only, with_retry};

/// Rules a transfer must satisfy beyond leg symmetry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferPolicy {
    /// Allow both legs to belong to the same user
    pub allow_self_transfer: bool,
}

/// Where a leg was found
enum Leg {
    Staged(Movement),
    Durable(Movement),
}

impl Leg {
    fn movement(&self) -> &Movement {
        match self {
            Leg::Staged(m) | Leg::Durable(m) => m,
        }
    }
}

fn resolve_leg(
    uow: &dyn UnitOfWork,
    staging: &StagedMovements,
    id: MovementId,
) -> Result<Leg> {
    if let Some(movement) = staging.get(id) {
        return Ok(Leg::Staged(movement.clone()));
    }
    let movement = uow
        .get_movement(id)?
        .ok_or_else(|| Error::not_found(format!("movement {}", id)))?;
    if let Some(existing) = uow.find_transfer_for_movement(id)? {
        return Err(Error::invalid_state(format!(
            "movement {} already belongs to transfer {}",
            id, existing
        )));
    }
    Ok(Leg::Durable(movement))
}

/// Validate two legs and commit them as a transfer inside `uow`
///
/// Legs are looked up in `staging` first, then among durable movements.
/// Staged legs are made durable here and their balance deltas applied in
/// ascending user-id order; durable legs were applied when they were
/// recorded. Nothing is written unless every check passes.
pub fn create_transfer(
    uow: &mut dyn UnitOfWork,
    staging: &mut StagedMovements,
    policy: TransferPolicy,
    withdrawal_id: MovementId,
    deposit_id: MovementId,
    comment: &str,
    kind: TransferType,
) -> Result<TransferId> {
    if withdrawal_id == deposit_id {
        return Err(Error::invalid_state(format!(
            "movement {} cannot be both legs of a transfer",
            withdrawal_id
        )));
    }

    let withdrawal = resolve_leg(uow, staging, withdrawal_id)?;
    let deposit = resolve_leg(uow, staging, deposit_id)?;

    validate_legs(withdrawal.movement(), deposit.movement())?;

    if !policy.allow_self_transfer && withdrawal.movement().owner == deposit.movement().owner {
        return Err(Error::invalid_state(format!(
            "self-transfers are not allowed (user {})",
            withdrawal.movement().owner
        )));
    }

    let mut pending: Vec<Movement> = [withdrawal, deposit]
        .into_iter()
        .filter_map(|leg| match leg {
            Leg::Staged(m) => Some(m),
            Leg::Durable(_) => None,
        })
        .collect();
    // Fixed lock order: two opposite transfers between the same pair of
    // users always touch their rows in the same sequence.
    pending.sort_by(|a, b| a.owner.cmp(&b.owner).then(a.id.cmp(&b.id)));

    for movement in &pending {
        apply_delta(uow, &movement.owner, movement.amount)?;
        uow.insert_movement(movement)?;
    }

    let transfer = Transfer {
        id: uow.next_transfer_id()?,
        withdrawal_id,
        deposit_id,
        comment: comment.to_string(),
        kind,
        created_at: chrono::Utc::now(),
    };
    uow.insert_transfer(&transfer)?;

    for movement in &pending {
        staging.take(movement.id);
    }

    debug!(
        transfer_id = transfer.id.0,
        staged_legs = pending.len(),
        "transfer written"
    );
    Ok(transfer.id)
}

pub fn get_transfer(
    uow: &dyn UnitOfWork,
    expander: &Expander<'_>,
    id: TransferId,
    expand: bool,
) -> Result<TransferView> {
    let transfer = uow
        .get_transfer(id)?
        .ok_or_else(|| Error::not_found(format!("transfer {}", id)))?;
    expander.transfer_view(uow, &transfer, expand)
}

/// Transfers in which the user sent or received money, oldest first
pub fn get_transfers_for_user(
    uow: &dyn UnitOfWork,
    expander: &Expander<'_>,
    user: &UserId,
    expand: bool,
) -> Result<Vec<TransferView>> {
    if uow.get_user(user)?.is_none() {
        return Err(Error::not_found(format!("user {}", user)));
    }
    uow.get_transfers_for_user(user)?
        .iter()
        .map(|transfer| expander.transfer_view(uow, transfer, expand))
        .collect()
}

/// Service façade for transfers
pub struct TransferCoordinator {
    store: Arc<dyn LedgerStore>,
    resolver: Arc<dyn ReferenceResolver>,
    policy: TransferPolicy,
    max_retries: u32,
}

impl TransferCoordinator {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        resolver: Arc<dyn ReferenceResolver>,
        policy: TransferPolicy,
        max_retries: u32,
    ) -> Self {
        Self {
            store,
            resolver,
            policy,
            max_retries,
        }
    }

    pub fn policy(&self) -> TransferPolicy {
        self.policy
    }

    /// Move `amount` from `sender` to `receiver`
    ///
    /// Stages a withdrawal of `-amount` and a deposit of `amount`, then
    /// commits both with the transfer.
    pub fn transfer(
        &self,
        sender: &UserId,
        receiver: &UserId,
        amount: Decimal,
        comment: &str,
        kind: TransferType,
    ) -> Result<TransferId> {
        validate_amount(amount)?;
        if amount < Decimal::ZERO {
            return Err(Error::invalid_amount(format!(
                "transfer amount must be positive, got {}",
                amount
            )));
        }

        let id = with_retry(self.store.as_ref(), self.max_retries, |uow| {
            let mut staging = StagedMovements::new();
            let withdrawal = stage_movement(
                uow,
                &mut staging,
                sender,
                -amount,
                MovementType::TransferWithdrawal,
            )?;
            let deposit = stage_movement(
                uow,
                &mut staging,
                receiver,
                amount,
                MovementType::TransferDeposit,
            )?;
            create_transfer(
                uow,
                &mut staging,
                self.policy,
                withdrawal,
                deposit,
                comment,
                kind,
            )
        })?;

        info!(transfer_id = id.0, kind = %kind, "transfer created");
        Ok(id)
    }

    /// Link two already recorded movements into a transfer
    pub fn link(
        &self,
        withdrawal_id: MovementId,
        deposit_id: MovementId,
        comment: &str,
        kind: TransferType,
    ) -> Result<TransferId> {
        let id = with_retry(self.store.as_ref(), self.max_retries, |uow| {
            let mut staging = StagedMovements::new();
            create_transfer(
                uow,
                &mut staging,
                self.policy,
                withdrawal_id,
                deposit_id,
                comment,
                kind,
            )
        })?;

        info!(transfer_id = id.0, kind = %kind, "transfer linked");
        Ok(id)
    }

    pub fn get(&self, id: TransferId, expand: bool) -> Result<TransferView> {
        let expander = Expander::new(self.resolver.as_ref());
        read_only(self.store.as_ref(), |uow| {
            get_transfer(uow, &expander, id, expand)
        })
    }

    pub fn list_for_user(&self, user: &UserId, expand: bool) -> Result<Vec<TransferView>> {
        let expander = Expander::new(self.resolver.as_ref());
        read_only(self.store.as_ref(), |uow| {
            get_transfers_for_user(uow, &expander, user, expand)
        })
    }

    /// Reference token for a transfer
    pub fn reference(&self, id: TransferId) -> String {
        self.resolver.transfer(id)
    }
}
