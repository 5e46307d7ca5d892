//! Query/expansion - read models for users, movements and transfers
//!
//! A related entity appears either as a reference token or, on request, as
//! its full view. Expansion goes exactly one level deep: an expanded transfer
//! embeds its movements, but their owners stay references.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::result::{Error, Result};
use crate::domain::{
    Movement, MovementId, MovementType, Transfer, TransferId, TransferType, User, UserId,
};
use crate::ports::{ReferenceResolver, UnitOfWork};

/// A related entity, as a reference token or embedded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Expandable<T> {
    Reference(String),
    Expanded(T),
}

impl<T> Expandable<T> {
    pub fn is_expanded(&self) -> bool {
        matches!(self, Self::Expanded(_))
    }

    pub fn reference(&self) -> Option<&str> {
        match self {
            Self::Reference(token) => Some(token),
            Self::Expanded(_) => None,
        }
    }

    pub fn expanded(&self) -> Option<&T> {
        match self {
            Self::Reference(_) => None,
            Self::Expanded(view) => Some(view),
        }
    }
}

/// Public view of a user; the credential hash is never included
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserView {
    pub uri: String,
    pub id: UserId,
    pub name: String,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementView {
    pub uri: String,
    pub id: MovementId,
    pub user: Expandable<UserView>,
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub kind: MovementType,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferView {
    pub uri: String,
    pub id: TransferId,
    pub withdrawal: Expandable<MovementView>,
    pub deposit: Expandable<MovementView>,
    pub comment: String,
    #[serde(rename = "type")]
    pub kind: TransferType,
    pub created_at: DateTime<Utc>,
}

/// Balance lookup result: `{ "balance": .., "user": <reference> }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceView {
    pub balance: Decimal,
    pub user: String,
}

/// Builds views, resolving references through a [`ReferenceResolver`]
#[derive(Clone, Copy)]
pub struct Expander<'r> {
    resolver: &'r dyn ReferenceResolver,
}

impl<'r> Expander<'r> {
    pub fn new(resolver: &'r dyn ReferenceResolver) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &'r dyn ReferenceResolver {
        self.resolver
    }

    pub fn user_view(&self, user: &User) -> UserView {
        UserView {
            uri: self.resolver.user(&user.id),
            id: user.id.clone(),
            name: user.name.clone(),
            balance: user.balance,
            created_at: user.created_at,
        }
    }

    pub fn balance_view(&self, user: &User) -> BalanceView {
        BalanceView {
            balance: user.balance,
            user: self.resolver.user(&user.id),
        }
    }

    /// View of a movement; with `expand` the owner is embedded
    pub fn movement_view(
        &self,
        uow: &dyn UnitOfWork,
        movement: &Movement,
        expand: bool,
    ) -> Result<MovementView> {
        let user = if expand {
            let owner = uow
                .get_user(&movement.owner)?
                .ok_or_else(|| Error::not_found(format!("user {}", movement.owner)))?;
            Expandable::Expanded(self.user_view(&owner))
        } else {
            Expandable::Reference(self.resolver.user(&movement.owner))
        };

        Ok(MovementView {
            uri: self.resolver.movement(movement.id),
            id: movement.id,
            user,
            amount: movement.amount,
            kind: movement.kind,
            created_at: movement.created_at,
        })
    }

    /// View of a transfer; with `expand` both legs are embedded
    pub fn transfer_view(
        &self,
        uow: &dyn UnitOfWork,
        transfer: &Transfer,
        expand: bool,
    ) -> Result<TransferView> {
        let leg = |id: MovementId| -> Result<Expandable<MovementView>> {
            if !expand {
                return Ok(Expandable::Reference(self.resolver.movement(id)));
            }
            let movement = uow
                .get_movement(id)?
                .ok_or_else(|| Error::not_found(format!("movement {}", id)))?;
            // One level only: the leg's owner stays a reference
            Ok(Expandable::Expanded(self.movement_view(uow, &movement, false)?))
        };

        Ok(TransferView {
            uri: self.resolver.transfer(transfer.id),
            id: transfer.id,
            withdrawal: leg(transfer.withdrawal_id)?,
            deposit: leg(transfer.deposit_id)?,
            comment: transfer.comment.clone(),
            kind: transfer.kind,
            created_at: transfer.created_at,
        })
    }
}
