//! User service - wallet owners and their balances

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::info;

use crate::domain::credential::hash_secret;
use crate::domain::result::{Error, Result};
use crate::domain::{validate_amount, MovementType, User, UserId};
use crate::ports::{LedgerStore, ReferenceResolver};
use crate::services::expansion::{BalanceView, Expander, UserView};
use crate::services::journal::create_movement;
use crate::services::unit::{read_only, run_once};

pub struct UserService {
    store: Arc<dyn LedgerStore>,
    resolver: Arc<dyn ReferenceResolver>,
}

impl UserService {
    pub fn new(store: Arc<dyn LedgerStore>, resolver: Arc<dyn ReferenceResolver>) -> Self {
        Self { store, resolver }
    }

    /// Create a user, optionally with opening funds
    ///
    /// Opening funds are recorded as a `FUNDS_DEPOSIT` movement, so the
    /// balance always equals the sum of the user's movements. Returns the
    /// user's reference token.
    pub fn create(
        &self,
        id: &UserId,
        name: &str,
        secret: &str,
        opening_funds: Option<Decimal>,
    ) -> Result<String> {
        let funds = opening_funds.filter(|f| !f.is_zero());
        if let Some(funds) = funds {
            validate_amount(funds)?;
            if funds.is_sign_negative() {
                return Err(Error::invalid_amount(format!(
                    "opening funds cannot be negative, got {}",
                    funds
                )));
            }
        }

        let pass_hash = hash_secret(secret)?;
        let user = User::new(id.clone(), name, pass_hash);

        run_once(self.store.as_ref(), |uow| {
            if uow.get_user(id)?.is_some() {
                return Err(Error::conflict(format!("user {} already exists", id)));
            }
            uow.insert_user(&user)?;
            if let Some(funds) = funds {
                create_movement(uow, id, funds, MovementType::FundsDeposit)?;
            }
            Ok(())
        })?;

        info!(user = %id, opening_funds = funds.is_some(), "user created");
        Ok(self.resolver.user(id))
    }

    pub fn get(&self, id: &UserId) -> Result<UserView> {
        let expander = Expander::new(self.resolver.as_ref());
        let user = self.load(id)?;
        Ok(expander.user_view(&user))
    }

    pub fn balance(&self, id: &UserId) -> Result<BalanceView> {
        let expander = Expander::new(self.resolver.as_ref());
        let user = self.load(id)?;
        Ok(expander.balance_view(&user))
    }

    pub fn list(&self) -> Result<Vec<UserView>> {
        let expander = Expander::new(self.resolver.as_ref());
        let users = read_only(self.store.as_ref(), |uow| uow.get_users())?;
        Ok(users.iter().map(|u| expander.user_view(u)).collect())
    }

    fn load(&self, id: &UserId) -> Result<User> {
        read_only(self.store.as_ref(), |uow| uow.get_user(id))?
            .ok_or_else(|| Error::not_found(format!("user {}", id)))
    }
}
