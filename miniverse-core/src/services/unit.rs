//! Unit-of-work runners
//!
//! Services never hold a unit of work across calls. They hand a closure to
//! one of these runners, which begins, commits or abandons it.

use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::domain::result::Result;
use crate::ports::{LedgerStore, UnitOfWork};

/// Initial backoff in milliseconds (doubles each retry: 50, 100, 200, 400ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

/// Run `op` in a fresh unit of work, committing on success
///
/// Failures that are retryable (write conflicts) re-run the whole closure in
/// a new unit of work, up to `max_attempts` times. Any other failure drops
/// the unit of work, which rolls it back.
pub fn with_retry<T>(
    store: &dyn LedgerStore,
    max_attempts: u32,
    mut op: impl FnMut(&mut dyn UnitOfWork) -> Result<T>,
) -> Result<T> {
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match attempt_once(store, &mut op) {
            Err(e) if e.is_retryable() && attempt + 1 < max_attempts => {
                let delay = Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                warn!(
                    attempt = attempt + 1,
                    max = max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "unit of work conflicted, retrying"
                );
                thread::sleep(delay);
                attempt += 1;
            }
            outcome => return outcome,
        }
    }
}

/// Run `op` in a fresh unit of work exactly once
///
/// For operations whose conflicts are not transient, like claiming a unique
/// user id.
pub fn run_once<T>(
    store: &dyn LedgerStore,
    mut op: impl FnMut(&mut dyn UnitOfWork) -> Result<T>,
) -> Result<T> {
    attempt_once(store, &mut op)
}

/// Run `op` in a unit of work that is always rolled back
pub fn read_only<T>(
    store: &dyn LedgerStore,
    op: impl FnOnce(&dyn UnitOfWork) -> Result<T>,
) -> Result<T> {
    let uow = store.begin()?;
    let value = op(uow.as_ref())?;
    uow.rollback()?;
    Ok(value)
}

fn attempt_once<T>(
    store: &dyn LedgerStore,
    op: &mut impl FnMut(&mut dyn UnitOfWork) -> Result<T>,
) -> Result<T> {
    let mut uow = store.begin()?;
    let value = op(uow.as_mut())?;
    uow.commit()?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::duckdb::DuckDbRepository;
    use crate::domain::result::Error;
    use crate::domain::{User, UserId};

    fn repo() -> DuckDbRepository {
        let repo = DuckDbRepository::open_in_memory().unwrap();
        repo.ensure_schema().unwrap();
        repo
    }

    #[test]
    fn test_conflicts_are_retried_until_success() {
        let repo = repo();
        let mut calls = 0;
        let value = with_retry(&repo, 3, |_uow| {
            calls += 1;
            if calls < 3 {
                Err(Error::conflict("write-write conflict"))
            } else {
                Ok(calls)
            }
        })
        .unwrap();
        assert_eq!(value, 3);
    }

    #[test]
    fn test_retries_are_bounded() {
        let repo = repo();
        let mut calls = 0;
        let err = with_retry(&repo, 2, |_uow| -> Result<()> {
            calls += 1;
            Err(Error::conflict("still conflicting"))
        })
        .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_validation_errors_are_not_retried() {
        let repo = repo();
        let mut calls = 0;
        let err = with_retry(&repo, 5, |_uow| -> Result<()> {
            calls += 1;
            Err(Error::invalid_amount("zero"))
        })
        .unwrap_err();
        assert!(matches!(err, Error::InvalidAmount(_)));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_failed_closure_leaves_no_writes() {
        let repo = repo();
        let id = UserId::new("marceline").unwrap();
        let _ = run_once(&repo, |uow| -> Result<()> {
            uow.insert_user(&User::new(id.clone(), "Marceline", "x"))?;
            Err(Error::invalid_state("abort"))
        });

        let found = read_only(&repo, |uow| uow.get_user(&id)).unwrap();
        assert!(found.is_none());
    }
}
