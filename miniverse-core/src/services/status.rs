//! Status service - ledger summary and consistency audit

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::warn;

use crate::adapters::duckdb::DuckDbRepository;
use crate::domain::result::Result;
use crate::domain::UserId;
use crate::ports::RecordCounts;
use crate::services::unit::read_only;

/// Status service for ledger summaries
pub struct StatusService {
    repository: Arc<DuckDbRepository>,
}

impl StatusService {
    pub fn new(repository: Arc<DuckDbRepository>) -> Self {
        Self { repository }
    }

    /// Get overall status summary
    pub fn get_status(&self) -> Result<StatusSummary> {
        let (counts, total_balance) = read_only(self.repository.as_ref(), |uow| {
            let counts = uow.count_records()?;
            let total = uow.get_users()?.iter().map(|u| u.balance).sum::<Decimal>();
            Ok((counts, total))
        })?;

        Ok(StatusSummary {
            counts,
            total_balance,
            db_path: self
                .repository
                .db_path()
                .map(|p| p.display().to_string()),
            db_size_bytes: self.repository.get_db_size().unwrap_or(0),
        })
    }

    /// Recompute every balance from the movement history
    ///
    /// A user whose stored balance differs from the sum of their movements
    /// is reported as a divergence.
    pub fn audit(&self) -> Result<AuditReport> {
        let report = read_only(self.repository.as_ref(), |uow| {
            let mut divergences = Vec::new();
            let users = uow.get_users()?;
            for user in &users {
                let recomputed = uow.sum_movements_for_user(&user.id)?;
                if recomputed != user.balance {
                    divergences.push(BalanceDivergence {
                        user: user.id.clone(),
                        stored: user.balance,
                        recomputed,
                    });
                }
            }
            Ok(AuditReport {
                users_checked: users.len(),
                counts: uow.count_records()?,
                divergences,
            })
        })?;

        if !report.is_consistent() {
            warn!(
                divergent_users = report.divergences.len(),
                "ledger audit found balance divergences"
            );
        }
        Ok(report)
    }
}

#[derive(Debug, Serialize)]
pub struct StatusSummary {
    pub counts: RecordCounts,
    pub total_balance: Decimal,
    pub db_path: Option<String>,
    pub db_size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceDivergence {
    pub user: UserId,
    pub stored: Decimal,
    pub recomputed: Decimal,
}

#[derive(Debug, Serialize)]
pub struct AuditReport {
    pub users_checked: usize,
    pub counts: RecordCounts,
    pub divergences: Vec<BalanceDivergence>,
}

impl AuditReport {
    pub fn is_consistent(&self) -> bool {
        self.divergences.is_empty()
    }
}
