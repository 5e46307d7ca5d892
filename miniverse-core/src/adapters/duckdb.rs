//! DuckDB repository implementation
//!
//! One connection guarded by a mutex. A unit of work holds the guard from
//! `BEGIN` until commit or rollback, so units of work are serialized and a
//! balance read inside one cannot go stale before its update.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use duckdb::{params, Connection};
use rust_decimal::Decimal;
use tracing::warn;

use crate::domain::result::{Error, Result};
use crate::domain::{
    CardNumber, CreditCard, Movement, MovementId, Transfer, TransferId, User, UserId,
};
use crate::ports::{BalanceUpdate, LedgerStore, RecordCounts, UnitOfWork};
use crate::services::{MigrationResult, MigrationService};

/// Maximum number of retries when the database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400, 800ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_open_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows error messages
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS error messages
        || lower.contains("resource temporarily unavailable")
        || lower.contains("could not set lock")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
}

impl From<duckdb::Error> for Error {
    fn from(err: duckdb::Error) -> Self {
        let msg = err.to_string();
        let lower = msg.to_lowercase();
        // Uniqueness violations and write-write conflicts are only
        // distinguishable by message text.
        if lower.contains("constraint")
            || lower.contains("duplicate key")
            || lower.contains("conflict")
        {
            Self::IntegrityConflict(msg)
        } else {
            Self::Database(msg)
        }
    }
}

/// DuckDB-backed ledger store
pub struct DuckDbRepository {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl DuckDbRepository {
    /// Open (or create) a ledger database file
    ///
    /// Retries with exponential backoff while another process holds the
    /// file lock.
    pub fn new(db_path: &Path) -> anyhow::Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Mutex::new(conn),
                        db_path: Some(db_path.to_path_buf()),
                    });
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_open_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        warn!(
                            delay_ms = delay.as_millis() as u64,
                            attempt = attempt + 1,
                            max = MAX_RETRIES,
                            error = %err_msg,
                            "database busy, retrying"
                        );
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| anyhow!("Failed to open database after {} retries", MAX_RETRIES)))
    }

    /// Open a private in-memory ledger (used by tests and dry runs)
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        let conn = Connection::open_in_memory_with_flags(config)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: None,
        })
    }

    fn try_open_connection(db_path: &Path) -> anyhow::Result<Connection> {
        // Extension autoloading stays off; nothing here needs extensions
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Ok(Connection::open_with_flags(db_path, config)?)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A panicking holder rolled its transaction back in Drop, so the
        // connection is still consistent.
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run database migrations
    pub fn run_migrations(&self) -> anyhow::Result<MigrationResult> {
        let conn = self.lock();
        MigrationService::new(&conn).run_pending()
    }

    /// Ensure database schema exists (runs pending migrations)
    pub fn ensure_schema(&self) -> anyhow::Result<()> {
        self.run_migrations()?;
        Ok(())
    }

    /// Path of the database file, `None` for in-memory databases
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Size of the database file in bytes
    pub fn get_db_size(&self) -> anyhow::Result<u64> {
        match &self.db_path {
            Some(path) => Ok(std::fs::metadata(path)?.len()),
            None => Ok(0),
        }
    }
}

impl LedgerStore for DuckDbRepository {
    fn begin(&self) -> Result<Box<dyn UnitOfWork + '_>> {
        let conn = self.lock();
        conn.execute_batch("BEGIN TRANSACTION")?;
        Ok(Box::new(DuckDbUnitOfWork {
            conn,
            finished: false,
        }))
    }
}

/// An open DuckDB transaction
pub struct DuckDbUnitOfWork<'a> {
    conn: MutexGuard<'a, Connection>,
    finished: bool,
}

impl Drop for DuckDbUnitOfWork<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                warn!(error = %e, "rollback of abandoned unit of work failed");
            }
        }
    }
}

const USER_COLUMNS: &str = "user_id, name, pass_hash, balance::VARCHAR, created_at";
const MOVEMENT_COLUMNS: &str = "movement_id, user_id, amount::VARCHAR, movement_type, created_at";
const TRANSFER_COLUMNS: &str =
    "transfer_id, withdrawal_id, deposit_id, comment, transfer_type, created_at";
const CARD_COLUMNS: &str =
    "card_number, user_id, status, issued_at, active_since, expires_at";

impl DuckDbUnitOfWork<'_> {
    fn query_one<T>(
        &self,
        sql: &str,
        params: &[&dyn duckdb::ToSql],
        map: impl FnOnce(&duckdb::Row<'_>) -> duckdb::Result<T>,
    ) -> Result<Option<T>> {
        match self.conn.query_row(sql, params, map) {
            Ok(value) => Ok(Some(value)),
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn query_all<T>(
        &self,
        sql: &str,
        params: &[&dyn duckdb::ToSql],
        map: impl FnMut(&duckdb::Row<'_>) -> duckdb::Result<T>,
    ) -> Result<Vec<T>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params, map)?
            .collect::<duckdb::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

impl UnitOfWork for DuckDbUnitOfWork<'_> {
    // === Users ===

    fn insert_user(&mut self, user: &User) -> Result<()> {
        self.conn.execute(
            "INSERT INTO mv_users (user_id, name, pass_hash, balance, created_at)
             VALUES (?, ?, ?, CAST(? AS DECIMAL(38, 10)), ?)",
            params![
                user.id.as_str(),
                user.name,
                user.pass_hash,
                user.balance.to_string(),
                user.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn get_user(&self, id: &UserId) -> Result<Option<User>> {
        let sql = format!("SELECT {} FROM mv_users WHERE user_id = ?", USER_COLUMNS);
        self.query_one(&sql, &[&id.as_str()], UserRow::from_row)?
            .map(UserRow::into_domain)
            .transpose()
    }

    fn get_users(&self) -> Result<Vec<User>> {
        let sql = format!("SELECT {} FROM mv_users ORDER BY user_id", USER_COLUMNS);
        self.query_all(&sql, &[], UserRow::from_row)?
            .into_iter()
            .map(UserRow::into_domain)
            .collect()
    }

    fn apply_balance_delta(&mut self, id: &UserId, delta: Decimal) -> Result<BalanceUpdate> {
        let delta_str = delta.to_string();
        // The sufficiency check is part of the UPDATE itself, so it is
        // evaluated against the balance at application time.
        let changed = self.conn.execute(
            "UPDATE mv_users
             SET balance = balance + CAST(? AS DECIMAL(38, 10))
             WHERE user_id = ?
               AND (CAST(? AS DECIMAL(38, 10)) >= 0
                    OR balance + CAST(? AS DECIMAL(38, 10)) >= 0)",
            params![delta_str, id.as_str(), delta_str, delta_str],
        )?;

        let balance = self.query_one(
            "SELECT balance::VARCHAR FROM mv_users WHERE user_id = ?",
            &[&id.as_str()],
            |row| row.get::<_, String>(0),
        )?;

        match (changed, balance) {
            (_, None) => Ok(BalanceUpdate::UnknownUser),
            (0, Some(_)) => Ok(BalanceUpdate::Insufficient),
            (_, Some(balance)) => Ok(BalanceUpdate::Applied(parse_decimal(&balance)?)),
        }
    }

    // === Movements ===

    fn next_movement_id(&mut self) -> Result<MovementId> {
        let id: i64 = self
            .conn
            .query_row("SELECT nextval('seq_movement_id')", [], |row| row.get(0))?;
        Ok(MovementId(id))
    }

    fn insert_movement(&mut self, movement: &Movement) -> Result<()> {
        self.conn.execute(
            "INSERT INTO mv_movements (movement_id, user_id, amount, movement_type, created_at)
             VALUES (?, ?, CAST(? AS DECIMAL(38, 10)), ?, ?)",
            params![
                movement.id.0,
                movement.owner.as_str(),
                movement.amount.to_string(),
                movement.kind.as_str(),
                movement.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn get_movement(&self, id: MovementId) -> Result<Option<Movement>> {
        let sql = format!(
            "SELECT {} FROM mv_movements WHERE movement_id = ?",
            MOVEMENT_COLUMNS
        );
        self.query_one(&sql, &[&id.0], MovementRow::from_row)?
            .map(MovementRow::into_domain)
            .transpose()
    }

    fn get_movements_for_user(&self, id: &UserId) -> Result<Vec<Movement>> {
        let sql = format!(
            "SELECT {} FROM mv_movements WHERE user_id = ? ORDER BY movement_id",
            MOVEMENT_COLUMNS
        );
        self.query_all(&sql, &[&id.as_str()], MovementRow::from_row)?
            .into_iter()
            .map(MovementRow::into_domain)
            .collect()
    }

    fn sum_movements_for_user(&self, id: &UserId) -> Result<Decimal> {
        let total: String = self.conn.query_row(
            "SELECT COALESCE(SUM(amount), 0)::VARCHAR FROM mv_movements WHERE user_id = ?",
            [id.as_str()],
            |row| row.get(0),
        )?;
        parse_decimal(&total)
    }

    // === Transfers ===

    fn next_transfer_id(&mut self) -> Result<TransferId> {
        let id: i64 = self
            .conn
            .query_row("SELECT nextval('seq_transfer_id')", [], |row| row.get(0))?;
        Ok(TransferId(id))
    }

    fn insert_transfer(&mut self, transfer: &Transfer) -> Result<()> {
        self.conn.execute(
            "INSERT INTO mv_transfers
                 (transfer_id, withdrawal_id, deposit_id, comment, transfer_type, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                transfer.id.0,
                transfer.withdrawal_id.0,
                transfer.deposit_id.0,
                transfer.comment,
                transfer.kind.as_str(),
                transfer.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn get_transfer(&self, id: TransferId) -> Result<Option<Transfer>> {
        let sql = format!(
            "SELECT {} FROM mv_transfers WHERE transfer_id = ?",
            TRANSFER_COLUMNS
        );
        self.query_one(&sql, &[&id.0], TransferRow::from_row)?
            .map(TransferRow::into_domain)
            .transpose()
    }

    fn get_transfers_for_user(&self, id: &UserId) -> Result<Vec<Transfer>> {
        let sql = "SELECT t.transfer_id, t.withdrawal_id, t.deposit_id, t.comment,
                          t.transfer_type, t.created_at
                   FROM mv_transfers t
                   JOIN mv_movements w ON w.movement_id = t.withdrawal_id
                   JOIN mv_movements d ON d.movement_id = t.deposit_id
                   WHERE w.user_id = ? OR d.user_id = ?
                   ORDER BY t.transfer_id";
        self.query_all(sql, &[&id.as_str(), &id.as_str()], TransferRow::from_row)?
            .into_iter()
            .map(TransferRow::into_domain)
            .collect()
    }

    fn find_transfer_for_movement(&self, id: MovementId) -> Result<Option<TransferId>> {
        self.query_one(
            "SELECT transfer_id FROM mv_transfers WHERE withdrawal_id = ? OR deposit_id = ?",
            &[&id.0, &id.0],
            |row| row.get::<_, i64>(0),
        )
        .map(|found| found.map(TransferId))
    }

    // === Cards ===

    fn insert_card(&mut self, card: &CreditCard) -> Result<()> {
        self.conn.execute(
            "INSERT INTO mv_cards
                 (card_number, user_id, status, issued_at, active_since, expires_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                card.number.as_str(),
                card.owner.as_str(),
                card.status.as_str(),
                card.issued_at.to_rfc3339(),
                card.active_since.map(|t| t.to_rfc3339()),
                card.expires_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn update_card(&mut self, card: &CreditCard) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE mv_cards SET status = ?, active_since = ? WHERE card_number = ?",
            params![
                card.status.as_str(),
                card.active_since.map(|t| t.to_rfc3339()),
                card.number.as_str(),
            ],
        )?;
        if changed == 0 {
            return Err(Error::not_found(format!("card {}", card.number.masked())));
        }
        Ok(())
    }

    fn get_card(&self, number: &CardNumber) -> Result<Option<CreditCard>> {
        let sql = format!("SELECT {} FROM mv_cards WHERE card_number = ?", CARD_COLUMNS);
        self.query_one(&sql, &[&number.as_str()], CardRow::from_row)?
            .map(CardRow::into_domain)
            .transpose()
    }

    fn get_cards_for_user(&self, id: &UserId) -> Result<Vec<CreditCard>> {
        let sql = format!(
            "SELECT {} FROM mv_cards WHERE user_id = ? ORDER BY issued_at, card_number",
            CARD_COLUMNS
        );
        self.query_all(&sql, &[&id.as_str()], CardRow::from_row)?
            .into_iter()
            .map(CardRow::into_domain)
            .collect()
    }

    // === Statistics ===

    fn count_records(&self) -> Result<RecordCounts> {
        let counts = self.conn.query_row(
            "SELECT (SELECT COUNT(*) FROM mv_users),
                    (SELECT COUNT(*) FROM mv_movements),
                    (SELECT COUNT(*) FROM mv_transfers),
                    (SELECT COUNT(*) FROM mv_cards)",
            [],
            |row| {
                Ok(RecordCounts {
                    users: row.get(0)?,
                    movements: row.get(1)?,
                    transfers: row.get(2)?,
                    cards: row.get(3)?,
                })
            },
        )?;
        Ok(counts)
    }

    // === Lifecycle ===

    fn commit(mut self: Box<Self>) -> Result<()> {
        self.finished = true;
        if let Err(e) = self.conn.execute_batch("COMMIT") {
            // A failed COMMIT leaves the transaction open in DuckDB
            let _ = self.conn.execute_batch("ROLLBACK");
            return Err(e.into());
        }
        Ok(())
    }

    fn rollback(mut self: Box<Self>) -> Result<()> {
        self.finished = true;
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }
}

// Row helpers: read raw columns first, convert to domain types outside the
// duckdb row callback so conversion failures keep their own error kind.

struct UserRow {
    id: String,
    name: String,
    pass_hash: String,
    balance: String,
    created_at: String,
}

impl UserRow {
    fn from_row(row: &duckdb::Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            pass_hash: row.get(2)?,
            balance: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    fn into_domain(self) -> Result<User> {
        Ok(User {
            id: stored_user_id(self.id)?,
            name: self.name,
            pass_hash: self.pass_hash,
            balance: parse_decimal(&self.balance)?,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

struct MovementRow {
    id: i64,
    user_id: String,
    amount: String,
    kind: String,
    created_at: String,
}

impl MovementRow {
    fn from_row(row: &duckdb::Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            amount: row.get(2)?,
            kind: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    fn into_domain(self) -> Result<Movement> {
        Ok(Movement {
            id: MovementId(self.id),
            owner: stored_user_id(self.user_id)?,
            amount: parse_decimal(&self.amount)?,
            kind: self
                .kind
                .parse()
                .map_err(|_| Error::database(format!("corrupt movement type '{}'", self.kind)))?,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

struct TransferRow {
    id: i64,
    withdrawal_id: i64,
    deposit_id: i64,
    comment: String,
    kind: String,
    created_at: String,
}

impl TransferRow {
    fn from_row(row: &duckdb::Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            withdrawal_id: row.get(1)?,
            deposit_id: row.get(2)?,
            comment: row.get(3)?,
            kind: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    fn into_domain(self) -> Result<Transfer> {
        Ok(Transfer {
            id: TransferId(self.id),
            withdrawal_id: MovementId(self.withdrawal_id),
            deposit_id: MovementId(self.deposit_id),
            comment: self.comment,
            kind: self
                .kind
                .parse()
                .map_err(|_| Error::database(format!("corrupt transfer type '{}'", self.kind)))?,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

struct CardRow {
    number: String,
    user_id: String,
    status: String,
    issued_at: String,
    active_since: Option<String>,
    expires_at: String,
}

impl CardRow {
    fn from_row(row: &duckdb::Row<'_>) -> duckdb::Result<Self> {
        Ok(Self {
            number: row.get(0)?,
            user_id: row.get(1)?,
            status: row.get(2)?,
            issued_at: row.get(3)?,
            active_since: row.get(4)?,
            expires_at: row.get(5)?,
        })
    }

    fn into_domain(self) -> Result<CreditCard> {
        Ok(CreditCard {
            number: CardNumber::new(self.number)
                .map_err(|e| Error::database(format!("corrupt card number: {}", e)))?,
            owner: stored_user_id(self.user_id)?,
            status: self
                .status
                .parse()
                .map_err(|_| Error::database(format!("corrupt card status '{}'", self.status)))?,
            issued_at: parse_timestamp(&self.issued_at)?,
            active_since: self
                .active_since
                .as_deref()
                .map(parse_timestamp)
                .transpose()?,
            expires_at: parse_timestamp(&self.expires_at)?,
        })
    }
}

// Helper functions

fn stored_user_id(raw: String) -> Result<UserId> {
    UserId::new(raw).map_err(|e| Error::database(format!("corrupt user id: {}", e)))
}

fn parse_decimal(s: &str) -> Result<Decimal> {
    Decimal::from_str_exact(s.trim())
        .map(|d| d.normalize())
        .map_err(|e| Error::database(format!("corrupt decimal '{}': {}", s, e)))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::database(format!("corrupt timestamp '{}': {}", s, e)))
}
