//! Log database migrations - embedded SQL files
//!
//! Kept separate from the ledger migrations because the event log lives in
//! its own database file.

pub const LOG_MIGRATIONS: &[(&str, &str)] = &[
    ("000_migrations.sql", include_str!("000_migrations.sql")),
    ("001_initial_schema.sql", include_str!("001_initial_schema.sql")),
];
