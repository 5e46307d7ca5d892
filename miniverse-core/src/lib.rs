//! Miniverse Core - a ledger of wallet movements and symmetric transfers
//!
//! This crate implements the core domain logic following hexagonal architecture:
//!
//! - **domain**: Core business entities (User, Movement, Transfer, CreditCard)
//! - **ports**: Trait definitions for external dependencies (LedgerStore, ReferenceResolver)
//! - **services**: Business logic orchestration (journal, transfers, expansion)
//! - **adapters**: Concrete implementations (DuckDB, path-style references)

pub mod adapters;
pub mod config;
pub mod domain;
pub mod log_migrations;
pub mod migrations;
pub mod ports;
pub mod services;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use adapters::duckdb::DuckDbRepository;
use adapters::uri::UriReferences;
use config::Config;
use ports::{LedgerStore, ReferenceResolver};
use services::*;

// Re-export commonly used types at crate root
pub use domain::result::{Error, OperationResult};
pub use domain::{
    CardNumber, CardStatus, CreditCard, Movement, MovementId, MovementType, Transfer,
    TransferId, TransferType, User, UserId,
};

/// Name of the ledger database file inside the miniverse directory
pub const DB_FILENAME: &str = "miniverse.duckdb";

/// Main context for Miniverse operations
///
/// This is the primary entry point for all business logic. It holds
/// the database connection, configuration, and all services.
pub struct MiniverseContext {
    pub config: Config,
    pub repository: Arc<DuckDbRepository>,
    pub references: Arc<UriReferences>,
    pub user_service: UserService,
    pub journal: MovementJournal,
    pub transfers: TransferCoordinator,
    pub card_service: CardService,
    pub status_service: StatusService,
}

impl MiniverseContext {
    /// Open the ledger in `miniverse_dir`, creating it if needed
    pub fn new(miniverse_dir: &Path) -> Result<Self> {
        let config = Config::load(miniverse_dir)?;
        let repository = Arc::new(DuckDbRepository::new(&miniverse_dir.join(DB_FILENAME))?);
        Self::with_repository(config, repository)
    }

    /// Build a context over an in-memory ledger
    pub fn in_memory(config: Config) -> Result<Self> {
        Self::with_repository(config, Arc::new(DuckDbRepository::open_in_memory()?))
    }

    fn with_repository(config: Config, repository: Arc<DuckDbRepository>) -> Result<Self> {
        // Initialize schema
        repository.ensure_schema()?;

        let references = Arc::new(UriReferences::new(config.reference_prefix.clone()));
        let store: Arc<dyn LedgerStore> = repository.clone();
        let resolver: Arc<dyn ReferenceResolver> = references.clone();
        let policy = TransferPolicy {
            allow_self_transfer: config.allow_self_transfer,
        };

        Ok(Self {
            user_service: UserService::new(Arc::clone(&store), Arc::clone(&resolver)),
            journal: MovementJournal::new(
                Arc::clone(&store),
                Arc::clone(&resolver),
                config.max_retries,
            ),
            transfers: TransferCoordinator::new(
                Arc::clone(&store),
                Arc::clone(&resolver),
                policy,
                config.max_retries,
            ),
            card_service: CardService::new(Arc::clone(&store), config.max_retries),
            status_service: StatusService::new(Arc::clone(&repository)),
            config,
            repository,
            references,
        })
    }
}
