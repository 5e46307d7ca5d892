//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external dependencies. The core domain
//! depends only on these traits, not on concrete implementations.

mod reference;
mod repository;

pub use reference::ReferenceResolver;
pub use repository::{BalanceUpdate, LedgerStore, RecordCounts, UnitOfWork};
