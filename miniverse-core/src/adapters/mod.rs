//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - DuckDB for the LedgerStore port
//! - Path-style tokens for the ReferenceResolver port

pub mod duckdb;
pub mod uri;
