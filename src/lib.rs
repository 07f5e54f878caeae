//! # Lazylink - Symbol resolution core for just-in-time linking
//!
//! Tracks which symbols exist in a growing program image, which already have
//! addresses, which are only declared and still need to be materialized, and
//! which requests are waiting on which symbols.
//!
//! Lazylink provides:
//! - A symbol table with eager and lazy definitions
//! - Metadata lookups that never force materialization
//! - Materializing lookups that trigger each lazy symbol at most once
//! - Two-stage resolution queries (resolved, then ready)
//! - A TOML image manifest and CLI for driving a table by hand

pub mod name;
pub mod symbol;
pub mod query;
pub mod source;
pub mod table;
pub mod manifest;
pub mod config;
pub mod output;
pub mod ui;

// Re-exports for convenient access
pub use name::{SymbolName, SymbolStringPool};
pub use symbol::{JitSymbol, SymbolFlags, SymbolFlagsMap, SymbolMap, SymbolNameSet, TargetAddress};
pub use query::{QueryReceiver, ResolutionQuery};
pub use source::{MaterializationSource, SimpleSource, SourceRef};
pub use table::{
    LookupFlagsResult, LookupResult, MaterializationBatch, MaterializationWork, SymbolState,
    SymbolTable, TableStats,
};

/// Result type alias for Lazylink operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Lazylink operations.
///
/// Cloneable so that one failure can be handed to every query waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("Duplicate definition: {0}")]
    DuplicateDefinition(SymbolName),

    #[error("Symbols not found: {}", join_names(.0))]
    SymbolsNotFound(Vec<SymbolName>),

    #[error("Invalid state transition: cannot {operation} {name} while {state}")]
    InvalidStateTransition {
        name: SymbolName,
        state: SymbolState,
        operation: &'static str,
    },

    #[error("Failed to materialize {name}: {reason}")]
    MaterializationFailure { name: SymbolName, reason: String },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid flags: {0}")]
    InvalidFlags(String),
}

fn join_names(names: &[SymbolName]) -> String {
    names.iter().map(SymbolName::as_str).collect::<Vec<_>>().join(", ")
}
