//! Symbol entries and their lifecycle states

use crate::query::ResolutionQuery;
use crate::source::SourceRef;
use crate::symbol::{SymbolFlags, TargetAddress};
use crate::Error;
use std::fmt;
use std::sync::Arc;

/// Lifecycle state of a table entry.
///
/// Entries only move forward: `Lazy -> Materializing -> Resolved -> Ready`,
/// with eager definitions entering directly at `Ready`. `Failed` is terminal
/// and reachable from `Materializing` or `Resolved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolState {
    /// Declared by a source, not yet requested
    Lazy,
    /// Requested; the owning source is producing it
    Materializing,
    /// Address known, not yet finalized
    Resolved,
    /// Address known and content usable
    Ready,
    /// The owning source reported it could not produce the symbol
    Failed,
}

impl SymbolState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolState::Lazy => "lazy",
            SymbolState::Materializing => "materializing",
            SymbolState::Resolved => "resolved",
            SymbolState::Ready => "ready",
            SymbolState::Failed => "failed",
        }
    }

    pub fn all() -> &'static [SymbolState] {
        &[
            SymbolState::Lazy,
            SymbolState::Materializing,
            SymbolState::Resolved,
            SymbolState::Ready,
            SymbolState::Failed,
        ]
    }
}

impl fmt::Display for SymbolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-state payload. The owning source only exists before resolution and
/// the address only after it.
pub(crate) enum EntryState {
    Lazy { source: SourceRef },
    Materializing { source: SourceRef },
    Resolved { address: TargetAddress },
    Ready { address: TargetAddress },
    Failed { error: Error },
}

pub(crate) struct SymbolEntry {
    pub(crate) flags: SymbolFlags,
    pub(crate) state: EntryState,
    /// Queries that still expect a definition or readiness for this name
    pub(crate) pending: Vec<Arc<ResolutionQuery>>,
}

impl SymbolEntry {
    pub(crate) fn ready(flags: SymbolFlags, address: TargetAddress) -> Self {
        Self {
            flags,
            state: EntryState::Ready { address },
            pending: Vec::new(),
        }
    }

    pub(crate) fn lazy(flags: SymbolFlags, source: SourceRef) -> Self {
        Self {
            flags,
            state: EntryState::Lazy { source },
            pending: Vec::new(),
        }
    }

    pub(crate) fn state(&self) -> SymbolState {
        match self.state {
            EntryState::Lazy { .. } => SymbolState::Lazy,
            EntryState::Materializing { .. } => SymbolState::Materializing,
            EntryState::Resolved { .. } => SymbolState::Resolved,
            EntryState::Ready { .. } => SymbolState::Ready,
            EntryState::Failed { .. } => SymbolState::Failed,
        }
    }

    pub(crate) fn address(&self) -> Option<TargetAddress> {
        match self.state {
            EntryState::Resolved { address } | EntryState::Ready { address } => Some(address),
            _ => None,
        }
    }

    pub(crate) fn source(&self) -> Option<&SourceRef> {
        match &self.state {
            EntryState::Lazy { source } | EntryState::Materializing { source } => Some(source),
            _ => None,
        }
    }

    /// Register a query, once
    pub(crate) fn add_pending(&mut self, query: &Arc<ResolutionQuery>) {
        if !self.pending.iter().any(|q| Arc::ptr_eq(q, query)) {
            self.pending.push(query.clone());
        }
    }
}
