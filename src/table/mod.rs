//! Symbol Table - owns symbol definitions and drives their lifecycle
//!
//! All mutation happens under one table-wide lock so that a lookup classifies
//! its whole name set atomically and a define cannot race a lookup that would
//! promote the same lazy entry. Source notifications and query callbacks are
//! always made after the lock is released, so either may call back into the
//! table.

pub mod entry;
pub mod work;

pub use entry::SymbolState;
pub use work::{LookupFlagsResult, LookupResult, MaterializationBatch, MaterializationWork};

use crate::name::SymbolName;
use crate::query::ResolutionQuery;
use crate::source::SourceRef;
use crate::symbol::{JitSymbol, SymbolFlagsMap, SymbolMap, SymbolNameSet};
use crate::{Error, Result};
use entry::{EntryState, SymbolEntry};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Deferred effects, applied once the table lock is dropped.
enum Notification {
    Discard(SourceRef, SymbolName),
    Define(Arc<ResolutionQuery>, SymbolName, JitSymbol),
    Ready(Arc<ResolutionQuery>, SymbolName),
    FailResolution(Arc<ResolutionQuery>, Error),
    FailReady(Arc<ResolutionQuery>, Error),
}

/// Symbol definitions for one logical scope.
#[derive(Default)]
pub struct SymbolTable {
    entries: Mutex<HashMap<SymbolName, SymbolEntry>>,
}

impl SymbolTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SymbolName, SymbolEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn deliver(&self, notifications: Vec<Notification>) {
        for note in notifications {
            match note {
                Notification::Discard(source, name) => {
                    tracing::debug!(symbol = %name, source = source.name(), "discarding lazy definition");
                    source.discard(self, &name);
                }
                Notification::Define(query, name, symbol) => {
                    if let Err(err) = query.set_definition(&name, symbol) {
                        tracing::warn!(symbol = %name, error = %err, "query rejected definition");
                    }
                }
                Notification::Ready(query, name) => {
                    if let Err(err) = query.notify_ready(&name) {
                        tracing::warn!(symbol = %name, error = %err, "query rejected readiness");
                    }
                }
                Notification::FailResolution(query, err) => query.set_failed(err),
                Notification::FailReady(query, err) => query.notify_failed(err),
            }
        }
    }

    /// Add eagerly defined symbols, which enter the table `Ready`.
    ///
    /// A name may replace a `Lazy` entry, in which case the old entry's source
    /// is told to discard it. Any other existing entry is a duplicate and the
    /// whole call is rejected without changing the table.
    pub fn define(&self, symbols: SymbolMap) -> Result<()> {
        let mut notes = Vec::new();
        {
            let mut entries = self.lock();
            let mut conflicts: Vec<&SymbolName> = symbols
                .keys()
                .filter(|name| entries.get(*name).is_some_and(|e| e.state() != SymbolState::Lazy))
                .collect();
            if !conflicts.is_empty() {
                conflicts.sort();
                tracing::warn!(symbol = %conflicts[0], "define rejected");
                return Err(Error::DuplicateDefinition(conflicts[0].clone()));
            }

            for (name, symbol) in symbols {
                let replacement = SymbolEntry::ready(symbol.flags, symbol.address);
                if let Some(old) = entries.insert(name.clone(), replacement) {
                    if let EntryState::Lazy { source } = old.state {
                        notes.push(Notification::Discard(source, name.clone()));
                    }
                }
                tracing::debug!(symbol = %name, address = symbol.address, "defined");
            }
        }
        self.deliver(notes);
        Ok(())
    }

    /// Declare symbols that `source` will produce on demand.
    ///
    /// Every name must be new to the table.
    pub fn define_lazy(&self, flags: SymbolFlagsMap, source: SourceRef) -> Result<()> {
        let mut entries = self.lock();
        let mut conflicts: Vec<&SymbolName> = flags.keys().filter(|name| entries.contains_key(*name)).collect();
        if !conflicts.is_empty() {
            conflicts.sort();
            tracing::warn!(symbol = %conflicts[0], source = source.name(), "lazy define rejected");
            return Err(Error::DuplicateDefinition(conflicts[0].clone()));
        }

        tracing::debug!(symbols = flags.len(), source = source.name(), "defined lazily");
        for (name, flags) in flags {
            entries.insert(name, SymbolEntry::lazy(flags, source.clone()));
        }
        Ok(())
    }

    /// Report flags for the requested names without materializing anything.
    pub fn lookup_flags(&self, names: &SymbolNameSet) -> LookupFlagsResult {
        let entries = self.lock();
        let mut result = LookupFlagsResult::default();
        for name in names {
            match entries.get(name) {
                Some(entry) => {
                    result.symbol_flags.insert(name.clone(), entry.flags);
                }
                None => {
                    result.symbols_not_found.insert(name.clone());
                }
            }
        }
        result
    }

    /// Look up `names` on behalf of `query`, triggering materialization.
    ///
    /// Resolved and ready names are delivered to the query before this
    /// returns. Lazy names move to `Materializing` and come back as work for
    /// the caller to dispatch; names already materializing are only
    /// registered. If any name is missing (or has failed), the query fails as
    /// a whole and no entry changes state.
    ///
    /// An empty `names` set is a no-op: nothing is delivered, so the caller
    /// must complete the query itself.
    pub fn lookup(&self, query: &Arc<ResolutionQuery>, names: SymbolNameSet) -> LookupResult {
        let mut result = LookupResult::default();
        if names.is_empty() {
            tracing::debug!(?query, "lookup with no names, query left to the caller");
            return result;
        }
        let mut notes = Vec::new();
        {
            let mut entries = self.lock();

            let mut missing: Vec<SymbolName> = names.iter().filter(|n| !entries.contains_key(*n)).cloned().collect();
            if !missing.is_empty() {
                missing.sort();
                tracing::debug!(missing = missing.len(), "lookup found unknown symbols");
                result.symbols_not_found = missing.iter().cloned().collect();
                notes.push(Notification::FailResolution(query.clone(), Error::SymbolsNotFound(missing)));
            } else if let Some(err) = names.iter().find_map(|n| match &entries.get(n)?.state {
                EntryState::Failed { error } => Some(error.clone()),
                _ => None,
            }) {
                notes.push(Notification::FailResolution(query.clone(), err));
            } else {
                for name in names {
                    let Some(entry) = entries.get_mut(&name) else { continue };
                    let flags = entry.flags;
                    match &entry.state {
                        EntryState::Ready { address } => {
                            let address = *address;
                            notes.push(Notification::Define(query.clone(), name.clone(), JitSymbol::new(address, flags)));
                            notes.push(Notification::Ready(query.clone(), name));
                        }
                        EntryState::Resolved { address } => {
                            let address = *address;
                            entry.add_pending(query);
                            notes.push(Notification::Define(query.clone(), name, JitSymbol::new(address, flags)));
                        }
                        EntryState::Lazy { source } => {
                            let source = source.clone();
                            result.materialization_work.add(&source, name.clone());
                            entry.state = EntryState::Materializing { source };
                            entry.add_pending(query);
                            tracing::debug!(symbol = %name, "materialization triggered");
                        }
                        EntryState::Materializing { .. } => entry.add_pending(query),
                        EntryState::Failed { .. } => {}
                    }
                }
            }
        }
        self.deliver(notes);
        result
    }

    /// Supply addresses for materializing symbols, moving them to `Resolved`.
    ///
    /// Every waiting query receives the definition. Names not currently
    /// `Materializing` reject the whole call.
    pub fn resolve(&self, symbols: SymbolMap) -> Result<()> {
        let mut notes = Vec::new();
        {
            let mut entries = self.lock();
            let names: Vec<&SymbolName> = symbols.keys().collect();
            check_states(&entries, names, SymbolState::Materializing, "resolve")?;

            for (name, symbol) in symbols {
                let Some(entry) = entries.get_mut(&name) else { continue };
                entry.flags = symbol.flags;
                entry.state = EntryState::Resolved { address: symbol.address };
                for query in &entry.pending {
                    notes.push(Notification::Define(query.clone(), name.clone(), symbol));
                }
                tracing::debug!(symbol = %name, address = symbol.address, waiting = entry.pending.len(), "resolved");
            }
        }
        self.deliver(notes);
        Ok(())
    }

    /// Mark resolved symbols `Ready`, notifying and releasing waiting queries.
    ///
    /// Names not currently `Resolved` reject the whole call.
    pub fn finalize(&self, names: &SymbolNameSet) -> Result<()> {
        let mut notes = Vec::new();
        {
            let mut entries = self.lock();
            check_states(&entries, names.iter(), SymbolState::Resolved, "finalize")?;

            for name in names {
                let Some(entry) = entries.get_mut(name) else { continue };
                let Some(address) = entry.address() else { continue };
                entry.state = EntryState::Ready { address };
                for query in entry.pending.drain(..) {
                    notes.push(Notification::Ready(query, name.clone()));
                }
                tracing::debug!(symbol = %name, "finalized");
            }
        }
        self.deliver(notes);
        Ok(())
    }

    /// Report that the owning source could not produce `names`.
    ///
    /// Materializing names fail the resolution of every waiting query;
    /// resolved names fail their readiness. Both become `Failed`. Names in
    /// any other state reject the whole call.
    pub fn fail_materialization(&self, names: &SymbolNameSet, reason: &str) -> Result<()> {
        let mut notes = Vec::new();
        {
            let mut entries = self.lock();
            for name in sorted(names.iter()) {
                match entries.get(name).map(SymbolEntry::state) {
                    Some(SymbolState::Materializing | SymbolState::Resolved) => {}
                    Some(state) => {
                        return Err(Error::InvalidStateTransition { name: name.clone(), state, operation: "fail" });
                    }
                    None => return Err(Error::SymbolsNotFound(vec![name.clone()])),
                }
            }
            for name in names {
                fail_entry(&mut entries, name, reason, &mut notes);
            }
        }
        self.deliver(notes);
        Ok(())
    }

    /// Fail whichever of `names` are still pending, skipping the rest.
    pub(crate) fn fail_pending(&self, names: &SymbolNameSet, reason: &str) {
        let mut notes = Vec::new();
        {
            let mut entries = self.lock();
            for name in names {
                if matches!(
                    entries.get(name).map(SymbolEntry::state),
                    Some(SymbolState::Materializing | SymbolState::Resolved)
                ) {
                    fail_entry(&mut entries, name, reason, &mut notes);
                }
            }
        }
        self.deliver(notes);
    }

    /// Current state of `name`, if present
    pub fn state_of(&self, name: &SymbolName) -> Option<SymbolState> {
        self.lock().get(name).map(SymbolEntry::state)
    }

    /// Address of `name`, once resolved
    pub fn address_of(&self, name: &SymbolName) -> Option<JitSymbol> {
        let entries = self.lock();
        let entry = entries.get(name)?;
        entry.address().map(|address| JitSymbol::new(address, entry.flags))
    }

    /// Label of the source that owns `name`, while it is still pending
    pub fn owner_of(&self, name: &SymbolName) -> Option<String> {
        self.lock().get(name)?.source().map(|s| s.name().to_string())
    }

    /// Number of queries waiting on `name`
    pub fn pending_queries(&self, name: &SymbolName) -> usize {
        self.lock().get(name).map(|e| e.pending.len()).unwrap_or(0)
    }

    pub fn contains(&self, name: &SymbolName) -> bool {
        self.lock().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// All names, sorted
    pub fn names(&self) -> Vec<SymbolName> {
        let entries = self.lock();
        sorted(entries.keys()).into_iter().cloned().collect()
    }

    /// Count entries per state
    pub fn stats(&self) -> TableStats {
        let entries = self.lock();
        let mut stats = TableStats::default();
        for entry in entries.values() {
            match entry.state() {
                SymbolState::Lazy => stats.lazy += 1,
                SymbolState::Materializing => stats.materializing += 1,
                SymbolState::Resolved => stats.resolved += 1,
                SymbolState::Ready => stats.ready += 1,
                SymbolState::Failed => stats.failed += 1,
            }
            stats.pending_queries += entry.pending.len();
        }
        stats.total = entries.len();
        stats
    }
}

fn sorted<'a>(names: impl Iterator<Item = &'a SymbolName>) -> Vec<&'a SymbolName> {
    let mut names: Vec<&SymbolName> = names.collect();
    names.sort();
    names
}

/// Verify every name exists in `expected` state, reporting the first offender
/// in name order.
fn check_states<'a>(
    entries: &HashMap<SymbolName, SymbolEntry>,
    names: impl IntoIterator<Item = &'a SymbolName>,
    expected: SymbolState,
    operation: &'static str,
) -> Result<()> {
    for name in sorted(names.into_iter()) {
        match entries.get(name).map(SymbolEntry::state) {
            Some(state) if state == expected => {}
            Some(state) => {
                tracing::warn!(symbol = %name, %state, operation, "invalid state transition");
                return Err(Error::InvalidStateTransition { name: name.clone(), state, operation });
            }
            None => return Err(Error::SymbolsNotFound(vec![name.clone()])),
        }
    }
    Ok(())
}

fn fail_entry(
    entries: &mut HashMap<SymbolName, SymbolEntry>,
    name: &SymbolName,
    reason: &str,
    notes: &mut Vec<Notification>,
) {
    let Some(entry) = entries.get_mut(name) else { return };
    let error = Error::MaterializationFailure { name: name.clone(), reason: reason.to_string() };
    let resolved = entry.state() == SymbolState::Resolved;
    for query in entry.pending.drain(..) {
        notes.push(if resolved {
            Notification::FailReady(query, error.clone())
        } else {
            Notification::FailResolution(query, error.clone())
        });
    }
    tracing::warn!(symbol = %name, reason, "materialization failed");
    entry.state = EntryState::Failed { error };
}

impl fmt::Debug for SymbolTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymbolTable").field("stats", &self.stats()).finish()
    }
}

/// Entry counts per lifecycle state
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct TableStats {
    pub total: usize,
    pub lazy: usize,
    pub materializing: usize,
    pub resolved: usize,
    pub ready: usize,
    pub failed: usize,
    pub pending_queries: usize,
}

impl TableStats {
    /// `(label, count)` rows in lifecycle order
    pub fn rows(&self) -> Vec<(&'static str, usize)> {
        vec![
            ("Lazy", self.lazy),
            ("Materializing", self.materializing),
            ("Resolved", self.resolved),
            ("Ready", self.ready),
            ("Failed", self.failed),
            ("Pending queries", self.pending_queries),
            ("Total", self.total),
        ]
    }
}

impl fmt::Display for TableStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Symbol Table Statistics:")?;
        writeln!(f, "  Symbols: {}", self.total)?;
        writeln!(
            f,
            "  States: lazy {}, materializing {}, resolved {}, ready {}, failed {}",
            self.lazy, self.materializing, self.resolved, self.ready, self.failed
        )?;
        writeln!(f, "  Pending queries: {}", self.pending_queries)
    }
}
