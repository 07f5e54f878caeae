//! Manifest source - a materialization source whose output is known up front
//!
//! Used by the CLI to stand in for a real code generator: every symbol it
//! declares already has an address, and "materializing" it just reports that
//! address to the table. Symbols listed as failing are reported through the
//! table's failure channel instead.

use crate::name::SymbolName;
use crate::source::MaterializationSource;
use crate::symbol::{JitSymbol, SymbolFlagsMap, SymbolMap, SymbolNameSet};
use crate::table::SymbolTable;
use crate::Result;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

#[derive(Debug)]
pub struct ManifestSource {
    label: String,
    symbols: SymbolMap,
    failing: SymbolNameSet,
    discarded: Mutex<SymbolNameSet>,
    batches: AtomicUsize,
}

impl ManifestSource {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            symbols: SymbolMap::new(),
            failing: SymbolNameSet::new(),
            discarded: Mutex::new(SymbolNameSet::new()),
            batches: AtomicUsize::new(0),
        }
    }

    /// Declare a symbol this source can produce
    pub fn with_symbol(mut self, name: SymbolName, symbol: JitSymbol) -> Self {
        self.symbols.insert(name, symbol);
        self
    }

    /// Mark a declared symbol as one this source will refuse to produce
    pub fn with_failure(mut self, name: SymbolName) -> Self {
        self.failing.insert(name);
        self
    }

    /// Flags of every declared symbol, for `define_lazy`
    pub fn flags(&self) -> SymbolFlagsMap {
        self.symbols.iter().map(|(name, sym)| (name.clone(), sym.flags)).collect()
    }

    /// Names the table told this source to drop, sorted
    pub fn discarded(&self) -> Vec<SymbolName> {
        let discarded = self.discarded.lock().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<SymbolName> = discarded.iter().cloned().collect();
        names.sort();
        names
    }

    /// Number of `materialize` calls served
    pub fn batches_served(&self) -> usize {
        self.batches.load(Ordering::Relaxed)
    }
}

impl MaterializationSource for ManifestSource {
    fn materialize(&self, table: &SymbolTable, names: SymbolNameSet) -> Result<()> {
        self.batches.fetch_add(1, Ordering::Relaxed);
        let discarded = self.discarded.lock().unwrap_or_else(PoisonError::into_inner).clone();

        let mut produced = SymbolMap::new();
        let mut refused = SymbolNameSet::new();
        for name in names {
            match self.symbols.get(&name) {
                Some(symbol) if !self.failing.contains(&name) && !discarded.contains(&name) => {
                    produced.insert(name, *symbol);
                }
                _ => {
                    refused.insert(name);
                }
            }
        }

        tracing::debug!(source = %self.label, produced = produced.len(), refused = refused.len(), "materialize");
        if !produced.is_empty() {
            let ready: SymbolNameSet = produced.keys().cloned().collect();
            table.resolve(produced)?;
            table.finalize(&ready)?;
        }
        if !refused.is_empty() {
            table.fail_materialization(&refused, &format!("{} cannot produce this symbol", self.label))?;
        }
        Ok(())
    }

    fn discard(&self, _table: &SymbolTable, name: &SymbolName) {
        tracing::debug!(source = %self.label, symbol = %name, "discarded");
        self.discarded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone());
    }

    fn name(&self) -> &str {
        &self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::SymbolStringPool;
    use crate::query::ResolutionQuery;
    use crate::source::SourceRef;
    use crate::symbol::SymbolFlags;
    use crate::table::SymbolState;
    use std::sync::Arc;

    #[test]
    fn test_manifest_source_materializes_and_refuses() {
        let pool = SymbolStringPool::new();
        let (good, bad) = (pool.intern("good"), pool.intern("bad"));
        let source = Arc::new(
            ManifestSource::new("stubs")
                .with_symbol(good.clone(), JitSymbol::new(0x100, SymbolFlags::CALLABLE))
                .with_symbol(bad.clone(), JitSymbol::new(0x200, SymbolFlags::CALLABLE))
                .with_failure(bad.clone()),
        );
        let table = SymbolTable::new();
        let shared: SourceRef = source.clone();
        table.define_lazy(source.flags(), shared).unwrap();

        let (q_good, rx_good) = ResolutionQuery::with_channel(SymbolNameSet::from([good.clone()])).unwrap();
        let (q_bad, rx_bad) = ResolutionQuery::with_channel(SymbolNameSet::from([bad.clone()])).unwrap();
        let first = table.lookup(&q_good, SymbolNameSet::from([good.clone()]));
        let second = table.lookup(&q_bad, SymbolNameSet::from([bad.clone()]));
        first.materialization_work.dispatch(&table).unwrap();
        second.materialization_work.dispatch(&table).unwrap();

        assert_eq!(rx_good.try_resolved().unwrap().unwrap()[&good].address(), 0x100);
        assert!(rx_good.try_ready().unwrap().is_ok());
        assert!(rx_bad.try_resolved().unwrap().is_err());
        assert_eq!(table.state_of(&bad), Some(SymbolState::Failed));
        assert_eq!(source.batches_served(), 2);
    }

    #[test]
    fn test_manifest_source_records_discards() {
        let pool = SymbolStringPool::new();
        let weak = pool.intern("weak_hook");
        let source = Arc::new(
            ManifestSource::new("hooks").with_symbol(weak.clone(), JitSymbol::new(0x300, SymbolFlags::WEAK)),
        );
        let table = SymbolTable::new();
        table.define_lazy(source.flags(), source.clone()).unwrap();
        table
            .define(SymbolMap::from([(weak.clone(), JitSymbol::new(0x400, SymbolFlags::EXPORTED))]))
            .unwrap();

        assert_eq!(source.discarded(), vec![weak]);
        assert_eq!(source.batches_served(), 0);
    }
}
