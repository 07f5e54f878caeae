//! Lookup results and materialization batches

use crate::name::SymbolName;
use crate::source::{same_source, SourceRef};
use crate::symbol::{SymbolFlagsMap, SymbolNameSet};
use crate::table::SymbolTable;
use crate::Result;

/// Answer to a metadata-only lookup.
#[derive(Debug, Default)]
pub struct LookupFlagsResult {
    /// Flags of every requested name present in the table
    pub symbol_flags: SymbolFlagsMap,
    /// Requested names with no entry
    pub symbols_not_found: SymbolNameSet,
}

/// Answer to a materializing lookup.
#[derive(Debug, Default)]
pub struct LookupResult {
    /// Sources the caller must now run, with the names each must produce
    pub materialization_work: MaterializationWork,
    /// Requested names with no entry. Non-empty means the query failed.
    pub symbols_not_found: SymbolNameSet,
}

/// Names one source was asked to produce by a single lookup.
pub struct MaterializationBatch {
    pub source: SourceRef,
    pub names: SymbolNameSet,
}

impl std::fmt::Debug for MaterializationBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaterializationBatch")
            .field("source", &self.source.name())
            .field("names", &self.names)
            .finish()
    }
}

/// Materialization work produced by a lookup, grouped by source.
#[derive(Debug, Default)]
pub struct MaterializationWork {
    batches: Vec<MaterializationBatch>,
}

impl MaterializationWork {
    pub(crate) fn add(&mut self, source: &SourceRef, name: SymbolName) {
        match self.batches.iter_mut().find(|b| same_source(&b.source, source)) {
            Some(batch) => {
                batch.names.insert(name);
            }
            None => self.batches.push(MaterializationBatch {
                source: source.clone(),
                names: SymbolNameSet::from([name]),
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Number of distinct sources involved
    pub fn len(&self) -> usize {
        self.batches.len()
    }

    /// Total number of names across all batches
    pub fn symbol_count(&self) -> usize {
        self.batches.iter().map(|b| b.names.len()).sum()
    }

    pub fn batches(&self) -> &[MaterializationBatch] {
        &self.batches
    }

    /// The batch for `source`, if any
    pub fn batch_for(&self, source: &SourceRef) -> Option<&SymbolNameSet> {
        self.batches
            .iter()
            .find(|b| same_source(&b.source, source))
            .map(|b| &b.names)
    }

    /// Run every batch on the calling thread.
    ///
    /// If a source returns an error, whichever of its names are still pending
    /// are failed through the table so that no query waits forever. Every
    /// batch is attempted; the first error is returned.
    pub fn dispatch(self, table: &SymbolTable) -> Result<()> {
        let mut first_error = None;
        for MaterializationBatch { source, names } in self.batches {
            tracing::debug!(source = source.name(), symbols = names.len(), "materializing batch");
            let requested = names.clone();
            if let Err(err) = source.materialize(table, names) {
                tracing::warn!(source = source.name(), error = %err, "materialization failed");
                table.fail_pending(&requested, &err.to_string());
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl IntoIterator for MaterializationWork {
    type Item = MaterializationBatch;
    type IntoIter = std::vec::IntoIter<MaterializationBatch>;

    fn into_iter(self) -> Self::IntoIter {
        self.batches.into_iter()
    }
}
