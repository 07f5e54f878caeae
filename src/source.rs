//! Materialization sources - the backends that produce lazy symbols
//!
//! A source declares symbols via [`SymbolTable::define_lazy`] and is asked to
//! produce them when a lookup first needs them. Producing means calling back
//! into the table with `resolve` and then `finalize`, or reporting the failure
//! with `fail_materialization`. Leaving a requested name untouched strands
//! every query waiting on it.

use crate::name::SymbolName;
use crate::symbol::SymbolNameSet;
use crate::table::SymbolTable;
use crate::Result;
use std::sync::Arc;

/// Shared handle to a source. Many lazy entries may point at one source.
pub type SourceRef = Arc<dyn MaterializationSource>;

pub trait MaterializationSource: Send + Sync {
    /// Produce `names`, which the table has just moved to `Materializing`.
    fn materialize(&self, table: &SymbolTable, names: SymbolNameSet) -> Result<()>;

    /// `name` was overridden while still lazy; drop any work for it.
    fn discard(&self, table: &SymbolTable, name: &SymbolName);

    /// Label used in logs
    fn name(&self) -> &str {
        "anonymous"
    }
}

/// Identity of a source, by allocation.
pub(crate) fn same_source(a: &SourceRef, b: &SourceRef) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

type MaterializeFn = dyn Fn(&SymbolTable, SymbolNameSet) -> Result<()> + Send + Sync;
type DiscardFn = dyn Fn(&SymbolTable, &SymbolName) + Send + Sync;

/// A source assembled from two closures.
pub struct SimpleSource {
    label: String,
    materialize: Box<MaterializeFn>,
    discard: Box<DiscardFn>,
}

impl SimpleSource {
    pub fn new(
        materialize: impl Fn(&SymbolTable, SymbolNameSet) -> Result<()> + Send + Sync + 'static,
        discard: impl Fn(&SymbolTable, &SymbolName) + Send + Sync + 'static,
    ) -> Self {
        Self {
            label: "simple".to_string(),
            materialize: Box::new(materialize),
            discard: Box::new(discard),
        }
    }

    /// Set the label reported by [`MaterializationSource::name`]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn into_ref(self) -> SourceRef {
        Arc::new(self)
    }
}

impl MaterializationSource for SimpleSource {
    fn materialize(&self, table: &SymbolTable, names: SymbolNameSet) -> Result<()> {
        (self.materialize)(table, names)
    }

    fn discard(&self, table: &SymbolTable, name: &SymbolName) {
        (self.discard)(table, name)
    }

    fn name(&self) -> &str {
        &self.label
    }
}

impl std::fmt::Debug for SimpleSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimpleSource").field("label", &self.label).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_identity() {
        let a = SimpleSource::new(|_, _| Ok(()), |_, _| {}).into_ref();
        let b = SimpleSource::new(|_, _| Ok(()), |_, _| {}).into_ref();
        let a2 = a.clone();

        assert!(same_source(&a, &a2));
        assert!(!same_source(&a, &b));
    }

    #[test]
    fn test_label() {
        let source = SimpleSource::new(|_, _| Ok(()), |_, _| {}).with_label("stubs");
        assert_eq!(source.name(), "stubs");
    }
}
