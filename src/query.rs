//! Resolution queries - a caller's in-flight request for a set of symbols
//!
//! A query collects definitions as names resolve and completes in two stages:
//! `on_resolved` fires once every name has an address, `on_ready` once every
//! name has also been finalized. Either stage may instead complete with an
//! error. Each callback fires at most once, never while a lock is held, and
//! `on_ready` never starts before `on_resolved` has returned.

use crate::name::SymbolName;
use crate::symbol::{JitSymbol, SymbolMap, SymbolNameSet};
use crate::{Error, Result};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, TryRecvError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Receives the full definition map, or the first error.
pub type ResolutionCallback = Box<dyn FnOnce(Result<SymbolMap>) + Send>;

/// Receives success once every name is finalized, or the first error.
pub type ReadyCallback = Box<dyn FnOnce(Result<()>) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Waiting on at least one definition
    Resolving,
    /// `on_resolved` is running on some thread
    Delivering,
    /// `on_resolved` has returned successfully
    Resolved,
    /// Resolution failed; `on_ready` is unreachable
    Failed,
}

struct QueryState {
    resolved: SymbolMap,
    ready: SymbolNameSet,
    unresolved: usize,
    not_ready: usize,
    phase: Phase,
    ready_error: Option<Error>,
    on_resolved: Option<ResolutionCallback>,
    on_ready: Option<ReadyCallback>,
}

impl QueryState {
    /// Take the ready callback and its payload if it is due
    fn take_ready(&mut self) -> Option<(ReadyCallback, Result<()>)> {
        if self.phase != Phase::Resolved {
            return None;
        }
        let outcome = match self.ready_error.take() {
            Some(err) => Err(err),
            None if self.not_ready == 0 => Ok(()),
            None => return None,
        };
        self.on_ready.take().map(|cb| (cb, outcome))
    }
}

/// A tracked request for a fixed set of symbol names.
pub struct ResolutionQuery {
    names: SymbolNameSet,
    state: Mutex<QueryState>,
}

impl ResolutionQuery {
    /// Create a query for `names`. The set must not be empty.
    pub fn new(
        names: SymbolNameSet,
        on_resolved: impl FnOnce(Result<SymbolMap>) + Send + 'static,
        on_ready: impl FnOnce(Result<()>) + Send + 'static,
    ) -> Result<Arc<Self>> {
        if names.is_empty() {
            return Err(Error::InvalidQuery("query requires at least one symbol name".to_string()));
        }
        let count = names.len();
        Ok(Arc::new(Self {
            names,
            state: Mutex::new(QueryState {
                resolved: SymbolMap::with_capacity(count),
                ready: SymbolNameSet::with_capacity(count),
                unresolved: count,
                not_ready: count,
                phase: Phase::Resolving,
                ready_error: None,
                on_resolved: Some(Box::new(on_resolved)),
                on_ready: Some(Box::new(on_ready)),
            }),
        }))
    }

    /// Create a query whose outcomes are delivered over channels.
    pub fn with_channel(names: SymbolNameSet) -> Result<(Arc<Self>, QueryReceiver)> {
        let (resolved_tx, resolved_rx) = channel::bounded(1);
        let (ready_tx, ready_rx) = channel::bounded(1);
        let query = Self::new(
            names,
            move |result| {
                let _ = resolved_tx.send(result);
            },
            move |result| {
                let _ = ready_tx.send(result);
            },
        )?;
        Ok((query, QueryReceiver { resolved: resolved_rx, ready: ready_rx }))
    }

    /// The names this query was created for
    pub fn names(&self) -> &SymbolNameSet {
        &self.names
    }

    fn lock(&self) -> MutexGuard<'_, QueryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the definition of `name`.
    ///
    /// Fires `on_resolved` when this was the last unresolved name. Ignored once
    /// the query has failed.
    pub fn set_definition(&self, name: &SymbolName, symbol: JitSymbol) -> Result<()> {
        let mut state = self.lock();
        if state.phase == Phase::Failed {
            tracing::trace!(symbol = %name, "definition for failed query ignored");
            return Ok(());
        }
        if !self.names.contains(name) {
            return Err(Error::InvalidQuery(format!("{} is not part of this query", name)));
        }
        if state.phase != Phase::Resolving || state.resolved.contains_key(name) {
            return Err(Error::InvalidQuery(format!("{} was already resolved for this query", name)));
        }

        state.resolved.insert(name.clone(), symbol);
        state.unresolved -= 1;
        if state.unresolved > 0 {
            return Ok(());
        }

        state.phase = Phase::Delivering;
        let definitions = std::mem::take(&mut state.resolved);
        let callback = state.on_resolved.take();
        drop(state);

        tracing::trace!(symbols = self.names.len(), "query resolved");
        if let Some(cb) = callback {
            cb(Ok(definitions));
        }
        self.finish_delivery();
        Ok(())
    }

    /// Fail resolution. Has no effect once resolution has completed.
    pub fn set_failed(&self, error: Error) {
        let mut state = self.lock();
        if state.phase != Phase::Resolving {
            tracing::trace!(%error, "failure after resolution ignored");
            return;
        }
        state.phase = Phase::Failed;
        let callback = state.on_resolved.take();
        // Readiness can no longer be reported.
        let unreachable = state.on_ready.take();
        drop(state);
        drop(unreachable);

        tracing::trace!(%error, "query failed");
        if let Some(cb) = callback {
            cb(Err(error));
        }
    }

    /// Record that `name` has been finalized.
    ///
    /// Fires `on_ready` when this was the last pending name, unless
    /// `on_resolved` has not yet returned, in which case delivery happens as
    /// soon as it does.
    pub fn notify_ready(&self, name: &SymbolName) -> Result<()> {
        let mut state = self.lock();
        if state.phase == Phase::Failed {
            debug_assert!(state.on_ready.is_none(), "failed query still holds its ready callback");
            return Ok(());
        }
        if !self.names.contains(name) {
            return Err(Error::InvalidQuery(format!("{} is not part of this query", name)));
        }
        if !state.ready.insert(name.clone()) {
            return Err(Error::InvalidQuery(format!("{} was already finalized for this query", name)));
        }
        state.not_ready -= 1;

        let due = state.take_ready();
        drop(state);
        if let Some((cb, outcome)) = due {
            tracing::trace!("query ready");
            cb(outcome);
        }
        Ok(())
    }

    /// Report a finalization failure.
    ///
    /// Before resolution completes this fails the query outright.
    pub fn notify_failed(&self, error: Error) {
        let mut state = self.lock();
        match state.phase {
            Phase::Failed => return,
            Phase::Resolving => {
                drop(state);
                self.set_failed(error);
                return;
            }
            Phase::Delivering | Phase::Resolved => {
                if state.on_ready.is_none() || state.ready_error.is_some() {
                    return;
                }
                state.ready_error = Some(error);
            }
        }

        let due = state.take_ready();
        drop(state);
        if let Some((cb, outcome)) = due {
            cb(outcome);
        }
    }

    /// Called after `on_resolved` returns; releases a readiness outcome that
    /// arrived while it was running.
    fn finish_delivery(&self) {
        let mut state = self.lock();
        state.phase = Phase::Resolved;
        let due = state.take_ready();
        drop(state);
        if let Some((cb, outcome)) = due {
            cb(outcome);
        }
    }

    /// True once `on_resolved` has been delivered successfully
    pub fn is_resolved(&self) -> bool {
        matches!(self.lock().phase, Phase::Delivering | Phase::Resolved)
    }

    /// True once every name has been finalized
    pub fn is_ready(&self) -> bool {
        let state = self.lock();
        state.phase == Phase::Resolved && state.not_ready == 0 && state.ready_error.is_none()
    }

    /// True if resolution failed
    pub fn is_failed(&self) -> bool {
        self.lock().phase == Phase::Failed
    }
}

impl std::fmt::Debug for ResolutionQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("ResolutionQuery")
            .field("names", &self.names)
            .field("phase", &state.phase)
            .field("unresolved", &state.unresolved)
            .field("not_ready", &state.not_ready)
            .finish()
    }
}

/// Receiving end of a channel-backed query.
#[derive(Debug)]
pub struct QueryReceiver {
    resolved: Receiver<Result<SymbolMap>>,
    ready: Receiver<Result<()>>,
}

impl QueryReceiver {
    /// Block until resolution completes.
    ///
    /// Returns `None` if the query was dropped without resolving.
    pub fn recv_resolved(&self) -> Option<Result<SymbolMap>> {
        self.resolved.recv().ok()
    }

    /// Block until readiness is reported.
    ///
    /// Returns `None` if readiness can never be reported (the query failed or
    /// was dropped).
    pub fn recv_ready(&self) -> Option<Result<()>> {
        self.ready.recv().ok()
    }

    pub fn try_resolved(&self) -> Option<Result<SymbolMap>> {
        match self.resolved.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    pub fn try_ready(&self) -> Option<Result<()>> {
        match self.ready.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    pub fn recv_resolved_timeout(&self, timeout: Duration) -> Option<Result<SymbolMap>> {
        match self.resolved.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn recv_ready_timeout(&self, timeout: Duration) -> Option<Result<()>> {
        match self.ready.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::SymbolStringPool;
    use crate::symbol::SymbolFlags;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn names(pool: &SymbolStringPool, list: &[&str]) -> SymbolNameSet {
        list.iter().map(|n| pool.intern(n)).collect()
    }

    #[test]
    fn test_successful_resolution_only() {
        let pool = SymbolStringPool::new();
        let foo = pool.intern("foo");
        let (query, rx) = ResolutionQuery::with_channel(names(&pool, &["foo"])).unwrap();

        query.set_definition(&foo, JitSymbol::new(0xdeadbeef, SymbolFlags::EXPORTED)).unwrap();

        let defs = rx.try_resolved().expect("resolution not delivered").unwrap();
        assert_eq!(defs[&foo].address(), 0xdeadbeef);
        assert!(rx.try_ready().is_none());
        assert!(query.is_resolved());
        assert!(!query.is_ready());
    }

    #[test]
    fn test_resolution_error_only() {
        let pool = SymbolStringPool::new();
        let (query, rx) = ResolutionQuery::with_channel(names(&pool, &["foo"])).unwrap();

        query.set_failed(Error::MaterializationFailure {
            name: pool.intern("foo"),
            reason: "xyz".to_string(),
        });

        let err = rx.try_resolved().unwrap().unwrap_err();
        assert!(err.to_string().contains("xyz"));
        assert!(query.is_failed());
        // The ready sender was dropped with the callback.
        assert!(rx.recv_ready().is_none());
    }

    #[test]
    fn test_resolved_then_ready_in_order() {
        let pool = SymbolStringPool::new();
        let foo = pool.intern("foo");
        let bar = pool.intern("bar");
        let order = Arc::new(Mutex::new(Vec::new()));

        let o1 = order.clone();
        let o2 = order.clone();
        let query = ResolutionQuery::new(
            names(&pool, &["foo", "bar"]),
            move |r| {
                assert!(r.is_ok());
                o1.lock().unwrap().push("resolved");
            },
            move |r| {
                assert!(r.is_ok());
                o2.lock().unwrap().push("ready");
            },
        )
        .unwrap();

        let sym = JitSymbol::new(0x1000, SymbolFlags::EXPORTED);
        query.set_definition(&foo, sym).unwrap();
        query.notify_ready(&foo).unwrap();
        assert!(order.lock().unwrap().is_empty());

        query.set_definition(&bar, sym).unwrap();
        query.notify_ready(&bar).unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["resolved", "ready"]);
        assert!(query.is_ready());
    }

    #[test]
    fn test_ready_waits_for_resolution_callback() {
        let pool = SymbolStringPool::new();
        let foo = pool.intern("foo");
        let order = Arc::new(Mutex::new(Vec::new()));
        let query_slot: Arc<Mutex<Option<Arc<ResolutionQuery>>>> = Arc::new(Mutex::new(None));

        let o1 = order.clone();
        let o2 = order.clone();
        let slot = query_slot.clone();
        let foo_in_cb = foo.clone();
        let query = ResolutionQuery::new(
            names(&pool, &["foo"]),
            move |_| {
                // Finalization lands while the resolution callback is still running.
                let q = slot.lock().unwrap().clone().unwrap();
                q.notify_ready(&foo_in_cb).unwrap();
                o1.lock().unwrap().push("resolved");
            },
            move |_| o2.lock().unwrap().push("ready"),
        )
        .unwrap();
        *query_slot.lock().unwrap() = Some(query.clone());

        query.set_definition(&foo, JitSymbol::new(0x10, SymbolFlags::empty())).unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["resolved", "ready"]);
    }

    #[test]
    fn test_failed_query_never_reports_ready() {
        let pool = SymbolStringPool::new();
        let foo = pool.intern("foo");
        let ready_calls = Arc::new(AtomicUsize::new(0));
        let counter = ready_calls.clone();
        let query = ResolutionQuery::new(
            names(&pool, &["foo"]),
            |r| assert!(r.is_err()),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        )
        .unwrap();

        query.set_failed(Error::InvalidQuery("timed out".to_string()));
        query.set_definition(&foo, JitSymbol::new(0x10, SymbolFlags::empty())).unwrap();
        query.notify_ready(&foo).unwrap();
        query.set_failed(Error::InvalidQuery("again".to_string()));

        assert_eq!(ready_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_finalization_failure_after_resolution() {
        let pool = SymbolStringPool::new();
        let foo = pool.intern("foo");
        let (query, rx) = ResolutionQuery::with_channel(names(&pool, &["foo"])).unwrap();

        query.set_definition(&foo, JitSymbol::new(0x10, SymbolFlags::empty())).unwrap();
        query.notify_failed(Error::MaterializationFailure {
            name: foo.clone(),
            reason: "relocation overflow".to_string(),
        });
        query.notify_failed(Error::InvalidQuery("second".to_string()));

        assert!(rx.try_resolved().unwrap().is_ok());
        let err = rx.try_ready().unwrap().unwrap_err();
        assert!(err.to_string().contains("relocation overflow"));
        assert!(rx.try_ready().is_none());
    }

    #[test]
    fn test_rejects_misuse() {
        let pool = SymbolStringPool::new();
        let foo = pool.intern("foo");
        let bar = pool.intern("bar");

        assert!(ResolutionQuery::with_channel(SymbolNameSet::new()).is_err());

        let (query, _rx) = ResolutionQuery::with_channel(names(&pool, &["foo", "bar"])).unwrap();
        let sym = JitSymbol::new(0x10, SymbolFlags::empty());
        assert!(query.set_definition(&pool.intern("baz"), sym).is_err());
        query.set_definition(&foo, sym).unwrap();
        assert!(query.set_definition(&foo, sym).is_err());
        query.notify_ready(&bar).unwrap();
        assert!(query.notify_ready(&bar).is_err());
    }
}
