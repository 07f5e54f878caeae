//! Symbol names - interned, cheaply comparable handles
//!
//! Names are shared `Arc<str>` allocations handed out by a [`SymbolStringPool`].
//! Two handles interned from the same pool compare by pointer; handles from
//! different pools (or built directly) fall back to comparing text.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, PoisonError};

/// Interned symbol name.
#[derive(Clone)]
pub struct SymbolName(Arc<str>);

impl SymbolName {
    /// Build a handle without going through a pool
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// The name as text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if both handles share one allocation
    pub fn ptr_eq(&self, other: &SymbolName) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for SymbolName {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || *self.0 == *other.0
    }
}

impl Eq for SymbolName {}

impl Hash for SymbolName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl PartialOrd for SymbolName {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SymbolName {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl fmt::Debug for SymbolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl fmt::Display for SymbolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SymbolName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl Serialize for SymbolName {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SymbolName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Self::new(name))
    }
}

/// Thread-safe interning pool for symbol names.
#[derive(Debug, Default)]
pub struct SymbolStringPool {
    pool: Mutex<HashSet<Arc<str>>>,
}

impl SymbolStringPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `name`, returning the pool's shared handle for it
    pub fn intern(&self, name: &str) -> SymbolName {
        let mut pool = self.pool.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = pool.get(name) {
            return SymbolName(existing.clone());
        }
        let entry: Arc<str> = Arc::from(name);
        pool.insert(entry.clone());
        SymbolName(entry)
    }

    /// Drop entries that nobody outside the pool holds anymore.
    ///
    /// Returns the number of entries removed.
    pub fn clear_unreferenced(&self) -> usize {
        let mut pool = self.pool.lock().unwrap_or_else(PoisonError::into_inner);
        let before = pool.len();
        pool.retain(|entry| Arc::strong_count(entry) > 1);
        before - pool.len()
    }

    pub fn len(&self) -> usize {
        self.pool.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_shares_allocation() {
        let pool = SymbolStringPool::new();
        let a = pool.intern("foo");
        let b = pool.intern("foo");
        let c = pool.intern("bar");

        assert!(a.ptr_eq(&b));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_unpooled_name_compares_by_text() {
        let pool = SymbolStringPool::new();
        let pooled = pool.intern("main");
        let direct = SymbolName::new("main");

        assert!(!pooled.ptr_eq(&direct));
        assert_eq!(pooled, direct);

        let mut set = HashSet::new();
        set.insert(pooled);
        assert!(set.contains(&direct));
    }

    #[test]
    fn test_clear_unreferenced() {
        let pool = SymbolStringPool::new();
        let kept = pool.intern("kept");
        {
            let _dropped = pool.intern("dropped");
        }

        assert_eq!(pool.clear_unreferenced(), 1);
        assert_eq!(pool.len(), 1);
        assert!(pool.intern("kept").ptr_eq(&kept));
    }

    #[test]
    fn test_serde_as_plain_string() {
        let name = SymbolName::new("_start");
        let json = serde_json::to_string(&name).unwrap();
        assert_eq!(json, "\"_start\"");

        let back: SymbolName = serde_json::from_str(&json).unwrap();
        assert_eq!(back, name);
    }
}
