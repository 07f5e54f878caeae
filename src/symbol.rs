//! Symbol descriptors - what a resolved symbol looks like
//!
//! A resolved symbol is an address plus a flag set. Flags are known as soon as
//! a symbol is defined (eagerly or lazily); the address only once it has been
//! materialized.

use crate::name::SymbolName;
use crate::{Error, Result};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// Integer-sized location in the target process.
pub type TargetAddress = u64;

/// Resolved definitions keyed by name.
pub type SymbolMap = HashMap<SymbolName, JitSymbol>;

/// Flag sets keyed by name.
pub type SymbolFlagsMap = HashMap<SymbolName, SymbolFlags>;

/// A set of names.
pub type SymbolNameSet = HashSet<SymbolName>;

bitflags! {
    /// Linkage and kind attributes of a symbol.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SymbolFlags: u8 {
        /// Visible outside the defining unit
        const EXPORTED = 1 << 0;
        /// May be overridden by a strong definition
        const WEAK = 1 << 1;
        /// Common (tentative) definition
        const COMMON = 1 << 2;
        /// Address is absolute, not subject to relocation
        const ABSOLUTE = 1 << 3;
        /// Refers to code rather than data
        const CALLABLE = 1 << 4;
    }
}

impl SymbolFlags {
    pub fn is_exported(&self) -> bool {
        self.contains(SymbolFlags::EXPORTED)
    }

    pub fn is_weak(&self) -> bool {
        self.contains(SymbolFlags::WEAK)
    }
}

impl Default for SymbolFlags {
    fn default() -> Self {
        SymbolFlags::empty()
    }
}

impl FromStr for SymbolFlags {
    type Err = Error;

    /// Parse `"exported|weak"` style text. Commas also separate; empty text or
    /// `none` means no flags.
    fn from_str(s: &str) -> Result<Self> {
        let mut flags = SymbolFlags::empty();
        for part in s.split(['|', ',']).map(str::trim).filter(|p| !p.is_empty()) {
            flags |= match part.to_lowercase().as_str() {
                "exported" | "export" | "global" | "public" => SymbolFlags::EXPORTED,
                "weak" => SymbolFlags::WEAK,
                "common" => SymbolFlags::COMMON,
                "absolute" | "abs" => SymbolFlags::ABSOLUTE,
                "callable" | "function" | "fn" | "code" => SymbolFlags::CALLABLE,
                "none" => SymbolFlags::empty(),
                _ => return Err(Error::InvalidFlags(format!("unknown symbol flag: {}", part))),
            };
        }
        Ok(flags)
    }
}

impl fmt::Display for SymbolFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let names: Vec<String> = self.iter_names().map(|(name, _)| name.to_lowercase()).collect();
        f.write_str(&names.join("|"))
    }
}

impl Serialize for SymbolFlags {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SymbolFlags {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// A resolved symbol: its address and flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JitSymbol {
    pub address: TargetAddress,
    pub flags: SymbolFlags,
}

impl JitSymbol {
    pub fn new(address: TargetAddress, flags: SymbolFlags) -> Self {
        Self { address, flags }
    }

    pub fn address(&self) -> TargetAddress {
        self.address
    }

    pub fn flags(&self) -> SymbolFlags {
        self.flags
    }
}

impl fmt::Display for JitSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x} [{}]", self.address, self.flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_parse_and_display() {
        let flags: SymbolFlags = "exported|weak".parse().unwrap();
        assert_eq!(flags, SymbolFlags::EXPORTED | SymbolFlags::WEAK);
        assert_eq!(flags.to_string(), "exported|weak");
    }

    #[test]
    fn test_flags_aliases() {
        assert_eq!(SymbolFlags::from_str("global").unwrap(), SymbolFlags::EXPORTED);
        assert_eq!(SymbolFlags::from_str("fn, abs").unwrap(), SymbolFlags::CALLABLE | SymbolFlags::ABSOLUTE);
        assert_eq!(SymbolFlags::from_str("").unwrap(), SymbolFlags::empty());
        assert_eq!(SymbolFlags::empty().to_string(), "none");
    }

    #[test]
    fn test_flags_reject_unknown() {
        let err = SymbolFlags::from_str("exported|hidden").unwrap_err();
        assert!(matches!(err, Error::InvalidFlags(_)));
    }

    #[test]
    fn test_jit_symbol_display() {
        let sym = JitSymbol::new(0xdeadbeef, SymbolFlags::EXPORTED);
        assert_eq!(sym.to_string(), "0xdeadbeef [exported]");
        assert!(sym.flags().is_exported());
        assert!(!sym.flags().is_weak());
    }
}
