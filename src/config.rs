use crate::manifest::ManifestSource;
use crate::name::{SymbolName, SymbolStringPool};
use crate::source::SourceRef;
use crate::symbol::{JitSymbol, SymbolFlags, SymbolMap, TargetAddress};
use crate::table::SymbolTable;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Image manifest: the symbols a table starts out with.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LazylinkConfig {
    /// Eager definitions, ready immediately
    #[serde(default)]
    pub symbols: Vec<SymbolSpec>,
    /// Lazy definition groups, one materialization source each
    #[serde(default)]
    pub sources: Vec<SourceSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolSpec {
    pub name: String,
    pub address: TargetAddress,
    #[serde(default)]
    pub flags: SymbolFlags,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSpec {
    pub name: String,
    #[serde(default)]
    pub symbols: Vec<SymbolSpec>,
    /// Declared symbols this source refuses to produce
    #[serde(default)]
    pub fail: Vec<String>,
}

/// A table built from a manifest, with handles to its sources.
pub struct LoadedImage {
    pub table: SymbolTable,
    pub sources: Vec<Arc<ManifestSource>>,
}

impl LazylinkConfig {
    /// Build a table: lazy groups first, then eager symbols, so an eager
    /// definition of a lazily declared name overrides it.
    pub fn build_table(&self, pool: &SymbolStringPool) -> anyhow::Result<LoadedImage> {
        let table = SymbolTable::new();
        let mut sources = Vec::with_capacity(self.sources.len());

        for spec in &self.sources {
            let mut source = ManifestSource::new(&spec.name);
            for sym in &spec.symbols {
                source = source.with_symbol(pool.intern(&sym.name), JitSymbol::new(sym.address, sym.flags));
            }
            for name in &spec.fail {
                if !spec.symbols.iter().any(|s| &s.name == name) {
                    anyhow::bail!("source {} lists {} as failing but never declares it", spec.name, name);
                }
                source = source.with_failure(pool.intern(name));
            }
            let source = Arc::new(source);
            let shared: SourceRef = source.clone();
            table.define_lazy(source.flags(), shared)?;
            sources.push(source);
        }

        let mut seen = HashSet::new();
        let mut eager = SymbolMap::new();
        for sym in &self.symbols {
            if !seen.insert(sym.name.as_str()) {
                anyhow::bail!("symbol {} is defined more than once", sym.name);
            }
            eager.insert(pool.intern(&sym.name), JitSymbol::new(sym.address, sym.flags));
        }
        if !eager.is_empty() {
            table.define(eager)?;
        }

        tracing::info!(symbols = table.len(), sources = sources.len(), "image loaded");
        Ok(LoadedImage { table, sources })
    }

    /// A small manifest showing every feature
    pub fn sample() -> Self {
        let sym = |name: &str, address, flags| SymbolSpec { name: name.to_string(), address, flags };
        Self {
            symbols: vec![
                sym("main", 0x401000, SymbolFlags::EXPORTED | SymbolFlags::CALLABLE),
                sym("log_hook", 0x401800, SymbolFlags::EXPORTED | SymbolFlags::CALLABLE),
            ],
            sources: vec![SourceSpec {
                name: "codegen".to_string(),
                symbols: vec![
                    sym("fib", 0x7f0000001000, SymbolFlags::EXPORTED | SymbolFlags::CALLABLE),
                    sym("log_hook", 0x7f0000002000, SymbolFlags::EXPORTED | SymbolFlags::WEAK),
                    sym("broken", 0x7f0000003000, SymbolFlags::CALLABLE),
                ],
                fail: vec!["broken".to_string()],
            }],
        }
    }
}

/// Intern a list of CLI-supplied names
pub fn intern_all<'a>(pool: &SymbolStringPool, names: impl IntoIterator<Item = &'a String>) -> Vec<SymbolName> {
    names.into_iter().map(|n| pool.intern(n)).collect()
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("lazylink.toml")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<LazylinkConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: LazylinkConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &LazylinkConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::SymbolState;

    #[test]
    fn test_config_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lazylink.toml");

        write_config(&path, &LazylinkConfig::sample(), false).unwrap();
        assert!(write_config(&path, &LazylinkConfig::sample(), false).is_err());
        write_config(&path, &LazylinkConfig::sample(), true).unwrap();

        let loaded = load_config(Some(&path)).unwrap().unwrap();
        assert_eq!(loaded.symbols.len(), 2);
        assert_eq!(loaded.sources[0].symbols[1].flags, SymbolFlags::EXPORTED | SymbolFlags::WEAK);
        assert_eq!(loaded.sources[0].fail, vec!["broken".to_string()]);
    }

    #[test]
    fn test_missing_config_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("absent.toml"))).unwrap().is_none());
    }

    #[test]
    fn test_parse_hand_written_manifest() {
        let text = r#"
            [[symbols]]
            name = "puts"
            address = 0xdeadbeef
            flags = "exported|callable"

            [[sources]]
            name = "jit"
            fail = []

            [[sources.symbols]]
            name = "square"
            address = 0x1000
            flags = "exported"
        "#;
        let config: LazylinkConfig = toml::from_str(text).unwrap();
        let pool = SymbolStringPool::new();
        let image = config.build_table(&pool).unwrap();

        assert_eq!(image.table.state_of(&pool.intern("puts")), Some(SymbolState::Ready));
        assert_eq!(image.table.state_of(&pool.intern("square")), Some(SymbolState::Lazy));
        assert_eq!(image.table.owner_of(&pool.intern("square")).as_deref(), Some("jit"));
    }

    #[test]
    fn test_sample_overrides_lazy_hook() {
        let pool = SymbolStringPool::new();
        let image = LazylinkConfig::sample().build_table(&pool).unwrap();
        let hook = pool.intern("log_hook");

        assert_eq!(image.table.state_of(&hook), Some(SymbolState::Ready));
        assert_eq!(image.table.address_of(&hook).unwrap().address(), 0x401800);
        assert_eq!(image.sources[0].discarded(), vec![hook]);
    }

    #[test]
    fn test_rejects_inconsistent_manifest() {
        let pool = SymbolStringPool::new();
        let mut config = LazylinkConfig::sample();
        config.sources[0].fail.push("ghost".to_string());
        assert!(config.build_table(&pool).is_err());

        let mut config = LazylinkConfig::sample();
        config.symbols.push(config.symbols[0].clone());
        assert!(config.build_table(&pool).is_err());
    }
}
