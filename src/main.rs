//! Lazylink CLI - Drive a JIT symbol table from an image manifest

use clap::{Parser, Subcommand};
use lazylink::config::{self, LazylinkConfig, LoadedImage};
use lazylink::output::{emit_error, emit_success, is_quiet, OutputMode};
use lazylink::{ui, JitSymbol, MaterializationSource, ResolutionQuery, SymbolNameSet, SymbolStringPool};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "lazylink")]
#[command(version)]
#[command(about = "Symbol resolution core for just-in-time linking")]
#[command(long_about = r#"
Lazylink loads an image manifest (eager symbols plus lazily materialized
groups) into a symbol table and lets you query it:
  • Flag lookups that never trigger materialization
  • Materializing lookups with staged resolved/ready results
  • Per-state table statistics

Example usage:
  lazylink init
  lazylink flags main fib
  lazylink lookup fib
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON instead of human-readable output
    #[arg(long, global = true)]
    json: bool,

    /// Path to the image manifest (defaults to lazylink.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a sample image manifest
    Init {
        /// Overwrite an existing manifest
        #[arg(short, long)]
        force: bool,
    },

    /// Look up symbol flags without materializing anything
    Flags {
        /// Symbol names
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Look up symbols, materializing lazy ones on demand
    Lookup {
        /// Symbol names
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Show per-state symbol counts
    Stats,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let mode = OutputMode::from_flag(cli.json);
    match cli.command {
        Commands::Init { force } => run_init(mode, cli.config.as_deref(), force),
        Commands::Flags { names } => run_flags(mode, cli.config.as_deref(), &names),
        Commands::Lookup { names } => run_lookup(mode, cli.config.as_deref(), &names),
        Commands::Stats => run_stats(mode, cli.config.as_deref()),
    }
}

fn load_image(path: Option<&Path>, pool: &SymbolStringPool) -> anyhow::Result<LoadedImage> {
    let shown = path.map(Path::to_path_buf).unwrap_or_else(config::default_config_path);
    let Some(manifest) = config::load_config(path)? else {
        anyhow::bail!("no image manifest at {} (run `lazylink init` first)", shown.display());
    };
    tracing::debug!("Loaded manifest {}", shown.display());
    manifest.build_table(pool)
}

fn run_init(mode: OutputMode, path: Option<&Path>, force: bool) -> anyhow::Result<()> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(config::default_config_path);
    config::write_config(&path, &LazylinkConfig::sample(), force)?;

    if mode.is_human() {
        ui::success(&format!("Wrote sample manifest to {}", path.display()));
    } else {
        emit_success(mode, "init", serde_json::json!({ "path": path }))?;
    }
    Ok(())
}

fn run_flags(mode: OutputMode, path: Option<&Path>, names: &[String]) -> anyhow::Result<()> {
    let pool = SymbolStringPool::new();
    let image = load_image(path, &pool)?;
    let requested: SymbolNameSet = config::intern_all(&pool, names).into_iter().collect();

    let result = image.table.lookup_flags(&requested);
    let found: BTreeMap<_, _> = result.symbol_flags.into_iter().collect();
    let mut missing: Vec<_> = result.symbols_not_found.into_iter().collect();
    missing.sort();

    if mode.is_human() {
        ui::header("Symbol flags");
        for (name, flags) in &found {
            ui::symbol_row(name, *flags, None);
        }
        for name in &missing {
            ui::state_row(name, None);
        }
    } else {
        emit_success(mode, "flags", serde_json::json!({ "flags": found, "not_found": missing }))?;
    }
    Ok(())
}

fn run_lookup(mode: OutputMode, path: Option<&Path>, names: &[String]) -> anyhow::Result<()> {
    let pool = SymbolStringPool::new();
    let image = load_image(path, &pool)?;
    let requested: SymbolNameSet = config::intern_all(&pool, names).into_iter().collect();

    let (query, rx) = ResolutionQuery::with_channel(requested.clone())?;
    let result = image.table.lookup(&query, requested.clone());
    let scheduled = result.materialization_work.symbol_count();
    tracing::info!(scheduled, sources = result.materialization_work.len(), "dispatching materialization");
    if let Err(err) = result.materialization_work.dispatch(&image.table) {
        tracing::warn!("Materialization reported an error: {}", err);
    }

    let resolved = rx.try_resolved();
    let ready = rx.try_ready();
    let failure = match (&resolved, &ready) {
        (Some(Err(err)), _) | (_, Some(Err(err))) => Some(err.to_string()),
        (None, _) => Some("query was left unresolved".to_string()),
        _ => None,
    };

    let mut states: Vec<_> = requested.iter().map(|n| (n.clone(), image.table.state_of(n))).collect();
    states.sort_by(|a, b| a.0.cmp(&b.0));

    if mode.is_human() {
        ui::header("Lookup");
        ui::info("Materialized", &scheduled.to_string());
        if let Some(Ok(defs)) = &resolved {
            ui::section("Resolved");
            let defs: BTreeMap<_, _> = defs.iter().collect();
            for (name, sym) in defs {
                ui::symbol_row(name, sym.flags, Some(sym.address));
            }
        }
        ui::section("States");
        for (name, state) in &states {
            ui::state_row(name, *state);
        }
        if !is_quiet() {
            for source in &image.sources {
                ui::summary_row(&format!("{} batches:", source.name()), &source.batches_served().to_string());
            }
        }
        match &failure {
            Some(msg) => ui::error(msg),
            None if matches!(ready, Some(Ok(()))) => ui::success("All symbols ready"),
            None => ui::warn("Resolved, but not yet ready"),
        }
    } else if let Some(msg) = &failure {
        emit_error(mode, "lookup", msg)?;
    } else {
        let defs: BTreeMap<_, JitSymbol> = match resolved {
            Some(Ok(defs)) => defs.into_iter().collect(),
            _ => BTreeMap::new(),
        };
        let states: BTreeMap<_, _> = states
            .into_iter()
            .map(|(name, state)| (name, state.map(|s| s.as_str())))
            .collect();
        emit_success(
            mode,
            "lookup",
            serde_json::json!({
                "symbols": defs,
                "ready": matches!(ready, Some(Ok(()))),
                "materialized": scheduled,
                "states": states,
            }),
        )?;
    }

    match failure {
        Some(msg) => anyhow::bail!(msg),
        None => Ok(()),
    }
}

fn run_stats(mode: OutputMode, path: Option<&Path>) -> anyhow::Result<()> {
    let pool = SymbolStringPool::new();
    let image = load_image(path, &pool)?;
    let stats = image.table.stats();

    if mode.is_human() {
        ui::header("Symbol table");
        println!("{}", ui::stats_table(&stats));
    } else {
        emit_success(mode, "stats", &stats)?;
    }
    Ok(())
}
