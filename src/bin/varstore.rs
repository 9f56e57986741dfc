//! varstore inspection binary
//!
//! Read-only tooling over persisted stores:
//! - Print statistics for a store (`inspect`)
//! - Run structural sanity checks (`check`)
//! - Dump rows or chains (`dump`)
//!
//! # Examples
//!
//! ```bash
//! # Stats of a record store of strings
//! varstore --dir data/index inspect terms --layout bytes
//!
//! # Verify a chain pool, exit non-zero on corruption
//! varstore --dir data/index check postings --layout chains
//!
//! # First 20 rows of a var record store as JSON
//! varstore --dir data/index dump docs --layout vars --limit 20 --json
//! ```

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use varstore::{ByteRecordStore, LinkedRecordStore, StoreConfig, VarArray, VarRecordStore};

/// varstore - packed record and chain storage inspector
#[derive(Parser, Debug)]
#[command(name = "varstore")]
#[command(version = varstore::VERSION)]
#[command(about = "Inspect persisted varstore resources", long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Directory holding the resources (overrides the config file)
    #[arg(long, global = true, env = "VARSTORE_DIR")]
    dir: Option<PathBuf>,

    /// TOML store configuration
    #[arg(long, global = true, env = "VARSTORE_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn", env = "RUST_LOG")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print statistics for a store
    Inspect(StoreArgs),

    /// Run sanity checks; exits non-zero on corruption
    Check(StoreArgs),

    /// Print rows (record stores), values (arrays) or chains
    Dump(DumpArgs),
}

/// How the resources under a name are laid out
#[derive(ValueEnum, Clone, Copy, Debug)]
enum Layout {
    /// A single var array
    Array,
    /// Byte record store (`<name>` + `<name>.Offs`)
    Bytes,
    /// Var record store (`<name>` + `<name>.Offs`)
    Vars,
    /// Linked record store (`<name>` + `.Next`/`.Last`/`.N`)
    Chains,
}

#[derive(Args, Debug)]
struct StoreArgs {
    /// Base resource name
    name: String,

    /// Store layout
    #[arg(short, long, value_enum, default_value = "vars")]
    layout: Layout,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct DumpArgs {
    #[command(flatten)]
    store: StoreArgs,

    /// Maximum number of rows or chains to print
    #[arg(short = 'n', long, default_value = "100")]
    limit: usize,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli)?;

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Inspect(args) => inspect_command(&config, &args),
        Commands::Check(args) => check_command(&config, &args),
        Commands::Dump(args) => dump_command(&config, &args),
    }
}

/// Console logging filtered by `--log-level` and `RUST_LOG`
fn setup_logging(cli: &Cli) -> anyhow::Result<()> {
    let log_level = cli
        .log_level
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::WARN);

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<StoreConfig> {
    let mut config = match &cli.config {
        Some(path) => StoreConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => StoreConfig::default(),
    };
    if let Some(dir) = &cli.dir {
        config.directory = Some(dir.clone());
    }
    if config.directory.is_none() {
        anyhow::bail!("no resource directory: pass --dir or set `directory` in the config");
    }
    config.validate()?;
    Ok(config)
}

/// Any store the CLI can open
enum Opened {
    Array(VarArray),
    Bytes(ByteRecordStore),
    Vars(VarRecordStore),
    Chains(LinkedRecordStore),
}

impl Opened {
    fn open(config: &StoreConfig, args: &StoreArgs) -> anyhow::Result<Self> {
        let name = args.name.as_str();
        let opened = match args.layout {
            Layout::Array => Opened::Array(VarArray::open(name, config)?),
            Layout::Bytes => Opened::Bytes(ByteRecordStore::open(name, config)?),
            Layout::Vars => Opened::Vars(VarRecordStore::open(name, config)?),
            Layout::Chains => Opened::Chains(LinkedRecordStore::open(name, config)?),
        };
        info!(name, layout = ?args.layout, "Opened store");
        Ok(opened)
    }

    fn stats_json(&self) -> anyhow::Result<serde_json::Value> {
        Ok(match self {
            Opened::Array(s) => serde_json::to_value(s.stats())?,
            Opened::Bytes(s) => serde_json::to_value(s.stats())?,
            Opened::Vars(s) => serde_json::to_value(s.stats())?,
            Opened::Chains(s) => serde_json::to_value(s.stats()?)?,
        })
    }

    fn sanity_check(&self) -> varstore::error::Result<()> {
        match self {
            Opened::Array(s) => s.sanity_check(),
            Opened::Bytes(s) => s.sanity_check(),
            Opened::Vars(s) => s.sanity_check(),
            Opened::Chains(s) => s.sanity_check(),
        }
    }
}

/// Inspect command - print store statistics
fn inspect_command(config: &StoreConfig, args: &StoreArgs) -> anyhow::Result<()> {
    let store = Opened::open(config, args)?;
    let stats = store.stats_json()?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("{} ({:?})", args.name, args.layout);
    print_fields(&stats, 1);
    Ok(())
}

/// Check command - run sanity checks
fn check_command(config: &StoreConfig, args: &StoreArgs) -> anyhow::Result<()> {
    let store = Opened::open(config, args)?;
    let outcome = store.sanity_check();

    if args.json {
        #[derive(Serialize)]
        struct Report<'a> {
            name: &'a str,
            ok: bool,
            error: Option<String>,
        }
        let report = Report {
            name: &args.name,
            ok: outcome.is_ok(),
            error: outcome.as_ref().err().map(|e| e.to_string()),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    match outcome {
        Ok(()) => {
            if !args.json {
                println!("{}: ok", args.name);
            }
            Ok(())
        }
        Err(e) => {
            error!(name = %args.name, error = %e, "Sanity check failed");
            std::process::exit(2);
        }
    }
}

/// Dump command - print contents
fn dump_command(config: &StoreConfig, args: &DumpArgs) -> anyhow::Result<()> {
    let store = Opened::open(config, &args.store)?;
    let limit = args.limit;

    let rows: Vec<serde_json::Value> = match &store {
        Opened::Array(s) => s
            .iter()
            .take(limit)
            .map(serde_json::Value::from)
            .collect(),
        Opened::Bytes(s) => {
            let mut rows = Vec::new();
            for index in 0..s.len().min(limit) {
                let row = match s.get_str(index) {
                    Ok(text) => serde_json::Value::from(text),
                    Err(_) => serde_json::Value::from(s.get(index)?),
                };
                rows.push(row);
            }
            rows
        }
        Opened::Vars(s) => {
            let mut rows = Vec::new();
            for row in s.iter().take(limit) {
                rows.push(serde_json::Value::from(row?));
            }
            rows
        }
        Opened::Chains(s) => {
            let mut rows = Vec::new();
            for chain in 0..s.chain_count().min(limit) {
                rows.push(serde_json::Value::from(s.values(chain)?));
            }
            rows
        }
    };

    if args.store.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    for (index, row) in rows.iter().enumerate() {
        println!("{:>8}  {}", index, row);
    }
    Ok(())
}

fn print_fields(value: &serde_json::Value, depth: usize) {
    let indent = "  ".repeat(depth);
    match value {
        serde_json::Value::Object(map) => {
            for (key, field) in map {
                if field.is_object() {
                    println!("{}{}:", indent, key);
                    print_fields(field, depth + 1);
                } else {
                    println!("{}{}: {}", indent, key, field);
                }
            }
        }
        other => println!("{}{}", indent, other),
    }
}
