//! `revlog`: inspect and record project history in a revision store.
//!
//! # Usage
//!
//! ```text
//! revlog snapshot ./project --startup main.lua
//! revlog log
//! revlog diff 3
//! revlog show main.lua 3 > main.lua.r3
//! revlog export 3 /tmp/project-r3
//! revlog restore 2 ./project
//! ```
//!
//! Settings are read from `revlog.toml` (or `--config FILE`) and `REVLOG_*`
//! environment variables; `--db` overrides the configured store path.

mod commands;
mod config;
mod snapshot;

use std::{
  io::{self, Write as _},
  path::PathBuf,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use revlog_store_sqlite::SqliteStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::config::{CliConfig, DEFAULT_CONFIG_FILE, expand_tilde};

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "revlog", version, about = "Revision history for project files")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG_FILE)]
  config: PathBuf,

  /// Revision store database (overrides `db_path`).
  #[arg(long, value_name = "PATH")]
  db: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List revisions, oldest first.
  Log {
    /// Print JSON instead of a table.
    #[arg(long)]
    json: bool,
  },
  /// List files existing at a revision.
  Ls {
    revision: i64,
    /// Include files removed at or before the revision.
    #[arg(long)]
    all: bool,
  },
  /// Show what a revision changed, with a unified diff per file.
  Diff { revision: i64 },
  /// Print a file's content at a revision.
  Show { path: String, revision: i64 },
  /// Write every file existing at a revision into a directory.
  Export { revision: i64, dir: PathBuf },
  /// Record the current state of a directory as a new revision.
  Snapshot {
    dir: PathBuf,
    /// Working directory stored with the revision (overrides `working_dir`).
    #[arg(long)]
    working_dir: Option<String>,
    /// Startup file to record; may be repeated.
    #[arg(long = "startup", value_name = "FILE")]
    startup_files: Vec<String>,
  },
  /// Back up a directory, then write a revision's files into it.
  Restore {
    revision: i64,
    dir: PathBuf,
    /// Working directory used when the store has none recorded.
    #[arg(long)]
    working_dir: Option<String>,
  },
  /// Delete one revision. Later deltas that depended on it become unreadable.
  Delete { revision: i64 },
  /// Delete every revision.
  Clear,
}

// ─── Entry point ──────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
  // Logs go to stderr so `show` output stays clean.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(io::stderr)
    .init();

  let cli = Cli::parse();

  let mut cfg = CliConfig::load(&cli.config)?;
  if let Some(db) = &cli.db {
    cfg.db_path = expand_tilde(db);
  }

  let mut store = SqliteStore::open(&cfg.db_path)
    .with_context(|| format!("failed to open revision store at {:?}", cfg.db_path))?;
  if let Some(from) = store.migrated_from() {
    tracing::info!(from, "upgraded revision store schema");
  }

  let mut stdout = io::stdout().lock();
  match cli.command {
    Command::Log { json } => commands::log(&store, json, &mut stdout)?,
    Command::Ls { revision, all } => commands::ls(&store, revision, all, &mut stdout)?,
    Command::Diff { revision } => commands::diff(&store, revision, &mut stdout)?,
    Command::Show { path, revision } => commands::show(&store, &path, revision, &mut stdout)?,
    Command::Export { revision, dir } => {
      let count = commands::export(&store, revision, &dir)?;
      writeln!(stdout, "exported {count} file(s) to {}", dir.display())?;
    }
    Command::Snapshot { dir, working_dir, startup_files } => {
      let working_dir = working_dir.unwrap_or(cfg.working_dir);
      let exclude = snapshot::store_artifacts(&cfg.db_path);
      let revision =
        commands::snapshot(&mut store, &dir, &exclude, &working_dir, &startup_files)?;
      writeln!(stdout, "revision {revision}")?;
    }
    Command::Restore { revision, dir, working_dir } => {
      let working_dir = working_dir.unwrap_or(cfg.working_dir);
      let exclude = snapshot::store_artifacts(&cfg.db_path);
      let outcome = commands::restore(&mut store, revision, &dir, &exclude, &working_dir)?;
      writeln!(
        stdout,
        "restored {} file(s) from revision {revision}; backup is revision {}, result is revision {}",
        outcome.files, outcome.backup, outcome.restored,
      )?;
    }
    Command::Delete { revision } => commands::delete(&mut store, revision)?,
    Command::Clear => commands::clear(&mut store)?,
  }

  Ok(())
}
