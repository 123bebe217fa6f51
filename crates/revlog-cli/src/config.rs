//! Layered CLI configuration: defaults, optional TOML file, `REVLOG_*`
//! environment variables. Command-line flags are applied on top by `main`.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "revlog.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct CliConfig {
  /// Revision store database; a leading `~/` is expanded.
  pub db_path:     PathBuf,
  /// Working directory recorded with new revisions.
  pub working_dir: String,
}

impl CliConfig {
  /// Load configuration from `file` (if it exists) and the environment.
  pub fn load(file: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .set_default("db_path", "revlog.db")?
      .set_default("working_dir", ".")?
      .add_source(config::File::from(file).required(false))
      .add_source(config::Environment::with_prefix("REVLOG"))
      .build()
      .with_context(|| format!("failed to read config from {}", file.display()))?;

    let mut cfg: CliConfig = settings
      .try_deserialize()
      .context("failed to deserialise CliConfig")?;
    cfg.db_path = expand_tilde(&cfg.db_path);
    Ok(cfg)
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
