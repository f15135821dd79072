//! Server configuration.
//!
//! Read from an optional TOML file, then overlaid with `GRUFF_*` environment
//! variables. A bare `PORT` wins over both.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use anyhow::Context as _;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "default_env")]
  pub env:                  String,
  #[serde(default = "default_name")]
  pub name:                 String,
  #[serde(default = "default_host")]
  pub host:                 String,
  #[serde(default = "default_port")]
  pub port:                 u16,
  /// SQLite database file; a leading `~/` is expanded.
  #[serde(default = "default_db_path")]
  pub db_path:              PathBuf,
  /// Per-request deadline. `0` disables it.
  #[serde(default = "default_request_timeout_secs")]
  pub request_timeout_secs: u64,
}

fn default_env() -> String { "development".to_owned() }
fn default_name() -> String { "gruff".to_owned() }
fn default_host() -> String { "127.0.0.1".to_owned() }
fn default_port() -> u16 { 8080 }
fn default_db_path() -> PathBuf { PathBuf::from("gruff.db") }
fn default_request_timeout_secs() -> u64 { 30 }

impl ServerConfig {
  /// Load from `path` (missing is fine) and the process environment.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    Self::from_source(
      config::File::from(path).required(false),
      std::env::var("PORT").ok(),
    )
  }

  fn from_source<T>(file: T, port: Option<String>) -> anyhow::Result<Self>
  where
    T: config::Source + Send + Sync + 'static,
  {
    let settings = config::Config::builder()
      .add_source(file)
      .add_source(config::Environment::with_prefix("GRUFF"))
      .set_override_option("port", port)
      .context("invalid PORT")?
      .build()
      .context("failed to read config file")?;

    let mut cfg: Self = settings
      .try_deserialize()
      .context("failed to deserialise ServerConfig")?;
    cfg.db_path = expand_tilde(&cfg.db_path);
    Ok(cfg)
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  pub fn request_timeout(&self) -> Option<Duration> {
    (self.request_timeout_secs > 0).then(|| Duration::from_secs(self.request_timeout_secs))
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
