//! Server wiring for qclab: configuration, catalog seeding, and batch
//! reprocessing over the SQLite store.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use qclab_core::{
  rule::WestgardRule,
  store::QualityStore,
  workflow,
};
use qclab_store_sqlite::SqliteStore;
use serde::Deserialize;
use strum::IntoEnumIterator as _;

// ─── Configuration ────────────────────────────────────────────────────────────

fn default_host() -> String { "127.0.0.1".to_string() }

fn default_port() -> u16 { 8080 }

fn default_store_path() -> PathBuf { PathBuf::from("~/.local/share/qclab/qclab.db") }

fn default_seed() -> bool { true }

/// Runtime server configuration, deserialised from `qclab.toml` and
/// `QCLAB_*` environment variables.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:               String,
  #[serde(default = "default_port")]
  pub port:               u16,
  #[serde(default = "default_store_path")]
  pub store_path:         PathBuf,
  /// Install the standard Westgard rules when the catalog is empty.
  #[serde(default = "default_seed")]
  pub seed_default_rules: bool,
}

impl ServerConfig {
  /// Layer the optional TOML file at `path` under the environment.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("QCLAB"))
      .build()
      .context("failed to read config file")?;

    settings
      .try_deserialize()
      .context("failed to deserialise ServerConfig")
  }

  /// `store_path` with a leading `~` expanded.
  pub fn resolved_store_path(&self) -> PathBuf { expand_tilde(&self.store_path) }
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

// ─── Store setup ──────────────────────────────────────────────────────────────

/// Open the store named by `cfg`, creating parent directories as needed.
pub async fn open_store(cfg: &ServerConfig) -> anyhow::Result<SqliteStore> {
  let path = cfg.resolved_store_path();
  if let Some(parent) = path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {parent:?}"))?;
  }
  SqliteStore::open(&path)
    .await
    .with_context(|| format!("failed to open store at {path:?}"))
}

/// Install the standard rule set if the catalog has no rules yet. Returns the
/// number of rules written.
pub async fn seed_default_rules<S: QualityStore>(store: &S) -> anyhow::Result<usize> {
  let existing = store
    .list_rule_configs()
    .await
    .context("failed to read rule catalog")?;
  if !existing.is_empty() {
    return Ok(0);
  }

  let mut written = 0;
  for rule in WestgardRule::iter() {
    store
      .upsert_rule(rule.default_config())
      .await
      .with_context(|| format!("failed to seed rule {rule}"))?;
    written += 1;
  }
  tracing::info!(rules = written, "seeded default control rules");
  Ok(written)
}

// ─── Batch reprocessing ───────────────────────────────────────────────────────

/// Totals across every context reprocessed by [`reprocess_all`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReprocessTotals {
  pub contexts: usize,
  pub points:   usize,
  pub created:  usize,
  pub existing: usize,
}

/// Re-classify every stored run, optionally restricted to one analyte.
pub async fn reprocess_all(
  store: &SqliteStore,
  analyte_id: Option<&str>,
) -> anyhow::Result<ReprocessTotals> {
  let contexts = store
    .list_contexts()
    .await
    .context("failed to list measurement contexts")?;

  let mut totals = ReprocessTotals::default();
  for context in contexts
    .iter()
    .filter(|c| analyte_id.is_none_or(|a| c.analyte_id == a))
  {
    let report = workflow::reprocess_context(store, context)
      .await
      .with_context(|| format!("failed to reprocess {context:?}"))?;
    totals.contexts += 1;
    totals.points += report.points.len();
    totals.created += report.created;
    totals.existing += report.existing;
  }
  Ok(totals)
}
