//! qclab server binary.
//!
//! Reads `qclab.toml` (or the path given with `--config`), opens the SQLite
//! store, and either serves the JSON API or re-classifies stored runs.
//!
//! ```text
//! cargo run -p qclab-server --bin qclab -- serve
//! cargo run -p qclab-server --bin qclab -- reprocess --analyte GLU
//! ```

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use axum::Router;
use clap::{Parser, Subcommand};
use qclab_core::{limits::ControlContext, workflow};
use qclab_server::{ServerConfig, open_store, reprocess_all, seed_default_rules};
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Westgard QC evaluation server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "qclab.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the JSON API (default).
  Serve,
  /// Re-evaluate stored runs and record any missing violations.
  Reprocess {
    /// Only reprocess runs for this analyte.
    #[arg(long)]
    analyte: Option<String>,
    /// Reprocess exactly one context: ANALYTE LOT INSTRUMENT LEVEL.
    #[arg(long, num_args = 4, value_names = ["ANALYTE", "LOT", "INSTRUMENT", "LEVEL"])]
    context: Option<Vec<String>>,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let server_cfg = ServerConfig::load(&cli.config)?;
  let store = open_store(&server_cfg).await?;

  if server_cfg.seed_default_rules {
    seed_default_rules(&store).await?;
  }

  match cli.command.unwrap_or(Command::Serve) {
    Command::Serve => {
      let app = Router::new().nest("/api", qclab_api::api_router(Arc::new(store)));
      let address = format!("{}:{}", server_cfg.host, server_cfg.port);

      tracing::info!("Listening on http://{address}");
      let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;

      axum::serve(listener, app).await.context("server error")?;
    }
    Command::Reprocess { context: Some(parts), .. } => {
      let [analyte, lot, instrument, level] = <[String; 4]>::try_from(parts)
        .map_err(|_| anyhow::anyhow!("--context takes exactly four values"))?;
      let context = ControlContext::new(analyte, lot, instrument, level);
      let report = workflow::reprocess_context(&store, &context)
        .await
        .context("reprocess failed")?;
      println!(
        "{} points, {} violations recorded, {} already on record",
        report.points.len(),
        report.created,
        report.existing
      );
    }
    Command::Reprocess { analyte, context: None } => {
      let totals = reprocess_all(&store, analyte.as_deref()).await?;
      println!(
        "{} contexts, {} points, {} violations recorded, {} already on record",
        totals.contexts, totals.points, totals.created, totals.existing
      );
    }
  }

  Ok(())
}
