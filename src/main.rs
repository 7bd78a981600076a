//! Ladder - Entry Point
//!
//! Wiring sequence:
//! 1. Parse the command line
//! 2. Load the optional config file + validate
//! 3. Init tracing on stderr (text or JSON lines)
//! 4. Run the command against the selected venue

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use ladder::cli::{self, Cli};
use ladder::config::{self, LoggingConfig};

#[tokio::main]
async fn main() -> Result<()> {
  // ── 1. Command line ─────────────────────────────────────
  let cli = Cli::parse();

  // ── 2. Configuration from ladder.toml ───────────────────
  let config = config::loader::load_config(&cli.config).context("Failed to load configuration")?;

  // ── 3. Logging, kept off stdout for tables and prompts ──
  init_tracing(&config.logging);
  debug!(version = env!("CARGO_PKG_VERSION"), config = %cli.config, "Starting ladder");

  // ── 4. Command ──────────────────────────────────────────
  cli::run(cli, config).await
}

fn init_tracing(logging: &LoggingConfig) {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
  let builder = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr);
  if logging.json {
    builder.json().init();
  } else {
    builder.init();
  }
}
