mod app;
mod cache;
mod clock;
mod commands;
mod config;
mod db;
mod error;
mod logging;
mod net;
mod push;
mod session;
mod story;
mod worker;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "storycache")]
#[command(about = "An offline-first story client")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/storycache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: commands::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;
  let data_dir = config.data_dir()?;

  let log_dir = config.log.file.then(|| data_dir.join("logs"));
  let _guard = logging::init_tracing(&config.log.level, log_dir.as_deref());

  let mut app = app::App::new(&config, data_dir)?;
  app.run(args.command).await?;

  Ok(())
}
