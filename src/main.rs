mod app;
mod cache;
mod config;
mod connectivity;
mod datastore;
mod event;
mod logging;
mod query;
mod repository;
mod ui;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use color_eyre::Result;
use tracing::info;

use crate::connectivity::{Connectivity, FixedConnectivity, TcpProbe};
use crate::datastore::{clear_disk_cache, DatastoreClient};
use crate::repository::{MobileDataUsage, UsageRepository};
use crate::ui::renderfns::format_volume;

#[derive(Parser, Debug)]
#[command(name = "datausage")]
#[command(about = "Mobile data usage per year, cached for offline use")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/datausage/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// API base URL, overrides the config file
  #[arg(long)]
  base_url: Option<String>,

  /// Serve only from the cache, never touching the network
  #[arg(long)]
  offline: bool,

  /// Fetch once, print the yearly table and exit
  #[arg(long)]
  print: bool,

  /// Empty the response cache and exit
  #[arg(long)]
  clear_cache: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let log_guard = logging::init(&logging::default_log_dir()?)?;

  let mut config = config::Config::load(args.config.as_deref())?;
  if let Some(base_url) = args.base_url {
    config.api.base_url = base_url;
  }

  if args.clear_cache {
    let freed = clear_disk_cache(&config.cache)?;
    println!("Cache cleared ({} bytes freed)", freed);
    return Ok(());
  }

  let connectivity: Arc<dyn Connectivity> = if args.offline {
    Arc::new(FixedConnectivity(false))
  } else {
    Arc::new(TcpProbe::new(
      config.probe_addr()?,
      Duration::from_millis(config.connectivity.probe_timeout_ms),
    ))
  };

  let client = DatastoreClient::new(&config, connectivity.clone())?;
  info!(endpoint = %client.endpoint(), offline = args.offline, "client ready");

  let repository = UsageRepository::new(client);

  if args.print {
    match repository.refresh().await {
      Ok(usage) => print_usage(&usage),
      Err(err) => {
        eprintln!("{}", err);
        // Flush buffered log lines before exiting
        drop(log_guard);
        std::process::exit(1);
      }
    }
    return Ok(());
  }

  let mut app = app::App::new(&config, repository, connectivity);
  app.run().await?;

  Ok(())
}

fn print_usage(usage: &MobileDataUsage) {
  if usage.yearly.is_empty() {
    println!("No records ({})", usage.source.label());
    return;
  }

  println!("{:<6} {:>14}", "Year", "Total (PB)");
  for year in &usage.yearly.years {
    let marker = if year.has_decrease { "  ▼ decrease" } else { "" };
    println!(
      "{:<6} {:>14}{}",
      year.year,
      format_volume(year.total_volume),
      marker
    );
  }
  println!("({})", usage.source.label());
}
