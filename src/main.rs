use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use tutorsync::cache::StoreCell;
use tutorsync::config::Config;
use tutorsync::connectivity::{HttpProbe, NetworkMonitor};
use tutorsync::remote::HttpRemoteSource;
use tutorsync::sync::{SyncController, SyncOptions, SyncState};

#[derive(Parser, Debug)]
#[command(name = "tutorsync")]
#[command(about = "Show a tutor's booked sessions, served from cache when offline")]
#[command(version)]
struct Args {
  /// Tutor whose sessions to load
  tutor: String,

  /// Path to config file (default: $XDG_CONFIG_HOME/tutorsync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Keep running and refresh when connectivity comes back
  #[arg(short, long)]
  watch: bool,

  /// Increase log verbosity (-v debug, -vv trace)
  #[arg(short, long, action = clap::ArgAction::Count)]
  verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = init_logging(args.verbose)?;

  let config = Config::load(args.config.as_deref())?;

  let cell = if config.cache.enabled {
    StoreCell::sqlite(config.cache_path()?)
  } else {
    StoreCell::disabled()
  };
  let store = cell.get().await?;
  let remote = Arc::new(HttpRemoteSource::new(&config)?);

  let probe_url = config
    .connectivity
    .probe_url
    .clone()
    .unwrap_or_else(|| config.api.url.clone());
  let probe = HttpProbe::new(
    &probe_url,
    Duration::from_secs(config.connectivity.probe_interval_secs),
    Duration::from_secs(config.api.timeout_secs),
  )?;
  let monitor = Arc::new(NetworkMonitor::new(probe.check().await));

  let controller = SyncController::new(
    store,
    remote,
    monitor.clone(),
    SyncOptions::from(&config.sync),
  );

  controller.load_booked_sessions(&args.tutor).await;
  print_state(&controller.state());

  if args.watch {
    let mut states = controller.subscribe();
    let printer = tokio::spawn(async move {
      while states.changed().await.is_ok() {
        let state = states.borrow_and_update().clone();
        print_state(&state);
      }
    });

    let forwarder = controller.watch_connectivity(monitor.subscribe());
    let probing = probe.spawn(monitor);

    tokio::signal::ctrl_c().await?;

    probing.abort();
    forwarder.abort();
    printer.abort();
  }

  Ok(())
}

/// Log to a daily file; stdout carries the session listing.
fn init_logging(verbose: u8) -> Result<WorkerGuard> {
  let log_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?
    .join("tutorsync")
    .join("logs");
  std::fs::create_dir_all(&log_dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", log_dir.display(), e))?;

  let filter = match verbose {
    0 => "info",
    1 => "debug",
    _ => "trace",
  };
  let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

  let appender = tracing_appender::rolling::daily(log_dir, "tutorsync.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::fmt()
    .with_env_filter(env_filter)
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}

fn print_state(state: &SyncState) {
  let tutor = state.last_partition_key.as_deref().unwrap_or("-");
  let mut flags = Vec::new();
  if state.is_loading {
    flags.push("loading".to_string());
  }
  if state.is_stale {
    flags.push("offline data".to_string());
  }
  if let Some(synced) = state.last_synced_at {
    flags.push(format!("synced {}", synced.format("%H:%M:%S")));
  }

  if flags.is_empty() {
    println!("Tutor {}: {} sessions", tutor, state.records.len());
  } else {
    println!(
      "Tutor {}: {} sessions ({})",
      tutor,
      state.records.len(),
      flags.join(", ")
    );
  }
  if let Some(error) = &state.error {
    println!("  ! {}", error);
  }

  for record in &state.records {
    println!(
      "  #{:<6} {:<20} {:<24} {:<20} {:>8.2}  {}",
      record.id,
      record.scheduled_at,
      record.course_name,
      record.student_label.as_deref().unwrap_or("-"),
      record.cost,
      record.location_name
    );
  }
}
