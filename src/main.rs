//! rmsbridge - sliding-window RMS of a FieldTrip buffer
//!
//! Entry point: loads the config, connects to Redis and the buffer, and
//! runs the poll loop until a terminal condition.

use anyhow::{Context, Result};
use clap::Parser;
use rmsbridge::config::{self, ConfigError, FileConfig};
use rmsbridge::poll::{self, RunError, Settings};
use rmsbridge::{ChangeMonitor, FieldTripClient, MemoryStore, Patch, RedisStore};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "rmsbridge", version, about = "Sliding-window RMS of a FieldTrip buffer, published to Redis")]
struct Cli {
    /// Configuration file (default: <executable>.toml next to the executable)
    #[arg(short, long, value_name = "PATH")]
    inifile: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let path = cli.inifile.unwrap_or_else(config::default_path);

    let file = match FileConfig::load(&path) {
        Ok(f) => f,
        Err(e) => exit(RunError::from(e)),
    };

    // Settings needed before the store exists can only come from the file
    let mut bootstrap = Patch::new(file.clone(), MemoryStore::new());
    init_logging(bootstrap.get_int("general", "debug", Some(1)).unwrap_or(1));
    info!(version = rmsbridge::VERSION, config = %path.display(), "Starting rmsbridge");

    let (redis_host, redis_port) = match redis_address(&mut bootstrap) {
        Ok(addr) => addr,
        Err(e) => exit(RunError::from(e)),
    };
    let store = match RedisStore::connect(&redis_host, redis_port) {
        Ok(s) => s,
        Err(e) => exit(RunError::StoreConnection(e)),
    };

    let mut patch = Patch::new(file, store);
    let settings = match Settings::from_patch(&mut patch) {
        Ok(s) => s,
        Err(e) => exit(RunError::from(e)),
    };

    // Set up Ctrl+C handler
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("Failed to install Ctrl+C handler")?;

    let (reason, stats) = poll::run(
        settings,
        FieldTripClient::connect,
        patch,
        ChangeMonitor::new(),
        &running,
    );

    if let Some(stats) = stats {
        match serde_json::to_string(&stats.summary()) {
            Ok(json) => info!(summary = %json, "Run summary"),
            Err(e) => error!(error = %e, "Failed to serialize run summary"),
        }
    }

    exit(reason)
}

/// Print the terminal condition and leave with its exit code
fn exit(reason: RunError) -> ! {
    match reason {
        RunError::Interrupted => eprintln!("Interrupted"),
        ref other => eprintln!("Error: {other}"),
    }
    std::process::exit(reason.exit_code())
}

/// `general.debug` picks the default filter when `RUST_LOG` is unset
fn init_logging(debug: i64) {
    let level = match debug {
        i64::MIN..=0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("rmsbridge={level},rmsbridge_core={level}"))
    });

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn redis_address(patch: &mut Patch<MemoryStore>) -> Result<(String, u16), ConfigError> {
    let host = patch.get_string("redis", "hostname", Some("localhost"))?;
    let port = patch.get_int(
        "redis",
        "port",
        Some(i64::from(rmsbridge::DEFAULT_REDIS_PORT)),
    )?;
    let port = u16::try_from(port).map_err(|_| ConfigError::Invalid {
        section: "redis".into(),
        key: "port".into(),
        message: format!("{port} is not a valid port"),
    })?;
    Ok((host, port))
}
