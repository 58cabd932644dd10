use clap::{Parser, Subcommand};
use parking_lot::RwLock;
use std::{
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
};

use super::types::LogLevel;

// -----------------------------------------------------------------------------
// ----- Global Singleton ------------------------------------------------------

static CLI_CONFIG: OnceLock<Arc<RwLock<CliConfig>>> = OnceLock::new();

// -----------------------------------------------------------------------------
// ----- CliConfig -------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct CliConfig {
    pub command: Command,
    pub listen_addr: SocketAddr,
    pub settings_file: Option<PathBuf>,
    pub log_level: LogLevel,
}

impl CliConfig {
    pub fn init() {
        CLI_CONFIG.get_or_init(|| {
            let cfg = Self::from_args();
            cfg.validate();
            Arc::new(RwLock::new(cfg))
        });
    }

    pub fn snapshot() -> CliConfig {
        handle().read().clone()
    }
}

// -----------------------------------------------------------------------------
// ----- CliConfig: Private ----------------------------------------------------

impl CliConfig {
    fn from_args() -> Self {
        let args = Args::try_parse().unwrap_or_else(|e| panic!("Invalid CLI/ENV: {e}"));

        Self {
            command: args.command.unwrap_or(Command::Run),
            listen_addr: args.listen_addr,
            settings_file: args.settings_file,
            log_level: args.log_level,
        }
    }

    fn validate(&self) {
        if let Some(path) = &self.settings_file {
            must_exist_file(path, "--settings / ibpool.toml");
        }
    }
}

// -----------------------------------------------------------------------------
// ----- Args ------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "ibpool", version, about = "Trading-gateway connection pool")]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    // Address for the status HTTP surface (/healthz, /status).
    #[arg(
        long = "listen",
        short = 'L',
        env = "IBPOOL_LISTEN",
        default_value = "127.0.0.1:8000"
    )]
    listen_addr: SocketAddr,

    // Optional; every setting has a default, so the file can be omitted.
    #[arg(long = "settings", env = "IBPOOL_SETTINGS_FILE")]
    settings_file: Option<PathBuf>,

    #[arg(long = "log", default_value = "info")]
    log_level: LogLevel,
}

#[derive(Subcommand, Clone, Copy, Debug)]
pub enum Command {
    /// Run the pool service (default).
    Run,
    /// One-shot gateway connectivity check, then exit.
    Check,
}

// -----------------------------------------------------------------------------
// ----- Private Utils ---------------------------------------------------------

fn handle() -> Arc<RwLock<CliConfig>> {
    CLI_CONFIG
        .get()
        .expect("config not initialized; call config::init().await first")
        .clone()
}

fn must_exist_file(path: &Path, hint: &str) {
    let md = fs::metadata(path).unwrap_or_else(|_| {
        panic!("required file missing: {} (from {hint})", path.display());
    });

    if !md.is_file() {
        panic!("path is not a file: {} (from {hint})", path.display());
    }
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
