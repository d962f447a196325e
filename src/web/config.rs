//! Configuration types and constants for the SafeVoice server.

use std::path::PathBuf;

use clap::Parser;

/// Countdown before a panic alert escalates, when the caller does not give
/// one.
pub(crate) const DEFAULT_COUNTDOWN_SECONDS: u32 = 30;
pub(crate) const MAX_COUNTDOWN_SECONDS: u32 = 300;

pub(crate) const DEFAULT_LIST_LIMIT: u32 = 50;
pub(crate) const MAX_LIST_LIMIT: u32 = 200;

pub(crate) const WS_CHANNEL_CAPACITY: usize = 256;
pub(crate) const MAX_WS_CONNECTIONS: usize = 8;

/// SafeVoice backend server.
///
/// Provides the panic alert, incident report, safehouse booking, emergency
/// contact, and messaging REST API, plus a WebSocket event stream, with
/// state persisted in SQLite.
///
/// Configuration can be set via CLI arguments or environment variables.
/// CLI arguments take precedence over environment variables.
#[derive(Parser, Debug)]
#[command(name = "safevoice", version, about)]
pub struct Cli {
    /// HTTP server bind address [env: SAFEVOICE_BIND] [default: 127.0.0.1:3000]
    #[arg(long, short = 'b')]
    pub bind: Option<String>,

    /// Data directory for the database [env: SAFEVOICE_HOME] [default: ~/.safevoice]
    #[arg(long, short = 'd')]
    pub data_dir: Option<PathBuf>,

    /// Passphrase for sealing sensitive fields [env: SAFEVOICE_SEAL_PASSPHRASE]
    #[arg(long)]
    pub seal_passphrase: Option<String>,

    /// Seed a demo NGO and safehouses on startup (idempotent)
    #[arg(long)]
    pub seed_demo_data: bool,
}

pub struct Config {
    pub bind_addr: String,
    pub data_dir: PathBuf,
    pub seal_passphrase: Option<String>,
    pub seed_demo_data: bool,
}

impl Config {
    pub fn from_cli_and_env(cli: Cli) -> Self {
        let data_dir = cli
            .data_dir
            .or_else(|| std::env::var("SAFEVOICE_HOME").ok().map(PathBuf::from))
            .unwrap_or_else(|| {
                std::env::var("HOME")
                    .map(|h| PathBuf::from(h).join(".safevoice"))
                    .unwrap_or_else(|_| PathBuf::from(".safevoice"))
            });

        let bind_addr = cli
            .bind
            .or_else(|| std::env::var("SAFEVOICE_BIND").ok())
            .unwrap_or_else(|| "127.0.0.1:3000".to_string());

        let seal_passphrase = cli
            .seal_passphrase
            .or_else(|| std::env::var("SAFEVOICE_SEAL_PASSPHRASE").ok());

        Self {
            bind_addr,
            data_dir,
            seal_passphrase,
            seed_demo_data: cli.seed_demo_data,
        }
    }
}
