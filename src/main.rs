//! dedupkv - A content-deduplicating in-memory key-value store
//!
//! Server entry point: parses flags, sets up logging, the storage engine and
//! its sweeper, then serves HTTP until Ctrl+C.

use dedupkv::storage::{StorageEngine, SweepConfig, Sweeper};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Server configuration
struct Config {
    host: String,
    port: u16,
    /// Periodic sweep interval, `None` when only read-triggered sweeps run
    sweep_interval: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: dedupkv::DEFAULT_HOST.to_string(),
            port: dedupkv::DEFAULT_PORT,
            sweep_interval: SweepConfig::default().interval,
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--host" | "-h" => {
                    config.host = flag_value(&args, i, "--host").to_string();
                    i += 2;
                }
                "--port" | "-p" => {
                    config.port = flag_value(&args, i, "--port").parse().unwrap_or_else(|_| {
                        eprintln!("Error: invalid port number");
                        std::process::exit(1);
                    });
                    i += 2;
                }
                "--sweep-interval" => {
                    let millis: u64 = flag_value(&args, i, "--sweep-interval")
                        .parse()
                        .unwrap_or_else(|_| {
                            eprintln!("Error: invalid sweep interval");
                            std::process::exit(1);
                        });
                    config.sweep_interval = match millis {
                        0 => None,
                        ms => Some(Duration::from_millis(ms)),
                    };
                    i += 2;
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("dedupkv version {}", dedupkv::VERSION);
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {}", args[i]);
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        config
    }

    /// Returns the bind address as a string
    fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Returns the value following the flag at `i`, or exits.
fn flag_value<'a>(args: &'a [String], i: usize, flag: &str) -> &'a str {
    match args.get(i + 1) {
        Some(value) => value.as_str(),
        None => {
            eprintln!("Error: {} requires a value", flag);
            std::process::exit(1);
        }
    }
}

fn print_help() {
    println!(
        r#"
dedupkv - A content-deduplicating in-memory key-value store

USAGE:
    dedupkv [OPTIONS]

OPTIONS:
    -h, --host <HOST>          Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>          Port to listen on (default: 8080)
        --sweep-interval <MS>  Periodic sweep interval in ms, 0 disables (default: 1000)
    -v, --version              Print version information
        --help                 Print this help message

Set RUST_LOG to change the log level (default: info).

EXAMPLES:
    $ curl -X POST localhost:8080/ \
        -d '{{"key": "k", "data": "aGVsbG8=", "expiration_date": "2030-01-01T00:00:00Z"}}'
    {{"key":"k"}}
    $ curl -X GET localhost:8080/ -d '{{"key": "k"}}'
"#
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_args();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!(version = dedupkv::VERSION, "Starting dedupkv");

    // Shared across all connections
    let storage = Arc::new(StorageEngine::new());

    let _sweeper = Sweeper::start(
        Arc::clone(&storage),
        SweepConfig {
            interval: config.sweep_interval,
        },
    );

    let listener = TcpListener::bind(config.bind_address()).await?;

    let shutdown = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received, stopping server..."),
            Err(e) => {
                error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        }
    };

    dedupkv::serve(listener, Arc::clone(&storage), shutdown).await?;

    let final_stats = storage.stats();
    info!(
        records = final_stats.records,
        aliases = final_stats.aliases,
        writes = final_stats.writes,
        reads = final_stats.reads,
        "Server shutdown complete"
    );
    Ok(())
}
