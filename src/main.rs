//! LiteKV server binary.

use clap::Parser;
use litekv::{Config, Server};
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

/// A miniature in-memory key-value server
#[derive(Parser, Debug)]
#[command(name = "litekv")]
#[command(version)]
struct Args {
    /// Host to bind to
    #[arg(long, default_value = litekv::DEFAULT_HOST)]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = litekv::DEFAULT_PORT)]
    port: u16,

    /// Snapshot file used by SAVE and LOAD
    #[arg(short, long, default_value = litekv::DEFAULT_SNAPSHOT_PATH)]
    snapshot: PathBuf,

    /// Do not restore the snapshot file at startup
    #[arg(long)]
    no_load: bool,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        Config {
            host: args.host,
            port: args.port,
            snapshot_path: args.snapshot,
            load_on_startup: !args.no_load,
        }
    }
}

fn print_banner(config: &Config) {
    println!(
        r#"
LiteKV v{} - Miniature In-Memory Key-Value Server
──────────────────────────────────────────────────
Listening on {}
Snapshot file {}

Use Ctrl+C to shut down.
"#,
        litekv::VERSION,
        config.bind_address(),
        config.snapshot_path.display()
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from(Args::parse());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let server = Server::bind(&config).await.map_err(|e| {
        error!(addr = %config.bind_address(), error = %e, "Failed to bind");
        e
    })?;

    print_banner(&config);

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received, stopping server...");
    };

    server.run(shutdown).await;
    Ok(())
}
