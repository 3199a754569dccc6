//! Feedback Board Server
//!
//! ## Usage
//!
//! ```bash
//! # Start with defaults
//! feedback-board
//!
//! # Start with custom config
//! feedback-board --config /path/to/config.toml
//!
//! # Keep the database somewhere else
//! feedback-board --storage-dir /srv/feedback --http-port 8080
//! ```

use clap::Parser;
use feedback_board::services::events::spawn_logging_listener;
use feedback_board::{BoardDb, Config, HttpServer, Services};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "feedback-board")]
#[command(about = "Feedback and voting board")]
struct Args {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding feedback.db and config.toml
    #[arg(long, env = "FEEDBACK_STORAGE_DIR")]
    storage_dir: Option<PathBuf>,

    /// HTTP API port
    #[arg(long, env = "FEEDBACK_HTTP_PORT")]
    http_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("feedback_board=info".parse()?),
        )
        .init();

    let args = Args::parse();

    // Load config: explicit path, then the one in the storage dir, then defaults
    let mut config = if let Some(config_path) = &args.config {
        Config::load(config_path)?
    } else {
        let mut defaults = Config::default();
        if let Some(dir) = &args.storage_dir {
            defaults.storage_dir = dir.clone();
        }
        let existing = defaults.config_path();
        if existing.exists() {
            Config::load(&existing)?
        } else {
            defaults
        }
    };

    // Apply CLI overrides
    if let Some(dir) = args.storage_dir {
        config.storage_dir = dir;
    }
    if let Some(port) = args.http_port {
        config.http_port = port;
    }

    info!(
        storage_dir = %config.storage_dir.display(),
        http_port = config.http_port,
        "Starting feedback-board"
    );

    tokio::fs::create_dir_all(&config.storage_dir).await?;

    let config_path = config.config_path();
    if !config_path.exists() {
        config.save(&config_path)?;
        info!(path = %config_path.display(), "Created default config");
    }

    let db = Arc::new(BoardDb::open(&config.db_path())?);
    let services = Arc::new(Services::new(db.clone()));
    let _listener = spawn_logging_listener(services.events.clone());

    let stats = db.stats()?;
    info!(
        feedback = stats.feedback_count,
        voters = stats.voter_count,
        schema_version = stats.schema_version,
        "Database ready"
    );

    let http_addr: SocketAddr = format!("{}:{}", config.bind_address, config.http_port).parse()?;
    let http_server = Arc::new(HttpServer::new(services, config.site.clone(), http_addr));

    info!("HTTP API available at http://{}", http_addr);
    info!("Press Ctrl+C to stop.");

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("Shutting down...");
    };

    tokio::select! {
        result = http_server.run() => {
            if let Err(e) = result {
                error!(error = %e, "HTTP server error");
            }
        }
        _ = shutdown => {}
    }

    if let Ok(stats) = db.stats() {
        info!(
            feedback = stats.feedback_count,
            voters = stats.voter_count,
            "Final board stats"
        );
    }

    Ok(())
}
