//! Enrollment daemon
//!
//! Runs the enrollment orchestrator behind a REST API:
//! - event triggers for enrollment, completion and progress
//! - chain status, history, stats and dependency introspection
//! - manual re-run of failed steps

use clap::Parser;
use enrollment_daemon::{DaemonConfig, DaemonError, DaemonResult, Server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Enrollment daemon CLI
#[derive(Parser)]
#[command(name = "enrollmentd")]
#[command(about = "Enrollment integration orchestrator daemon", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "ENROLLMENT_CONFIG")]
    config: Option<String>,

    /// Listen address (overrides the config file)
    #[arg(short, long, env = "ENROLLMENT_LISTEN_ADDR")]
    listen: Option<String>,

    /// Log level (overrides the config file)
    #[arg(long, env = "ENROLLMENT_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "ENROLLMENT_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = DaemonConfig::load(cli.config.as_deref())
        .map_err(|e| DaemonError::Config(e.to_string()))?;

    // Override with CLI args
    if let Some(listen) = &cli.listen {
        config.server.listen_addr = listen
            .parse()
            .map_err(|e| DaemonError::Config(format!("Invalid listen address: {}", e)))?;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.logging.json |= cli.json;

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    println!(
        r#"
  Enrollment Orchestrator
  Version: {}
  Listening: {}
  History capacity: {}
"#,
        env!("CARGO_PKG_VERSION"),
        config.server.listen_addr,
        config.orchestrator.history_capacity
    );

    let server = Server::new(config)?;
    server.run().await
}
