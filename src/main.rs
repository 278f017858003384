//! Service framework host.
//!
//! Runs a minimal health-check service under the lifecycle orchestrator.
//! Useful as a smoke test for a deployment's configuration: it binds the
//! configured REST address, answers `GET /health` and stops on SIGINT or
//! SIGTERM.
//!
//! ```text
//! service-framework [--config service.toml] [--log-format pretty|json]
//!     → defaults → TOML file → HTTP_SERVER_* / GRPC_SERVER_* / ... env vars
//!     → Orchestrator::run(HealthService)
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use axum::{routing::get, Router};
use clap::Parser;

use service_framework::config::loader;
use service_framework::observability::{self, LogFormat};
use service_framework::{CloudService, Orchestrator};

#[derive(Debug, Parser)]
#[command(name = "service-framework", version, about = "Run a health-check service under the lifecycle orchestrator")]
struct Cli {
    /// Optional TOML configuration file; environment variables override it.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log output format.
    #[arg(long, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

struct HealthService;

impl CloudService for HealthService {
    fn rest(&self) -> Option<Router> {
        Some(Router::new().route("/health", get(|| async { "ok" })))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    observability::init(cli.log_format);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "service-framework starting");

    let config = match loader::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        rest_listen = %config.rest.listen,
        write_timeout = ?config.rest.write_timeout,
        grace_period = ?config.shutdown.grace_period,
        "Configuration loaded"
    );

    match Orchestrator::new(config).run_guarded(HealthService).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Service stopped with an error");
            ExitCode::FAILURE
        }
    }
}
