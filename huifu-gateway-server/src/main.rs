//! Huifu Gateway Server - HTTP front end for the tenant registry
//!
//! Serves tenant registration, revocation and listing plus the named merchant
//! operations as a JSON API. Tenant credentials live in memory only and are
//! gone when the process exits.
//!
//! # Configuration
//!
//! - `--config <path>` or `HUIFU_GATEWAY_CONFIG`: TOML configuration file (optional)
//! - `PORT`: overrides the listen port
//! - `LOG_FORMAT`: `json` or `pretty` (default: `pretty`)
//! - `RUST_LOG`: log level filter (default: `info`)

#![allow(
    clippy::multiple_crate_versions,
    reason = "transitive dependencies from axum, josekit and reqwest"
)]

mod observability;
mod routes;

use std::{error::Error, path::PathBuf, process::ExitCode, sync::Arc};

use clap::Parser;
use huifu_gateway::{ClientFactory, GatewayConfig, TenantRegistry, config::CONFIG_PATH_ENV};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::{
    observability::{LogFormat, init_observability},
    routes::{AppState, router},
};

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "huifu-gateway-server", version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = CONFIG_PATH_ENV)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = init_observability(LogFormat::from_env()) {
        eprintln!("failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "server terminated");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn Error + Send + Sync>> {
    let mut config = match &cli.config {
        Some(path) => {
            info!(path = %path.display(), "loading configuration");
            GatewayConfig::from_file(path)?
        }
        None => GatewayConfig::default(),
    };
    config.apply_env_overrides()?;

    if !config.provider.enabled {
        warn!("provider backend disabled, all tenants will be served by the simulated backend");
    }

    let registry = Arc::new(TenantRegistry::new(ClientFactory::new(&config)?));
    let app = router(AppState::new(Arc::clone(&registry), config.provider.enabled));

    let address = config.server.bind_address();
    let listener = TcpListener::bind(&address).await?;
    info!(%address, version = env!("CARGO_PKG_VERSION"), "huifu gateway listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    // drop staged credential files before exit
    let tenants = registry.len().await;
    drop(registry);
    info!(tenants, "server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use std::ffi::OsStr;

    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_config_flag() {
        let cli =
            Cli::try_parse_from(["huifu-gateway-server", "--config", "gateway.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("gateway.toml")));
    }

    #[test]
    fn test_config_path_env_binding() {
        let command = Cli::command();
        let arg = command.get_arguments().find(|a| a.get_id() == "config").unwrap();
        assert_eq!(arg.get_env(), Some(OsStr::new(CONFIG_PATH_ENV)));
    }
}
