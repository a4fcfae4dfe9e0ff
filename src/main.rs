//! `church-billing` - HTTP server and operator commands.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use church_billing::config::{AppConfig, ServerConfig};

mod commands;

/// Church directory billing service
#[derive(Parser)]
#[command(name = "church-billing", version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server and background task workers
    Serve,

    /// Check the church directory backend and integration state
    CheckBackend(commands::backend::CheckBackendArgs),

    /// Retry organization creation for unfinished integrations
    RetryIntegrations(commands::backend::RetryIntegrationsArgs),

    /// Integration failure-rate check; exits 1 when alerting
    IntegrationHealth,

    /// Payment health monitor: failed integrations, stale payments, webhook errors
    MonitorPayments,

    /// Delete processed webhook events older than N days
    PurgeWebhooks(commands::maintenance::PurgeWebhooksArgs),
}

fn init_tracing(server: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&server.log_level));
    let registry = tracing_subscriber::registry().with(filter);
    if server.is_production() {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().pretty()).init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config.server);
    if let Err(e) = config.validate() {
        tracing::error!(error = %e, "Invalid configuration");
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Commands::Serve => commands::serve::run(config).await,
        Commands::CheckBackend(args) => commands::backend::check(config, args).await,
        Commands::RetryIntegrations(args) => commands::backend::retry(config, args).await,
        Commands::IntegrationHealth => commands::health::integration(config).await,
        Commands::MonitorPayments => commands::health::payments(config).await,
        Commands::PurgeWebhooks(args) => commands::maintenance::purge_webhooks(config, args).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
