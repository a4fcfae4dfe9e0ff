//! `church-billing serve`

use std::process::ExitCode;

use church_billing::adapters::http::{app_router, with_middleware, BillingAppState};
use church_billing::adapters::postgres;
use church_billing::app::{build_services, Repositories};
use church_billing::config::AppConfig;

use super::CommandError;

pub async fn run(config: AppConfig) -> Result<ExitCode, CommandError> {
    tracing::info!("Starting church-billing v{}", env!("CARGO_PKG_VERSION"));

    let pool = postgres::connect(&config.database).await?;
    tracing::info!("Database connection established");
    if config.database.run_migrations {
        postgres::run_migrations(&pool).await?;
    }

    let (services, workers) = build_services(&config, Repositories::postgres(pool))?;
    if !services.settings.integration_enabled {
        tracing::warn!("Organization provisioning is disabled");
    }
    if services.settings.status_api_token.is_none() {
        tracing::warn!("Status API token not set; backend endpoints will reject all requests");
    }

    let app = with_middleware(app_router(BillingAppState::new(services)), &config.server);
    let addr = config
        .server
        .socket_addr()
        .map_err(|e| CommandError::Invalid(e.to_string()))?;

    tracing::info!(%addr, environment = ?config.server.environment, "Listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(workers) = workers {
        tracing::info!("Draining task workers");
        workers.shutdown().await;
    }
    tracing::info!("Server stopped");
    Ok(ExitCode::SUCCESS)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
