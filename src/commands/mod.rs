//! Subcommand implementations.

pub mod backend;
pub mod health;
pub mod maintenance;
pub mod serve;

use church_billing::adapters::postgres;
use church_billing::app::{build_services, Repositories, Services, WiringError};
use church_billing::config::{AppConfig, DispatchMode};
use church_billing::domain::foundation::DomainError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("database: {0}")]
    Database(#[from] DomainError),

    #[error(transparent)]
    Wiring(#[from] WiringError),

    #[error("server: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Invalid(String),
}

/// Services for a one-shot operator command. Provisioning runs inline so
/// nothing is left queued when the process exits.
async fn one_shot_services(mut config: AppConfig) -> Result<Services, CommandError> {
    config.tasks.mode = DispatchMode::Inline;
    let pool = postgres::connect(&config.database).await?;
    let (services, _) = build_services(&config, Repositories::postgres(pool))?;
    Ok(services)
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => tracing::error!(error = %e, "Could not render output"),
    }
}
