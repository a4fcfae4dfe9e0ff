//! `integration-health` and `monitor-payments`

use std::process::ExitCode;

use church_billing::application::handlers::provisioning::{
    IntegrationHealthHandler, PaymentMonitorHandler,
};
use church_billing::config::AppConfig;

use super::{one_shot_services, print_json, CommandError};

pub async fn integration(config: AppConfig) -> Result<ExitCode, CommandError> {
    let services = one_shot_services(config).await?;
    let report = IntegrationHealthHandler::new(services.repositories.subscriptions.clone())
        .handle()
        .await?;

    print_json(&report);
    if report.is_healthy() {
        Ok(ExitCode::SUCCESS)
    } else {
        for alert in &report.alerts {
            tracing::error!(alert = %alert, "Integration health alert");
        }
        Ok(ExitCode::FAILURE)
    }
}

pub async fn payments(config: AppConfig) -> Result<ExitCode, CommandError> {
    let services = one_shot_services(config).await?;
    let report = PaymentMonitorHandler::new(
        services.repositories.subscriptions.clone(),
        services.repositories.webhook_events.clone(),
    )
    .handle()
    .await?;

    if report.is_healthy() {
        println!("No payment alerts");
    } else {
        for alert in &report.alerts {
            tracing::error!(alert = %alert, "Payment health alert");
            println!("ALERT: {}", alert);
        }
    }
    Ok(ExitCode::SUCCESS)
}
