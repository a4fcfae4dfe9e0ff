//! `check-backend` and `retry-integrations`

use std::process::ExitCode;
use std::sync::Arc;

use clap::Args;

use church_billing::application::handlers::provisioning::{
    BulkRetryCommand, BulkRetryHandler, IntegrationHealthHandler,
};
use church_billing::config::AppConfig;
use church_billing::domain::foundation::SubscriptionId;

use super::{one_shot_services, print_json, CommandError};

#[derive(Args)]
pub struct CheckBackendArgs {
    /// Only test connectivity to the backend API
    #[arg(long)]
    test_connection: bool,

    /// Retry failed and pending integrations from the last 24 hours
    #[arg(long)]
    retry_failed: bool,
}

#[derive(Args)]
pub struct RetryIntegrationsArgs {
    /// Retry one subscription instead of scanning
    #[arg(long)]
    subscription_id: Option<String>,

    /// Only consider subscriptions created within this many hours
    #[arg(long, default_value_t = 24)]
    max_age_hours: u32,

    /// List what would be retried without calling the backend
    #[arg(long)]
    dry_run: bool,
}

pub async fn check(config: AppConfig, args: CheckBackendArgs) -> Result<ExitCode, CommandError> {
    let services = one_shot_services(config).await?;

    if args.test_connection {
        return match services.coordinator.test_connection().await {
            Ok(health) => {
                println!("Backend API is reachable");
                print_json(&health);
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => {
                println!("Backend API connection failed: {}", e.message());
                Ok(ExitCode::FAILURE)
            }
        };
    }

    if args.retry_failed {
        let handler = BulkRetryHandler::new(
            services.repositories.subscriptions.clone(),
            Arc::clone(&services.coordinator),
        );
        let result = handler.handle(BulkRetryCommand::default()).await?;
        print_json(&result);
        return Ok(ExitCode::SUCCESS);
    }

    let report = IntegrationHealthHandler::new(services.repositories.subscriptions.clone())
        .handle()
        .await?;
    println!("Integration status for active subscriptions:");
    println!("  total:       {}", report.total);
    println!("  completed:   {}", report.completed);
    println!("  failed:      {}", report.failed);
    println!("  pending:     {}", report.pending);
    println!("  not started: {}", report.not_started);
    Ok(ExitCode::SUCCESS)
}

pub async fn retry(config: AppConfig, args: RetryIntegrationsArgs) -> Result<ExitCode, CommandError> {
    let subscription_id = args
        .subscription_id
        .as_deref()
        .map(str::parse::<SubscriptionId>)
        .transpose()
        .map_err(|e| CommandError::Invalid(format!("invalid --subscription-id: {}", e)))?;

    let services = one_shot_services(config).await?;
    let handler = BulkRetryHandler::new(
        services.repositories.subscriptions.clone(),
        Arc::clone(&services.coordinator),
    );
    let result = handler
        .handle(BulkRetryCommand {
            subscription_id,
            max_age_hours: args.max_age_hours,
            dry_run: args.dry_run,
        })
        .await?;

    print_json(&result);
    if result.failed > 0 {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
