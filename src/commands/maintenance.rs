//! `purge-webhooks`

use std::process::ExitCode;

use clap::Args;

use church_billing::application::handlers::billing::{
    PurgeWebhookEventsCommand, PurgeWebhookEventsHandler,
};
use church_billing::config::AppConfig;

use super::{one_shot_services, CommandError};

#[derive(Args)]
pub struct PurgeWebhooksArgs {
    /// Delete processed events received more than this many days ago
    #[arg(long)]
    older_than_days: u32,
}

pub async fn purge_webhooks(
    config: AppConfig,
    args: PurgeWebhooksArgs,
) -> Result<ExitCode, CommandError> {
    let services = one_shot_services(config).await?;
    let removed = PurgeWebhookEventsHandler::new(services.repositories.webhook_events.clone())
        .handle(PurgeWebhookEventsCommand {
            older_than_days: args.older_than_days,
        })
        .await?;
    println!("Deleted {} processed webhook events", removed);
    Ok(ExitCode::SUCCESS)
}
