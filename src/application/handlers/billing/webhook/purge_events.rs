//! PurgeWebhookEventsHandler - trims the inbound event log.
//!
//! Only processed rows go. Failed or unfinished events stay so they can still
//! be inspected and redelivered.

use std::sync::Arc;

use crate::domain::foundation::{DomainError, Timestamp};
use crate::ports::WebhookEventRepository;

#[derive(Debug, Clone, Copy)]
pub struct PurgeWebhookEventsCommand {
    pub older_than_days: u32,
}

pub struct PurgeWebhookEventsHandler {
    events: Arc<dyn WebhookEventRepository>,
}

impl PurgeWebhookEventsHandler {
    pub fn new(events: Arc<dyn WebhookEventRepository>) -> Self {
        Self { events }
    }

    /// Returns the number of rows deleted.
    pub async fn handle(&self, cmd: PurgeWebhookEventsCommand) -> Result<u64, DomainError> {
        if cmd.older_than_days == 0 {
            return Err(DomainError::validation(
                "older_than_days",
                "must be at least 1 day",
            ));
        }
        let cutoff = Timestamp::now().minus_days(i64::from(cmd.older_than_days));
        let removed = self.events.purge_processed_before(cutoff).await?;
        tracing::info!(removed, older_than_days = cmd.older_than_days, "Purged webhook events");
        Ok(removed)
    }
}
