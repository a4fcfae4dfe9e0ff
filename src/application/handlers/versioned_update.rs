//! Read-modify-write of a subscription under optimistic concurrency.
//!
//! The repository rejects an update whose `version` is stale. The loop here
//! re-reads and re-applies the same closure, so idempotency checks inside
//! the closure always run against the latest stored state.

use crate::domain::billing::Subscription;
use crate::domain::foundation::DomainError;
use crate::ports::{SubscriptionLookup, SubscriptionRepository};

/// Attempts before a lost version race is surfaced to the caller.
pub(crate) const MAX_VERSION_ATTEMPTS: usize = 3;

/// What the closure decided to do with the loaded subscription.
pub(crate) enum Change<T> {
    /// Persist the mutated subscription, then return `T`.
    Save(T),
    /// Nothing to write; return `T`.
    Keep(T),
}

/// Loads the subscription matching `lookup`, runs `apply` on it and saves
/// the result when asked to. Returns `None` when nothing matches.
pub(crate) async fn modify_subscription<T, F>(
    repository: &dyn SubscriptionRepository,
    lookup: &SubscriptionLookup,
    mut apply: F,
) -> Result<Option<(Subscription, T)>, DomainError>
where
    F: FnMut(&mut Subscription) -> Change<T>,
{
    let mut attempt = 1;
    loop {
        let Some(mut subscription) = repository.find(lookup).await? else {
            return Ok(None);
        };

        let value = match apply(&mut subscription) {
            Change::Keep(value) => return Ok(Some((subscription, value))),
            Change::Save(value) => value,
        };

        match repository.update(&mut subscription).await {
            Ok(()) => return Ok(Some((subscription, value))),
            Err(e) if e.is_concurrent_modification() && attempt < MAX_VERSION_ATTEMPTS => {
                tracing::debug!(
                    subscription_id = %subscription.id,
                    attempt,
                    "Lost version race, re-reading subscription"
                );
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
