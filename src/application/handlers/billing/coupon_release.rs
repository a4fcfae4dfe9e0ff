//! Hands back the coupon use reserved at checkout once a purchase ends
//! unpaid.
//!
//! The `coupon_released` flag is claimed through the versioned update before
//! the counter moves, so the customer cancel and the expiry webhook cannot
//! both release. A failed release clears the flag again and a redelivered
//! event repeats it.

use crate::application::handlers::versioned_update::{modify_subscription, Change};
use crate::domain::foundation::{DomainError, SubscriptionId};
use crate::ports::{CouponRepository, SubscriptionLookup, SubscriptionRepository};

/// Returns true when this call released a use.
pub(crate) async fn release_owed_coupon(
    subscriptions: &dyn SubscriptionRepository,
    coupons: &dyn CouponRepository,
    id: SubscriptionId,
) -> Result<bool, DomainError> {
    let lookup = SubscriptionLookup::Id(id);
    let claimed = modify_subscription(subscriptions, &lookup, |sub| {
        if !sub.owes_coupon_release() {
            return Change::Keep(None);
        }
        sub.coupon_released = true;
        Change::Save(sub.coupon_id)
    })
    .await?;

    let Some((_, Some(coupon_id))) = claimed else {
        return Ok(false);
    };

    if let Err(e) = coupons.release_use(&coupon_id).await {
        let reverted = modify_subscription(subscriptions, &lookup, |sub| {
            sub.coupon_released = false;
            Change::Save(())
        })
        .await;
        if let Err(revert) = reverted {
            tracing::error!(
                subscription_id = %id,
                coupon_id = %coupon_id,
                error = %revert,
                "Coupon release failed and could not be rescheduled"
            );
        }
        return Err(e);
    }

    tracing::info!(subscription_id = %id, coupon_id = %coupon_id, "Coupon use released");
    Ok(true)
}
