use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::LifecycleEngine;
use crate::{
    domain::{CancelActor, SubscriptionStatus},
    error::{AppError, Result},
};

#[derive(Debug, Clone, Serialize)]
pub struct Cancellation {
    pub subscription_id: Uuid,
    pub canceled_at: DateTime<Utc>,
    pub days_remaining: i64,
    pub canceled_by: CancelActor,
}

impl LifecycleEngine {
    /// Ends an active subscription now and records the whole days it had
    /// left. Anything other than `active` is a conflict.
    pub async fn cancel_subscription(&self, subscription_id: Uuid, by: CancelActor) -> Result<Cancellation> {
        let now = Utc::now();
        let mut tx = self.ledger.begin().await?;

        let mut subscription = tx
            .lock_subscription(subscription_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Subscription not found".to_string()))?;

        if !subscription.is_active() {
            return Err(AppError::Conflict(format!(
                "Only active subscriptions can be canceled (status: {})",
                subscription.status
            )));
        }

        let days_remaining = subscription.cancel(by, now);
        tx.save_subscription(&subscription).await?;
        tx.commit().await?;

        tracing::info!(
            subscription_id = %subscription.id,
            user_id = %subscription.user_id,
            canceled_by = by.as_str(),
            days_remaining,
            "Subscription canceled"
        );

        self.announce_status_changes(vec![subscription], SubscriptionStatus::Canceled)
            .await;

        Ok(Cancellation {
            subscription_id,
            canceled_at: now,
            days_remaining,
            canceled_by: by,
        })
    }
}
