use chrono::{Duration, Utc};

use super::LifecycleEngine;
use crate::{
    domain::{days_remaining, SubscriptionStatus},
    error::Result,
    notifications::LifecycleEvent,
};

impl LifecycleEngine {
    /// Expires every active subscription whose end date has passed and
    /// announces each one. Returns how many rows changed; a second run
    /// right after returns zero.
    pub async fn sweep_expired(&self) -> Result<usize> {
        let now = Utc::now();
        let mut tx = self.ledger.begin().await?;
        let expired = tx.expire_due(now).await?;
        tx.commit().await?;

        let count = expired.len();
        if count > 0 {
            tracing::info!(count, "Expired subscriptions");
        }

        self.announce_status_changes(expired, SubscriptionStatus::Expired).await;

        Ok(count)
    }

    /// Warns users whose subscription ends within the one-day window
    /// `expiry_warning_days` out. Run once a day, each subscription is
    /// warned once.
    pub async fn warn_expiring(&self) -> Result<usize> {
        let days = self.options.expiry_warning_days.min(3650);
        if days <= 0 {
            return Ok(0);
        }

        let now = Utc::now();
        let to = now + Duration::days(days);
        let from = to - Duration::days(1);

        let expiring = self.ledger.active_ending_between(from, to).await?;
        let count = expiring.len();

        for subscription in expiring {
            let days_left = days_remaining(subscription.end_date, now);
            self.notifier
                .dispatch(LifecycleEvent::ExpiryWarning {
                    subscription,
                    days_left,
                })
                .await;
        }

        if count > 0 {
            tracing::info!(count, "Sent expiry warnings");
        }

        Ok(count)
    }
}
