use async_trait::async_trait;

use crate::{
    error::Result,
    notifications::{LifecycleEvent, Notifier},
};

/// Writes every lifecycle event to the audit log target.
pub struct AuditNotifier;

#[async_trait]
impl Notifier for AuditNotifier {
    fn name(&self) -> &str {
        "audit"
    }

    fn is_enabled(&self) -> bool {
        true
    }

    async fn handle_event(&self, event: &LifecycleEvent) -> Result<()> {
        match event {
            LifecycleEvent::NewSubscription { user_id, plan_name, start, end } => {
                tracing::info!(target: "cardly::audit", %user_id, plan = %plan_name, %start, %end, "New subscription");
            }
            LifecycleEvent::Renewal { user_id, plan_name, start, end, amount } => {
                tracing::info!(target: "cardly::audit", %user_id, plan = %plan_name, %start, %end, %amount, "Subscription renewed");
            }
            LifecycleEvent::StatusChanged { subscription, new_status } => {
                tracing::info!(
                    target: "cardly::audit",
                    user_id = %subscription.user_id,
                    subscription_id = %subscription.id,
                    status = %new_status,
                    days_remaining = ?subscription.days_remaining,
                    "Subscription status changed"
                );
            }
            LifecycleEvent::AdminAssigned { user, plan, duration_text } => {
                tracing::info!(target: "cardly::audit", user_id = %user.id, plan = %plan.name, duration = %duration_text, "Plan assigned by admin");
            }
            LifecycleEvent::ExpiryWarning { subscription, days_left } => {
                tracing::info!(target: "cardly::audit", user_id = %subscription.user_id, subscription_id = %subscription.id, days_left, "Subscription expiring soon");
            }
            LifecycleEvent::PaymentFailed { user_id, payment_id, amount, currency } => {
                tracing::warn!(target: "cardly::audit", %user_id, %payment_id, %amount, %currency, "Payment failed");
            }
        }
        Ok(())
    }
}
