use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use super::LifecycleEngine;
use crate::{
    domain::{CancelActor, PlanTerm, Subscription, SubscriptionStatus},
    error::Result,
    notifications::LifecycleEvent,
};

/// Payment method recorded on subscriptions an admin hands out.
pub const ADMIN_PAYMENT_METHOD: &str = "admin";

#[derive(Debug, Clone, Deserialize)]
pub struct AssignPlanRequest {
    pub user_id: Uuid,
    pub plan_id: Uuid,
    /// A positive number or `"unlimited"`.
    pub duration: String,
    pub unit: String,
}

impl LifecycleEngine {
    /// Puts the user on a plan without going through the gateway.
    ///
    /// Whatever the user had active is canceled first. The Free plan is
    /// never stored, so assigning it only cancels and returns `None`.
    pub async fn assign_plan(&self, request: AssignPlanRequest) -> Result<Option<Subscription>> {
        let term = PlanTerm::parse(&request.duration, &request.unit)?;

        let (user, plan) = tokio::try_join!(
            self.require_user(request.user_id),
            self.require_plan(request.plan_id),
        )?;

        let now = Utc::now();
        let mut tx = self.ledger.begin().await?;

        let mut replaced = Vec::new();
        if let Some(current) = tx.lock_active_for_user(user.id).await? {
            let others = tx.other_active_for_user(user.id, current.id).await?;
            replaced.push(current);
            replaced.extend(others);
        }

        for subscription in replaced.iter_mut() {
            subscription.cancel(CancelActor::Admin, now);
            tx.save_subscription(subscription).await?;
        }

        let assigned = if plan.is_free() {
            None
        } else {
            let subscription = Subscription {
                id: Uuid::new_v4(),
                user_id: user.id,
                plan_id: plan.id,
                start_date: now,
                end_date: term.end_from(now)?,
                status: SubscriptionStatus::Active,
                payment_method: ADMIN_PAYMENT_METHOD.to_string(),
                is_unlimited: term.is_unlimited(),
                admin_assigned: true,
                days_remaining: None,
                canceled_by: None,
                created_at: now,
                updated_at: now,
            };
            tx.insert_subscription(&subscription).await?;
            Some(subscription)
        };

        tx.commit().await?;

        tracing::info!(
            user_id = %user.id,
            plan = %plan.name,
            term = %term.describe(),
            replaced = replaced.len(),
            "Admin assigned plan"
        );

        self.announce_status_changes(replaced, SubscriptionStatus::Canceled).await;
        self.notifier
            .dispatch(LifecycleEvent::AdminAssigned {
                user,
                plan,
                duration_text: term.describe(),
            })
            .await;

        Ok(assigned)
    }
}
