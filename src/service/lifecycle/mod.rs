//! Subscription and payment lifecycle.
//!
//! Every state change runs inside one [`LedgerTx`] whose first statement
//! locks the rows it is about to change, so the client confirm path, the
//! webhook path, cancellation and the expiration sweep serialise against
//! each other. Notifications are dispatched strictly after commit and their
//! failures never reach the caller.

mod assignment;
mod cancellation;
mod checkout;
mod sweep;
mod webhook;

pub use assignment::AssignPlanRequest;
pub use cancellation::Cancellation;
pub use checkout::{ConfirmedPayment, CreateIntentRequest, PaymentIntentCreated};
pub use webhook::WebhookOutcome;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    config::BillingConfig,
    domain::{
        CancelActor, Payment, Plan, PlanFeatures, Subscription, SubscriptionStatus, User,
        FREE_PLAN_NAME,
    },
    error::{AppError, Result},
    notifications::{LifecycleEvent, NotificationDispatcher},
    payments::PaymentGateway,
    repository::{LedgerTx, PlanRepository, SqliteLedger, UserRepository},
};

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub currency: String,
    /// Upper bound on every outbound gateway call.
    pub gateway_timeout: Duration,
    pub expiry_warning_days: i64,
    pub notify_payment_failures: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from(&BillingConfig::default())
    }
}

impl From<&BillingConfig> for EngineOptions {
    fn from(config: &BillingConfig) -> Self {
        Self {
            currency: config.currency.to_lowercase(),
            gateway_timeout: Duration::from_secs(config.gateway_timeout_secs),
            expiry_warning_days: config.expiry_warning_days,
            notify_payment_failures: config.notify_payment_failures,
        }
    }
}

/// The user's effective plan. `subscription` is `None` on the Free plan.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentPlan {
    pub subscription: Option<Subscription>,
    pub plan: Plan,
    pub features: PlanFeatures,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub subscription: Subscription,
    pub plan_name: Option<String>,
    pub payments: Vec<Payment>,
}

pub struct LifecycleEngine {
    ledger: SqliteLedger,
    users: Arc<dyn UserRepository>,
    plans: Arc<dyn PlanRepository>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<NotificationDispatcher>,
    options: EngineOptions,
}

impl LifecycleEngine {
    pub fn new(
        ledger: SqliteLedger,
        users: Arc<dyn UserRepository>,
        plans: Arc<dyn PlanRepository>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<NotificationDispatcher>,
        options: EngineOptions,
    ) -> Self {
        Self {
            ledger,
            users,
            plans,
            gateway,
            notifier,
            options,
        }
    }

    /// Effective plan for the user, falling back to Free when no active
    /// subscription exists. Runs a sweep first so an overdue subscription is
    /// never reported as current.
    pub async fn current_subscription(&self, user_id: Uuid) -> Result<CurrentPlan> {
        self.require_user(user_id).await?;

        if let Err(e) = self.sweep_expired().await {
            tracing::warn!("Opportunistic expiration sweep failed: {:?}", e);
        }

        let subscription = self.ledger.find_active_for_user(user_id).await?;
        let plan = match &subscription {
            Some(s) => self.require_plan(s.plan_id).await?,
            None => self.free_plan().await?,
        };

        Ok(CurrentPlan {
            features: plan.entitlements(),
            subscription,
            plan,
        })
    }

    /// All of the user's subscriptions, newest first, each with its payments.
    pub async fn subscription_history(&self, user_id: Uuid) -> Result<Vec<HistoryEntry>> {
        self.require_user(user_id).await?;

        let (subscriptions, payments) = tokio::try_join!(
            self.ledger.subscriptions_for_user(user_id),
            self.ledger.payments_for_user(user_id),
        )?;

        let mut by_subscription: HashMap<Uuid, Vec<Payment>> = HashMap::new();
        for payment in payments {
            by_subscription.entry(payment.subscription_id).or_default().push(payment);
        }

        let mut plan_names: HashMap<Uuid, Option<String>> = HashMap::new();
        let mut history = Vec::with_capacity(subscriptions.len());
        for subscription in subscriptions {
            if !plan_names.contains_key(&subscription.plan_id) {
                let name = self.plans.find_by_id(subscription.plan_id).await?.map(|p| p.name);
                plan_names.insert(subscription.plan_id, name);
            }

            history.push(HistoryEntry {
                plan_name: plan_names.get(&subscription.plan_id).cloned().flatten(),
                payments: by_subscription.remove(&subscription.id).unwrap_or_default(),
                subscription,
            });
        }

        Ok(history)
    }

    pub async fn free_plan(&self) -> Result<Plan> {
        self.plans
            .find_by_name(FREE_PLAN_NAME)
            .await?
            .ok_or_else(|| AppError::NotFound("Free plan is not configured".to_string()))
    }

    async fn require_user(&self, id: Uuid) -> Result<User> {
        self.users
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    async fn require_plan(&self, id: Uuid) -> Result<Plan> {
        self.plans
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Plan not found".to_string()))
    }

    /// Runs a gateway call under the configured timeout.
    async fn gateway_call<T, F>(&self, operation: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.options.gateway_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    gateway = self.gateway.name(),
                    "Gateway call {} timed out after {:?}",
                    operation,
                    self.options.gateway_timeout
                );
                Err(AppError::Gateway(format!(
                    "{} timed out after {}s",
                    operation,
                    self.options.gateway_timeout.as_secs()
                )))
            }
        }
    }

    /// Moves a pending subscription to active. Any other active subscription
    /// of the same user is canceled in the same transaction and returned so
    /// the caller can announce it after commit.
    async fn activate(
        tx: &mut LedgerTx,
        subscription: &mut Subscription,
        now: DateTime<Utc>,
    ) -> Result<Vec<Subscription>> {
        let mut superseded = tx
            .other_active_for_user(subscription.user_id, subscription.id)
            .await?;

        for other in superseded.iter_mut() {
            other.cancel(CancelActor::System, now);
            tx.save_subscription(other).await?;
            tracing::info!(
                subscription_id = %other.id,
                replaced_by = %subscription.id,
                "Superseded active subscription"
            );
        }

        subscription.status = SubscriptionStatus::Active;
        subscription.updated_at = now;
        tx.save_subscription(subscription).await?;

        Ok(superseded)
    }

    async fn announce_status_changes(&self, subscriptions: Vec<Subscription>, new_status: SubscriptionStatus) {
        for subscription in subscriptions {
            self.notifier
                .dispatch(LifecycleEvent::StatusChanged {
                    subscription,
                    new_status,
                })
                .await;
        }
    }

    /// New-subscription or renewal notice for a payment that just activated
    /// its subscription.
    async fn announce_activation(&self, payment: &Payment, subscription: &Subscription, is_renewal: bool) {
        let plan_name = match self.plans.find_by_id(subscription.plan_id).await {
            Ok(Some(plan)) => plan.name,
            Ok(None) => {
                tracing::error!(plan_id = %subscription.plan_id, "Plan vanished before activation notice");
                return;
            }
            Err(e) => {
                tracing::error!("Failed to load plan for activation notice: {:?}", e);
                return;
            }
        };

        let event = if is_renewal {
            LifecycleEvent::Renewal {
                user_id: subscription.user_id,
                plan_name,
                start: subscription.start_date,
                end: subscription.end_date,
                amount: payment.amount,
            }
        } else {
            LifecycleEvent::NewSubscription {
                user_id: subscription.user_id,
                plan_name,
                start: subscription.start_date,
                end: subscription.end_date,
            }
        };

        self.notifier.dispatch(event).await;
    }
}
