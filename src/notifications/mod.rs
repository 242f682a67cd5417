use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{Plan, Subscription, SubscriptionStatus, User};
use crate::error::Result;

pub mod email;
pub mod audit;

pub use email::EmailNotifier;
pub use audit::AuditNotifier;

/// Billing side effects announced after a state change has been committed.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
    NewSubscription {
        user_id: Uuid,
        plan_name: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    Renewal {
        user_id: Uuid,
        plan_name: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        amount: Decimal,
    },
    StatusChanged {
        subscription: Subscription,
        new_status: SubscriptionStatus,
    },
    AdminAssigned {
        user: User,
        plan: Plan,
        duration_text: String,
    },
    ExpiryWarning {
        subscription: Subscription,
        days_left: i64,
    },
    PaymentFailed {
        user_id: Uuid,
        payment_id: Uuid,
        amount: Decimal,
        currency: String,
    },
}

impl LifecycleEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            LifecycleEvent::NewSubscription { .. } => "new_subscription",
            LifecycleEvent::Renewal { .. } => "renewal",
            LifecycleEvent::StatusChanged { .. } => "status_changed",
            LifecycleEvent::AdminAssigned { .. } => "admin_assigned",
            LifecycleEvent::ExpiryWarning { .. } => "expiry_warning",
            LifecycleEvent::PaymentFailed { .. } => "payment_failed",
        }
    }

    pub fn user_id(&self) -> Uuid {
        match self {
            LifecycleEvent::NewSubscription { user_id, .. }
            | LifecycleEvent::Renewal { user_id, .. }
            | LifecycleEvent::PaymentFailed { user_id, .. } => *user_id,
            LifecycleEvent::StatusChanged { subscription, .. }
            | LifecycleEvent::ExpiryWarning { subscription, .. } => subscription.user_id,
            LifecycleEvent::AdminAssigned { user, .. } => user.id,
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;
    fn is_enabled(&self) -> bool;
    async fn handle_event(&self, event: &LifecycleEvent) -> Result<()>;
}

/// Fans lifecycle events out to every registered notifier. Delivery is best
/// effort: a failing notifier is logged and never reaches the caller.
pub struct NotificationDispatcher {
    notifiers: RwLock<Vec<Arc<dyn Notifier>>>,
}

impl NotificationDispatcher {
    pub fn new() -> Self {
        Self {
            notifiers: RwLock::new(Vec::new()),
        }
    }

    pub async fn register(&self, notifier: Arc<dyn Notifier>) {
        if notifier.is_enabled() {
            tracing::info!("Registered notifier: {}", notifier.name());
            self.notifiers.write().await.push(notifier);
        }
    }

    pub async fn dispatch(&self, event: LifecycleEvent) {
        let notifiers = self.notifiers.read().await;

        for notifier in notifiers.iter() {
            if !notifier.is_enabled() {
                continue;
            }

            match notifier.handle_event(&event).await {
                Ok(_) => {
                    tracing::debug!(
                        "Notifier {} handled {} event",
                        notifier.name(),
                        event.kind()
                    );
                }
                Err(e) => {
                    tracing::error!(
                        "Notifier {} failed to handle {} event for user {}: {:?}",
                        notifier.name(),
                        event.kind(),
                        event.user_id(),
                        e
                    );
                }
            }
        }
    }
}

impl Default for NotificationDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
