#![allow(dead_code)]

use std::{
    path::Path,
    sync::{Arc, Mutex},
    time::Duration as StdDuration,
};

use async_trait::async_trait;
use cardly::{
    config::BillingConfig,
    domain::{CreatePlanRequest, CreateUserRequest, Plan, User},
    error::{AppError, Result},
    notifications::{LifecycleEvent, NotificationDispatcher, Notifier},
    payments::{fake::SUCCEEDED_EVENT, FakeGateway, PaymentGateway},
    repository::{PlanRepository, UserRepository},
    service::{
        lifecycle::{CreateIntentRequest, PaymentIntentCreated},
        LifecycleEngine, ServiceContext,
    },
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";

/// Collects every dispatched event.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events().iter().map(|e| e.kind()).collect()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.kinds().into_iter().filter(|k| *k == kind).count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn name(&self) -> &str {
        "recording"
    }

    fn is_enabled(&self) -> bool {
        true
    }

    async fn handle_event(&self, event: &LifecycleEvent) -> Result<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Fails on every event.
pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    fn name(&self) -> &str {
        "failing"
    }

    fn is_enabled(&self) -> bool {
        true
    }

    async fn handle_event(&self, _event: &LifecycleEvent) -> Result<()> {
        Err(AppError::Internal("smtp is down".to_string()))
    }
}

pub struct Harness {
    pub pool: SqlitePool,
    pub gateway: Arc<FakeGateway>,
    pub recorder: Arc<RecordingNotifier>,
    pub context: Arc<ServiceContext>,
}

impl Harness {
    pub fn engine(&self) -> &LifecycleEngine {
        &self.context.lifecycle
    }

    pub async fn user(&self, email: &str) -> anyhow::Result<User> {
        Ok(self
            .context
            .user_repo
            .create(CreateUserRequest {
                email: email.to_string(),
                name: email.split('@').next().unwrap_or(email).to_string(),
                is_admin: false,
            })
            .await?)
    }

    pub async fn admin(&self, email: &str) -> anyhow::Result<User> {
        Ok(self
            .context
            .user_repo
            .create(CreateUserRequest {
                email: email.to_string(),
                name: "Admin".to_string(),
                is_admin: true,
            })
            .await?)
    }

    pub async fn plan(&self, name: &str, price: Decimal, duration_days: i64) -> anyhow::Result<Plan> {
        Ok(self
            .context
            .plan_repo
            .create(CreatePlanRequest {
                name: name.to_string(),
                price,
                duration_days,
                features: vec!["5 vcards".to_string(), "analytics".to_string()],
            })
            .await?)
    }

    pub async fn free_plan(&self) -> anyhow::Result<Plan> {
        Ok(self.engine().free_plan().await?)
    }

    pub async fn buy(&self, user: &User, plan: &Plan, months: u32) -> anyhow::Result<PaymentIntentCreated> {
        Ok(self
            .engine()
            .create_payment_intent(CreateIntentRequest {
                user_id: user.id,
                plan_id: plan.id,
                months,
                payment_method: "card".to_string(),
            })
            .await?)
    }

    pub async fn transaction_id(&self, payment_id: uuid::Uuid) -> anyhow::Result<String> {
        let payment = self
            .context
            .ledger
            .find_payment(payment_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("payment {} missing", payment_id))?;
        Ok(payment.transaction_id)
    }

    /// Buys the plan and completes the payment through the webhook.
    pub async fn buy_and_settle(&self, user: &User, plan: &Plan, months: u32) -> anyhow::Result<PaymentIntentCreated> {
        let created = self.buy(user, plan, months).await?;
        let intent_id = self.transaction_id(created.payment_id).await?;
        self.gateway.set_status(&intent_id, "succeeded");
        let (payload, signature) = self.gateway.signed_event(SUCCEEDED_EVENT, &intent_id);
        self.engine().handle_webhook(&payload, &signature).await?;
        Ok(created)
    }

    /// Moves a subscription's end date, standing in for the passage of time.
    pub async fn set_end_date(&self, subscription_id: uuid::Uuid, end: DateTime<Utc>) -> anyhow::Result<()> {
        sqlx::query("UPDATE subscriptions SET end_date = ? WHERE id = ?")
            .bind(end.naive_utc())
            .bind(subscription_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn subscription_count(&self, user: &User) -> anyhow::Result<usize> {
        Ok(self.context.ledger.subscriptions_for_user(user.id).await?.len())
    }

    pub async fn payment_count(&self, user: &User) -> anyhow::Result<usize> {
        Ok(self.context.ledger.payments_for_user(user.id).await?.len())
    }
}

/// An in-memory database behind a single connection, so every transaction
/// sees the same data and writers serialise on the pool.
pub async fn memory_pool() -> anyhow::Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

/// A database file under `dir` shared by several connections, so
/// transactions really overlap and contend for SQLite's writer lock.
pub async fn file_pool(dir: &Path) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(dir.join("cardly.db"))
        .create_if_missing(true)
        .busy_timeout(StdDuration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

pub async fn harness() -> anyhow::Result<Harness> {
    harness_with(BillingConfig::default()).await
}

pub async fn harness_with(billing: BillingConfig) -> anyhow::Result<Harness> {
    harness_on(memory_pool().await?, billing).await
}

pub async fn harness_on(pool: SqlitePool, billing: BillingConfig) -> anyhow::Result<Harness> {
    let gateway = Arc::new(FakeGateway::new(WEBHOOK_SECRET));
    let recorder = Arc::new(RecordingNotifier::default());

    let dispatcher = Arc::new(NotificationDispatcher::new());
    dispatcher.register(recorder.clone()).await;

    let context = Arc::new(ServiceContext::new(
        pool.clone(),
        gateway.clone() as Arc<dyn PaymentGateway>,
        dispatcher,
        &billing,
    ));

    Ok(Harness {
        pool,
        gateway,
        recorder,
        context,
    })
}
