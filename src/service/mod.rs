pub mod lifecycle;

use std::sync::Arc;
use sqlx::SqlitePool;
use crate::config::BillingConfig;
use crate::notifications::NotificationDispatcher;
use crate::payments::PaymentGateway;
use crate::repository::*;

pub use lifecycle::{EngineOptions, LifecycleEngine};

pub struct ServiceContext {
    pub user_repo: Arc<dyn UserRepository>,
    pub plan_repo: Arc<dyn PlanRepository>,
    pub ledger: SqliteLedger,
    pub notifier: Arc<NotificationDispatcher>,
    pub lifecycle: Arc<LifecycleEngine>,
}

impl ServiceContext {
    pub fn new(
        db_pool: SqlitePool,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<NotificationDispatcher>,
        billing: &BillingConfig,
    ) -> Self {
        let user_repo: Arc<dyn UserRepository> = Arc::new(SqliteUserRepository::new(db_pool.clone()));
        let plan_repo: Arc<dyn PlanRepository> = Arc::new(SqlitePlanRepository::new(db_pool.clone()));
        let ledger = SqliteLedger::new(db_pool);

        let lifecycle = Arc::new(LifecycleEngine::new(
            ledger.clone(),
            user_repo.clone(),
            plan_repo.clone(),
            gateway,
            notifier.clone(),
            EngineOptions::from(billing),
        ));

        Self {
            user_repo,
            plan_repo,
            ledger,
            notifier,
            lifecycle,
        }
    }
}
