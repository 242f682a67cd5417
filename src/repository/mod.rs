use async_trait::async_trait;
use uuid::Uuid;
use crate::domain::*;
use crate::error::Result;

pub mod ledger;
pub mod plan_repository;
pub mod user_repository;

pub use ledger::{LedgerTx, SqliteLedger};
pub use plan_repository::SqlitePlanRepository;
pub use user_repository::SqliteUserRepository;

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: CreateUserRequest) -> Result<User>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;
}

#[async_trait]
pub trait PlanRepository: Send + Sync {
    async fn create(&self, plan: CreatePlanRequest) -> Result<Plan>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Plan>>;
    async fn find_by_name(&self, name: &str) -> Result<Option<Plan>>;
    async fn list(&self) -> Result<Vec<Plan>>;
}
