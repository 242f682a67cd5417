use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::{
    domain::{CreatePlanRequest, Plan},
    error::{AppError, Result},
    repository::PlanRepository,
};

#[derive(FromRow)]
struct PlanRow {
    id: String,
    name: String,
    price: String,
    duration_days: i64,
    features: String,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

pub struct SqlitePlanRepository {
    pool: SqlitePool,
}

impl SqlitePlanRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_plan(row: PlanRow) -> Result<Plan> {
        Ok(Plan {
            id: Uuid::parse_str(&row.id).map_err(|e| AppError::Database(e.to_string()))?,
            price: Decimal::from_str(&row.price)
                .map_err(|e| AppError::Database(format!("Invalid plan price {}: {}", row.price, e)))?,
            features: serde_json::from_str(&row.features)
                .map_err(|e| AppError::Database(format!("Invalid plan features: {}", e)))?,
            name: row.name,
            duration_days: row.duration_days,
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
            updated_at: DateTime::from_naive_utc_and_offset(row.updated_at, Utc),
        })
    }
}

#[async_trait]
impl PlanRepository for SqlitePlanRepository {
    async fn create(&self, request: CreatePlanRequest) -> Result<Plan> {
        if request.duration_days < 1 {
            return Err(AppError::Validation("Plan duration must be at least one day".to_string()));
        }
        if request.price.is_sign_negative() {
            return Err(AppError::Validation("Plan price cannot be negative".to_string()));
        }

        let id = Uuid::new_v4();
        let now = Utc::now().naive_utc();
        let features = serde_json::to_string(&request.features)
            .map_err(|e| AppError::Internal(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO plans (id, name, price, duration_days, features, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(&request.name)
        .bind(request.price.to_string())
        .bind(request.duration_days)
        .bind(features)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                AppError::Conflict(format!("Plan '{}' already exists", request.name))
            }
            other => other.into(),
        })?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::Database("Failed to retrieve created plan".to_string()))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Plan>> {
        let row = sqlx::query_as::<_, PlanRow>(
            r#"
            SELECT id, name, price, duration_days, features, created_at, updated_at
            FROM plans
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_plan).transpose()
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Plan>> {
        let row = sqlx::query_as::<_, PlanRow>(
            r#"
            SELECT id, name, price, duration_days, features, created_at, updated_at
            FROM plans
            WHERE name = ? COLLATE NOCASE
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_plan).transpose()
    }

    async fn list(&self) -> Result<Vec<Plan>> {
        let rows = sqlx::query_as::<_, PlanRow>(
            r#"
            SELECT id, name, price, duration_days, features, created_at, updated_at
            FROM plans
            ORDER BY CAST(price AS REAL) ASC, name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_plan).collect()
    }
}
