use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::{
    domain::{CancelActor, Payment, PaymentStatus, Subscription, SubscriptionStatus},
    error::{AppError, Result},
};

#[derive(FromRow)]
struct SubscriptionRow {
    id: String,
    user_id: String,
    plan_id: String,
    start_date: NaiveDateTime,
    end_date: NaiveDateTime,
    status: String,
    payment_method: String,
    is_unlimited: i32,
    admin_assigned: i32,
    days_remaining: Option<i64>,
    canceled_by: Option<String>,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

#[derive(FromRow)]
struct PaymentRow {
    id: String,
    transaction_id: String,
    amount: String,
    currency: String,
    status: String,
    gateway_response: Option<String>,
    user_id: String,
    subscription_id: String,
    created_at: NaiveDateTime,
    updated_at: NaiveDateTime,
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| AppError::Database(e.to_string()))
}

fn utc(dt: NaiveDateTime) -> DateTime<Utc> {
    DateTime::from_naive_utc_and_offset(dt, Utc)
}

fn parse_subscription_status(s: &str) -> Result<SubscriptionStatus> {
    match s {
        "pending" => Ok(SubscriptionStatus::Pending),
        "active" => Ok(SubscriptionStatus::Active),
        "canceled" => Ok(SubscriptionStatus::Canceled),
        "expired" => Ok(SubscriptionStatus::Expired),
        "failed" => Ok(SubscriptionStatus::Failed),
        _ => Err(AppError::Database(format!("Invalid subscription status: {}", s))),
    }
}

fn parse_cancel_actor(s: &str) -> Result<CancelActor> {
    match s {
        "user" => Ok(CancelActor::User),
        "admin" => Ok(CancelActor::Admin),
        "system" => Ok(CancelActor::System),
        _ => Err(AppError::Database(format!("Invalid cancel actor: {}", s))),
    }
}

fn parse_payment_status(s: &str) -> Result<PaymentStatus> {
    match s {
        "pending" => Ok(PaymentStatus::Pending),
        "completed" => Ok(PaymentStatus::Completed),
        "failed" => Ok(PaymentStatus::Failed),
        "refunded" => Ok(PaymentStatus::Refunded),
        _ => Err(AppError::Database(format!("Invalid payment status: {}", s))),
    }
}

fn row_to_subscription(row: SubscriptionRow) -> Result<Subscription> {
    Ok(Subscription {
        id: parse_uuid(&row.id)?,
        user_id: parse_uuid(&row.user_id)?,
        plan_id: parse_uuid(&row.plan_id)?,
        start_date: utc(row.start_date),
        end_date: utc(row.end_date),
        status: parse_subscription_status(&row.status)?,
        payment_method: row.payment_method,
        is_unlimited: row.is_unlimited != 0,
        admin_assigned: row.admin_assigned != 0,
        days_remaining: row.days_remaining,
        canceled_by: row.canceled_by.as_deref().map(parse_cancel_actor).transpose()?,
        created_at: utc(row.created_at),
        updated_at: utc(row.updated_at),
    })
}

fn row_to_payment(row: PaymentRow) -> Result<Payment> {
    let gateway_response = row
        .gateway_response
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(|e| AppError::Database(format!("Invalid gateway response: {}", e)))?;

    Ok(Payment {
        id: parse_uuid(&row.id)?,
        transaction_id: row.transaction_id,
        amount: Decimal::from_str(&row.amount)
            .map_err(|e| AppError::Database(format!("Invalid amount {}: {}", row.amount, e)))?,
        currency: row.currency,
        status: parse_payment_status(&row.status)?,
        gateway_response,
        user_id: parse_uuid(&row.user_id)?,
        subscription_id: parse_uuid(&row.subscription_id)?,
        created_at: utc(row.created_at),
        updated_at: utc(row.updated_at),
    })
}

async fn fetch_subscription<'c, E>(executor: E, id: Uuid) -> Result<Option<Subscription>>
where
    E: sqlx::Executor<'c, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, SubscriptionRow>(
        r#"
        SELECT id, user_id, plan_id, start_date, end_date, status,
               payment_method, is_unlimited, admin_assigned, days_remaining,
               canceled_by, created_at, updated_at
        FROM subscriptions
        WHERE id = ?
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(executor)
    .await?;

    row.map(row_to_subscription).transpose()
}

async fn fetch_active_for_user<'c, E>(executor: E, user_id: Uuid) -> Result<Option<Subscription>>
where
    E: sqlx::Executor<'c, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, SubscriptionRow>(
        r#"
        SELECT id, user_id, plan_id, start_date, end_date, status,
               payment_method, is_unlimited, admin_assigned, days_remaining,
               canceled_by, created_at, updated_at
        FROM subscriptions
        WHERE user_id = ? AND status = 'active'
        ORDER BY end_date DESC
        LIMIT 1
        "#,
    )
    .bind(user_id.to_string())
    .fetch_optional(executor)
    .await?;

    row.map(row_to_subscription).transpose()
}

async fn fetch_payment<'c, E>(executor: E, id: Uuid) -> Result<Option<Payment>>
where
    E: sqlx::Executor<'c, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, PaymentRow>(
        r#"
        SELECT id, transaction_id, amount, currency, status, gateway_response,
               user_id, subscription_id, created_at, updated_at
        FROM payments
        WHERE id = ?
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(executor)
    .await?;

    row.map(row_to_payment).transpose()
}

async fn fetch_payment_by_transaction<'c, E>(
    executor: E,
    transaction_id: &str,
) -> Result<Option<Payment>>
where
    E: sqlx::Executor<'c, Database = Sqlite>,
{
    let row = sqlx::query_as::<_, PaymentRow>(
        r#"
        SELECT id, transaction_id, amount, currency, status, gateway_response,
               user_id, subscription_id, created_at, updated_at
        FROM payments
        WHERE transaction_id = ?
        "#,
    )
    .bind(transaction_id)
    .fetch_optional(executor)
    .await?;

    row.map(row_to_payment).transpose()
}

/// Durable store for subscriptions and payments.
///
/// Reads on the store itself take no locks. Every mutation goes through a
/// [`LedgerTx`].
#[derive(Clone)]
pub struct SqliteLedger {
    pool: SqlitePool,
}

impl SqliteLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn begin(&self) -> Result<LedgerTx> {
        let tx = self.pool.begin().await?;
        Ok(LedgerTx { tx })
    }

    pub async fn find_subscription(&self, id: Uuid) -> Result<Option<Subscription>> {
        fetch_subscription(&self.pool, id).await
    }

    pub async fn find_active_for_user(&self, user_id: Uuid) -> Result<Option<Subscription>> {
        fetch_active_for_user(&self.pool, user_id).await
    }

    pub async fn find_payment(&self, id: Uuid) -> Result<Option<Payment>> {
        fetch_payment(&self.pool, id).await
    }

    pub async fn subscriptions_for_user(&self, user_id: Uuid) -> Result<Vec<Subscription>> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            SELECT id, user_id, plan_id, start_date, end_date, status,
                   payment_method, is_unlimited, admin_assigned, days_remaining,
                   canceled_by, created_at, updated_at
            FROM subscriptions
            WHERE user_id = ?
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_subscription).collect()
    }

    pub async fn payments_for_user(&self, user_id: Uuid) -> Result<Vec<Payment>> {
        let rows = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT id, transaction_id, amount, currency, status, gateway_response,
                   user_id, subscription_id, created_at, updated_at
            FROM payments
            WHERE user_id = ?
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_payment).collect()
    }

    /// Active subscriptions whose `end_date` falls in `[from, to)`.
    pub async fn active_ending_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Subscription>> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            SELECT id, user_id, plan_id, start_date, end_date, status,
                   payment_method, is_unlimited, admin_assigned, days_remaining,
                   canceled_by, created_at, updated_at
            FROM subscriptions
            WHERE status = 'active' AND end_date >= ? AND end_date < ?
            ORDER BY end_date ASC
            "#,
        )
        .bind(from.naive_utc())
        .bind(to.naive_utc())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_subscription).collect()
    }
}

/// One atomic unit of work against the ledger. Dropping it without
/// [`LedgerTx::commit`] rolls everything back.
///
/// The `lock_*` methods start with a no-op `UPDATE` on the rows they return.
/// SQLite has no `SELECT ... FOR UPDATE`; the write takes the database's
/// writer lock and holds it until the transaction ends, so a concurrent
/// writer blocks (up to the busy timeout) instead of reading a stale row.
/// Every mutating transaction must begin with a `lock_*` call or
/// [`LedgerTx::expire_due`] so it never upgrades a read lock mid-flight.
pub struct LedgerTx {
    tx: Transaction<'static, Sqlite>,
}

impl LedgerTx {
    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    pub async fn lock_payment(&mut self, id: Uuid) -> Result<Option<Payment>> {
        sqlx::query("UPDATE payments SET updated_at = updated_at WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *self.tx)
            .await?;

        fetch_payment(&mut *self.tx, id).await
    }

    pub async fn lock_payment_by_transaction(&mut self, transaction_id: &str) -> Result<Option<Payment>> {
        sqlx::query("UPDATE payments SET updated_at = updated_at WHERE transaction_id = ?")
            .bind(transaction_id)
            .execute(&mut *self.tx)
            .await?;

        fetch_payment_by_transaction(&mut *self.tx, transaction_id).await
    }

    pub async fn lock_subscription(&mut self, id: Uuid) -> Result<Option<Subscription>> {
        sqlx::query("UPDATE subscriptions SET updated_at = updated_at WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *self.tx)
            .await?;

        fetch_subscription(&mut *self.tx, id).await
    }

    /// Locks every active subscription of the user and returns the one
    /// ending last.
    pub async fn lock_active_for_user(&mut self, user_id: Uuid) -> Result<Option<Subscription>> {
        sqlx::query(
            "UPDATE subscriptions SET updated_at = updated_at WHERE user_id = ? AND status = 'active'",
        )
        .bind(user_id.to_string())
        .execute(&mut *self.tx)
        .await?;

        fetch_active_for_user(&mut *self.tx, user_id).await
    }

    /// Active subscriptions of the user other than `except`. Only meaningful
    /// once the transaction holds the writer lock.
    pub async fn other_active_for_user(&mut self, user_id: Uuid, except: Uuid) -> Result<Vec<Subscription>> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            SELECT id, user_id, plan_id, start_date, end_date, status,
                   payment_method, is_unlimited, admin_assigned, days_remaining,
                   canceled_by, created_at, updated_at
            FROM subscriptions
            WHERE user_id = ? AND status = 'active' AND id != ?
            "#,
        )
        .bind(user_id.to_string())
        .bind(except.to_string())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(row_to_subscription).collect()
    }

    pub async fn latest_completed_payment(&mut self, subscription_id: Uuid) -> Result<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(
            r#"
            SELECT id, transaction_id, amount, currency, status, gateway_response,
                   user_id, subscription_id, created_at, updated_at
            FROM payments
            WHERE subscription_id = ? AND status = 'completed'
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(subscription_id.to_string())
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(row_to_payment).transpose()
    }

    pub async fn insert_subscription(&mut self, subscription: &Subscription) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                id, user_id, plan_id, start_date, end_date, status,
                payment_method, is_unlimited, admin_assigned, days_remaining,
                canceled_by, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(subscription.id.to_string())
        .bind(subscription.user_id.to_string())
        .bind(subscription.plan_id.to_string())
        .bind(subscription.start_date.naive_utc())
        .bind(subscription.end_date.naive_utc())
        .bind(subscription.status.as_str())
        .bind(&subscription.payment_method)
        .bind(subscription.is_unlimited as i32)
        .bind(subscription.admin_assigned as i32)
        .bind(subscription.days_remaining)
        .bind(subscription.canceled_by.map(|a| a.as_str()))
        .bind(subscription.created_at.naive_utc())
        .bind(subscription.updated_at.naive_utc())
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    pub async fn save_subscription(&mut self, subscription: &Subscription) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE subscriptions
            SET plan_id = ?,
                start_date = ?,
                end_date = ?,
                status = ?,
                payment_method = ?,
                is_unlimited = ?,
                admin_assigned = ?,
                days_remaining = ?,
                canceled_by = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(subscription.plan_id.to_string())
        .bind(subscription.start_date.naive_utc())
        .bind(subscription.end_date.naive_utc())
        .bind(subscription.status.as_str())
        .bind(&subscription.payment_method)
        .bind(subscription.is_unlimited as i32)
        .bind(subscription.admin_assigned as i32)
        .bind(subscription.days_remaining)
        .bind(subscription.canceled_by.map(|a| a.as_str()))
        .bind(subscription.updated_at.naive_utc())
        .bind(subscription.id.to_string())
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Subscription not found".to_string()));
        }
        Ok(())
    }

    pub async fn insert_payment(&mut self, payment: &Payment) -> Result<()> {
        let gateway_response = payment
            .gateway_response
            .as_ref()
            .map(|v| v.to_string());

        sqlx::query(
            r#"
            INSERT INTO payments (
                id, transaction_id, amount, currency, status, gateway_response,
                user_id, subscription_id, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(payment.id.to_string())
        .bind(&payment.transaction_id)
        .bind(payment.amount.to_string())
        .bind(&payment.currency)
        .bind(payment.status.as_str())
        .bind(gateway_response)
        .bind(payment.user_id.to_string())
        .bind(payment.subscription_id.to_string())
        .bind(payment.created_at.naive_utc())
        .bind(payment.updated_at.naive_utc())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => AppError::Conflict(format!(
                "Payment for transaction {} already exists",
                payment.transaction_id
            )),
            other => other.into(),
        })?;

        Ok(())
    }

    pub async fn save_payment(&mut self, payment: &Payment) -> Result<()> {
        let gateway_response = payment
            .gateway_response
            .as_ref()
            .map(|v| v.to_string());

        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = ?,
                gateway_response = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(payment.status.as_str())
        .bind(gateway_response)
        .bind(payment.updated_at.naive_utc())
        .bind(payment.id.to_string())
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Payment not found".to_string()));
        }
        Ok(())
    }

    /// Moves every active subscription with `end_date < now` to `expired` in
    /// one statement and returns exactly the rows it changed. `end_date` is
    /// left untouched.
    pub async fn expire_due(&mut self, now: DateTime<Utc>) -> Result<Vec<Subscription>> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            UPDATE subscriptions
            SET status = 'expired', updated_at = ?
            WHERE status = 'active' AND end_date < ?
            RETURNING id, user_id, plan_id, start_date, end_date, status,
                      payment_method, is_unlimited, admin_assigned, days_remaining,
                      canceled_by, created_at, updated_at
            "#,
        )
        .bind(now.naive_utc())
        .bind(now.naive_utc())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(row_to_subscription).collect()
    }
}
