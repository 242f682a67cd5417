use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::LifecycleEngine;
use crate::{
    domain::{to_minor_units, Payment, PaymentStatus, Subscription, SubscriptionStatus},
    error::{AppError, Result},
    payments::IntentMetadata,
};

/// Longest single purchase, in months.
pub const MAX_MONTHS: u32 = 120;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateIntentRequest {
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub months: u32,
    pub payment_method: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentIntentCreated {
    pub payment_id: Uuid,
    pub subscription_id: Uuid,
    pub client_secret: String,
    pub total_amount: Decimal,
    pub currency: String,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub is_renewal: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfirmedPayment {
    pub payment_id: Uuid,
    pub subscription_id: Uuid,
    pub status: PaymentStatus,
    /// Set when an earlier confirm or webhook had already completed it.
    pub already_confirmed: bool,
}

impl ConfirmedPayment {
    fn already(payment: &Payment) -> Self {
        Self {
            payment_id: payment.id,
            subscription_id: payment.subscription_id,
            status: payment.status,
            already_confirmed: true,
        }
    }
}

impl CreateIntentRequest {
    fn validate(&self) -> Result<()> {
        if self.payment_method.trim().is_empty() {
            return Err(AppError::Validation("paymentMethod is required".to_string()));
        }
        if self.months == 0 {
            return Err(AppError::Validation("months must be at least 1".to_string()));
        }
        if self.months > MAX_MONTHS {
            return Err(AppError::Validation(format!(
                "months must be at most {}",
                MAX_MONTHS
            )));
        }
        Ok(())
    }
}

impl LifecycleEngine {
    /// Opens a purchase or renewal: a pending subscription, a gateway intent
    /// and a pending payment, all or nothing.
    ///
    /// Buying the plan of the current active subscription renews it: the
    /// period starts where that subscription ends (or now, if that is already
    /// past) and the last completed payment of that subscription is carried
    /// into the total. Any other plan starts a new subscription from now.
    pub async fn create_payment_intent(&self, request: CreateIntentRequest) -> Result<PaymentIntentCreated> {
        request.validate()?;

        let (_user, plan) = tokio::try_join!(
            self.require_user(request.user_id),
            self.require_plan(request.plan_id),
        )?;

        if plan.is_free() {
            return Err(AppError::Validation(
                "The Free plan cannot be purchased".to_string(),
            ));
        }

        let period_days = plan
            .duration_days
            .checked_mul(i64::from(request.months))
            .ok_or_else(|| AppError::Validation("Subscription period is out of range".to_string()))?;
        let base_price = plan
            .price
            .checked_mul(Decimal::from(request.months))
            .ok_or_else(|| AppError::Validation("Total amount is out of range".to_string()))?;

        let now = Utc::now();
        let mut tx = self.ledger.begin().await?;

        // Only the same plan continues a renewal chain. A different plan is a
        // fresh purchase; the active row stays in force until the new one
        // activates and supersedes it.
        let existing = tx
            .lock_active_for_user(request.user_id)
            .await?
            .filter(|current| current.plan_id == plan.id);
        let (start_date, carried) = match &existing {
            Some(current) => {
                let carried = tx
                    .latest_completed_payment(current.id)
                    .await?
                    .map(|p| p.amount)
                    .unwrap_or(Decimal::ZERO);
                (current.end_date.max(now), carried)
            }
            None => (now, Decimal::ZERO),
        };

        let end_date = start_date
            .checked_add_signed(Duration::days(period_days))
            .ok_or_else(|| AppError::Validation("Subscription period is out of range".to_string()))?;
        let total_amount = base_price
            .checked_add(carried)
            .ok_or_else(|| AppError::Validation("Total amount is out of range".to_string()))?;

        let is_renewal = existing.is_some();
        let subscription = match existing {
            Some(mut current) => {
                current.start_date = start_date;
                current.end_date = end_date;
                current.status = SubscriptionStatus::Pending;
                current.payment_method = request.payment_method.clone();
                current.admin_assigned = false;
                current.is_unlimited = false;
                current.updated_at = now;
                tx.save_subscription(&current).await?;
                current
            }
            None => {
                let subscription = Subscription {
                    id: Uuid::new_v4(),
                    user_id: request.user_id,
                    plan_id: plan.id,
                    start_date,
                    end_date,
                    status: SubscriptionStatus::Pending,
                    payment_method: request.payment_method.clone(),
                    is_unlimited: false,
                    admin_assigned: false,
                    days_remaining: None,
                    canceled_by: None,
                    created_at: now,
                    updated_at: now,
                };
                tx.insert_subscription(&subscription).await?;
                subscription
            }
        };

        let metadata = IntentMetadata {
            user_id: request.user_id,
            subscription_id: subscription.id,
            months: request.months,
            is_renewal,
        };
        let intent = self
            .gateway_call(
                "create payment intent",
                self.gateway
                    .create_intent(to_minor_units(total_amount)?, &self.options.currency, &metadata),
            )
            .await?;

        let payment = Payment {
            id: Uuid::new_v4(),
            transaction_id: intent.id,
            amount: total_amount,
            currency: self.options.currency.clone(),
            status: PaymentStatus::Pending,
            gateway_response: None,
            user_id: request.user_id,
            subscription_id: subscription.id,
            created_at: now,
            updated_at: now,
        };
        tx.insert_payment(&payment).await?;
        tx.commit().await?;

        tracing::info!(
            payment_id = %payment.id,
            subscription_id = %subscription.id,
            transaction_id = %payment.transaction_id,
            is_renewal,
            "Created payment intent for {} {} ({} carried)",
            total_amount,
            payment.currency,
            carried
        );

        Ok(PaymentIntentCreated {
            payment_id: payment.id,
            subscription_id: subscription.id,
            client_secret: intent.client_secret,
            total_amount,
            currency: payment.currency,
            start_date,
            end_date,
            is_renewal,
        })
    }

    /// Client-side confirmation after the payment form succeeded.
    ///
    /// Idempotent: a payment that is already completed is reported as such
    /// with no writes and no notification. The gateway is asked for the
    /// intent's status first; only `succeeded` completes the payment.
    pub async fn confirm_payment(&self, payment_id: Uuid) -> Result<ConfirmedPayment> {
        let payment = self
            .ledger
            .find_payment(payment_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))?;

        match payment.status {
            PaymentStatus::Completed => {
                tracing::debug!(payment_id = %payment.id, "Payment already confirmed");
                return Ok(ConfirmedPayment::already(&payment));
            }
            PaymentStatus::Failed => {
                return Err(AppError::PaymentDeclined("Payment has failed".to_string()));
            }
            PaymentStatus::Refunded => {
                return Err(AppError::Conflict("Payment was refunded".to_string()));
            }
            PaymentStatus::Pending => {}
        }

        let intent = self
            .gateway_call(
                "retrieve payment intent",
                self.gateway.retrieve_intent(&payment.transaction_id),
            )
            .await?;

        if !intent.succeeded() {
            return Err(AppError::PaymentDeclined(format!(
                "Payment has not succeeded (gateway status: {})",
                intent.status
            )));
        }

        let now = Utc::now();
        let mut tx = self.ledger.begin().await?;

        let mut payment = tx
            .lock_payment(payment_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))?;

        match payment.status {
            PaymentStatus::Pending => {}
            PaymentStatus::Completed => {
                tracing::info!(payment_id = %payment.id, "Payment completed concurrently, nothing to do");
                return Ok(ConfirmedPayment::already(&payment));
            }
            PaymentStatus::Failed => {
                return Err(AppError::PaymentDeclined("Payment has failed".to_string()));
            }
            PaymentStatus::Refunded => {
                return Err(AppError::Conflict("Payment was refunded".to_string()));
            }
        }

        payment.status = PaymentStatus::Completed;
        payment.updated_at = now;
        tx.save_payment(&payment).await?;

        let mut subscription = tx
            .lock_subscription(payment.subscription_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Subscription not found".to_string()))?;

        let (activated, superseded) = if subscription.status == SubscriptionStatus::Pending {
            let superseded = Self::activate(&mut tx, &mut subscription, now).await?;
            (true, superseded)
        } else {
            tracing::warn!(
                subscription_id = %subscription.id,
                status = %subscription.status,
                "Payment completed for a subscription that is not pending"
            );
            (false, Vec::new())
        };

        tx.commit().await?;

        tracing::info!(
            payment_id = %payment.id,
            subscription_id = %subscription.id,
            "Payment confirmed by client"
        );

        self.announce_status_changes(superseded, SubscriptionStatus::Canceled).await;
        if activated {
            let is_renewal = match IntentMetadata::from_map(&intent.metadata) {
                Ok(metadata) => metadata.is_renewal,
                Err(e) => {
                    tracing::warn!(payment_id = %payment.id, "Unreadable intent metadata: {:?}", e);
                    false
                }
            };
            self.announce_activation(&payment, &subscription, is_renewal).await;
        }

        Ok(ConfirmedPayment {
            payment_id: payment.id,
            subscription_id: payment.subscription_id,
            status: payment.status,
            already_confirmed: false,
        })
    }
}
