use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use super::LifecycleEngine;
use crate::{
    domain::{PaymentStatus, SubscriptionStatus},
    error::{AppError, Result},
    notifications::LifecycleEvent,
    payments::{GatewayEvent, GatewayEventKind, IntentMetadata},
};

/// What a verified webhook delivery did. Every variant is acknowledged to
/// the gateway; only errors make it redeliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Completed { payment_id: Uuid },
    Failed { payment_id: Uuid },
    /// The payment had already reached a terminal status.
    AlreadyFinal { payment_id: Uuid, status: PaymentStatus },
    /// No payment carries the event's intent id.
    UnknownTransaction { transaction_id: String },
    Ignored { kind: String },
}

impl LifecycleEngine {
    /// Applies a gateway webhook delivery. The signature is checked over the
    /// raw payload before anything is parsed.
    pub async fn handle_webhook(&self, payload: &str, signature: &str) -> Result<WebhookOutcome> {
        let event = self.gateway.verify_webhook(payload, signature)?;

        tracing::debug!(event_id = %event.id, kind = ?event.kind, "Verified webhook event");

        match event.kind.clone() {
            GatewayEventKind::PaymentSucceeded => self.reconcile_success(event).await,
            GatewayEventKind::PaymentFailed => self.reconcile_failure(event).await,
            GatewayEventKind::Other(kind) => {
                tracing::debug!(event_id = %event.id, "Ignoring webhook event {}", kind);
                Ok(WebhookOutcome::Ignored { kind })
            }
        }
    }

    fn intent_id(event: &GatewayEvent) -> Result<&str> {
        event
            .intent_id
            .as_deref()
            .ok_or_else(|| AppError::Validation(format!("Event {} carries no payment intent", event.id)))
    }

    async fn reconcile_success(&self, event: GatewayEvent) -> Result<WebhookOutcome> {
        let transaction_id = Self::intent_id(&event)?;
        let now = Utc::now();
        let mut tx = self.ledger.begin().await?;

        let Some(mut payment) = tx.lock_payment_by_transaction(transaction_id).await? else {
            tracing::warn!(event_id = %event.id, "No payment for succeeded intent {}", transaction_id);
            return Ok(WebhookOutcome::UnknownTransaction {
                transaction_id: transaction_id.to_string(),
            });
        };

        if payment.is_terminal() {
            tracing::info!(
                payment_id = %payment.id,
                status = %payment.status,
                "Payment already final, succeeded event is a no-op"
            );
            return Ok(WebhookOutcome::AlreadyFinal {
                payment_id: payment.id,
                status: payment.status,
            });
        }

        payment.status = PaymentStatus::Completed;
        payment.gateway_response = Some(event.snapshot.clone());
        payment.updated_at = now;
        tx.save_payment(&payment).await?;

        let mut subscription = tx
            .lock_subscription(payment.subscription_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Subscription not found".to_string()))?;

        let (activated, superseded) = if subscription.status == SubscriptionStatus::Pending {
            (true, Self::activate(&mut tx, &mut subscription, now).await?)
        } else {
            (false, Vec::new())
        };

        tx.commit().await?;

        tracing::info!(
            payment_id = %payment.id,
            subscription_id = %subscription.id,
            event_id = %event.id,
            "Payment completed by webhook"
        );

        self.announce_status_changes(superseded, SubscriptionStatus::Canceled).await;
        if activated {
            let is_renewal = match IntentMetadata::from_map(&event.metadata) {
                Ok(metadata) => metadata.is_renewal,
                Err(e) => {
                    tracing::warn!(event_id = %event.id, "Unreadable intent metadata: {:?}", e);
                    false
                }
            };
            self.announce_activation(&payment, &subscription, is_renewal).await;
        }

        Ok(WebhookOutcome::Completed { payment_id: payment.id })
    }

    async fn reconcile_failure(&self, event: GatewayEvent) -> Result<WebhookOutcome> {
        let transaction_id = Self::intent_id(&event)?;
        let now = Utc::now();
        let mut tx = self.ledger.begin().await?;

        let Some(mut payment) = tx.lock_payment_by_transaction(transaction_id).await? else {
            tracing::warn!(event_id = %event.id, "No payment for failed intent {}", transaction_id);
            return Ok(WebhookOutcome::UnknownTransaction {
                transaction_id: transaction_id.to_string(),
            });
        };

        if payment.is_terminal() {
            tracing::info!(
                payment_id = %payment.id,
                status = %payment.status,
                "Payment already final, failed event is a no-op"
            );
            return Ok(WebhookOutcome::AlreadyFinal {
                payment_id: payment.id,
                status: payment.status,
            });
        }

        payment.status = PaymentStatus::Failed;
        payment.gateway_response = Some(event.snapshot.clone());
        payment.updated_at = now;
        tx.save_payment(&payment).await?;

        let mut subscription = tx
            .lock_subscription(payment.subscription_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Subscription not found".to_string()))?;

        // An active subscription paid by a different payment stays active.
        if subscription.status == SubscriptionStatus::Pending {
            subscription.status = SubscriptionStatus::Failed;
            subscription.updated_at = now;
            tx.save_subscription(&subscription).await?;
        }

        tx.commit().await?;

        tracing::info!(
            payment_id = %payment.id,
            subscription_id = %subscription.id,
            event_id = %event.id,
            "Payment failed"
        );

        if self.options.notify_payment_failures {
            self.notifier
                .dispatch(LifecycleEvent::PaymentFailed {
                    user_id: payment.user_id,
                    payment_id: payment.id,
                    amount: payment.amount,
                    currency: payment.currency.clone(),
                })
                .await;
        }

        Ok(WebhookOutcome::Failed { payment_id: payment.id })
    }
}
