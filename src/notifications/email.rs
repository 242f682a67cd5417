use std::sync::Arc;

use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use crate::{
    config::EmailConfig,
    domain::SubscriptionStatus,
    error::{AppError, Result},
    notifications::{LifecycleEvent, Notifier},
    repository::UserRepository,
};

pub struct EmailNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    users: Arc<dyn UserRepository>,
}

impl EmailNotifier {
    /// `None` when email is not configured or switched off.
    pub fn new(config: Option<EmailConfig>, users: Arc<dyn UserRepository>) -> Result<Option<Self>> {
        let Some(cfg) = config.filter(|c| c.enabled) else {
            return Ok(None);
        };

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.smtp_host)
            .map_err(|e| AppError::Internal(format!("Invalid SMTP host {}: {}", cfg.smtp_host, e)))?
            .port(cfg.smtp_port)
            .credentials(Credentials::new(cfg.smtp_username, cfg.smtp_password))
            .build();

        let from = cfg
            .from_address
            .parse::<Mailbox>()
            .map_err(|e| AppError::Internal(format!("Invalid from address: {}", e)))?;

        Ok(Some(Self { mailer, from, users }))
    }

    /// Subject and plain-text body for an event, or `None` if users are not
    /// emailed about it.
    pub fn render(event: &LifecycleEvent) -> Option<(String, String)> {
        let date = |d: &chrono::DateTime<chrono::Utc>| d.format("%B %-d, %Y").to_string();

        match event {
            LifecycleEvent::NewSubscription { plan_name, start, end, .. } => Some((
                format!("Welcome to {}", plan_name),
                format!(
                    "Your {} subscription is active from {} until {}.",
                    plan_name,
                    date(start),
                    date(end)
                ),
            )),
            LifecycleEvent::Renewal { plan_name, start, end, amount, .. } => Some((
                format!("Your {} subscription was renewed", plan_name),
                format!(
                    "We received your payment of {}. Your {} subscription now runs from {} until {}.",
                    amount,
                    plan_name,
                    date(start),
                    date(end)
                ),
            )),
            LifecycleEvent::StatusChanged { subscription, new_status } => match new_status {
                SubscriptionStatus::Canceled => Some((
                    "Your subscription was canceled".to_string(),
                    format!(
                        "Your subscription ended on {}. {} unused day(s) were left on it.",
                        date(&subscription.end_date),
                        subscription.days_remaining.unwrap_or(0)
                    ),
                )),
                SubscriptionStatus::Expired => Some((
                    "Your subscription has expired".to_string(),
                    format!(
                        "Your subscription expired on {}. Your cards are back on the Free plan.",
                        date(&subscription.end_date)
                    ),
                )),
                _ => None,
            },
            LifecycleEvent::AdminAssigned { plan, duration_text, .. } => Some((
                format!("You have been given the {} plan", plan.name),
                format!("An administrator assigned you the {} plan ({}).", plan.name, duration_text),
            )),
            LifecycleEvent::ExpiryWarning { subscription, days_left } => Some((
                "Your subscription is about to expire".to_string(),
                format!(
                    "Your subscription expires in {} day(s), on {}. Renew to keep your features.",
                    days_left,
                    date(&subscription.end_date)
                ),
            )),
            LifecycleEvent::PaymentFailed { amount, currency, .. } => Some((
                "Your payment did not go through".to_string(),
                format!(
                    "Your payment of {} {} failed. No changes were made to your plan.",
                    amount,
                    currency.to_uppercase()
                ),
            )),
        }
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn name(&self) -> &str {
        "email"
    }

    fn is_enabled(&self) -> bool {
        true
    }

    async fn handle_event(&self, event: &LifecycleEvent) -> Result<()> {
        let Some((subject, body)) = Self::render(event) else {
            return Ok(());
        };

        let email = match event {
            LifecycleEvent::AdminAssigned { user, .. } => user.email.clone(),
            _ => {
                self.users
                    .find_by_id(event.user_id())
                    .await?
                    .ok_or_else(|| AppError::NotFound("User not found".to_string()))?
                    .email
            }
        };

        let to = email
            .parse::<Mailbox>()
            .map_err(|e| AppError::Validation(format!("Invalid recipient {}: {}", email, e)))?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| AppError::Internal(format!("Failed to build email: {}", e)))?;

        self.mailer
            .send(message)
            .await
            .map_err(|e| AppError::Internal(format!("SMTP error: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use uuid::Uuid;

    #[test]
    fn test_render_renewal() {
        let (subject, body) = EmailNotifier::render(&LifecycleEvent::Renewal {
            user_id: Uuid::new_v4(),
            plan_name: "Pro".to_string(),
            start: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 3, 31, 0, 0, 0).unwrap(),
            amount: Decimal::new(2000, 2),
        })
        .unwrap();

        assert_eq!(subject, "Your Pro subscription was renewed");
        assert!(body.contains("20.00"));
        assert!(body.contains("March 31, 2024"));
    }

    #[test]
    fn test_no_email_for_other_status_changes() {
        let now = Utc::now();
        let subscription = crate::domain::Subscription {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            plan_id: Uuid::new_v4(),
            start_date: now,
            end_date: now,
            status: SubscriptionStatus::Failed,
            payment_method: "card".to_string(),
            is_unlimited: false,
            admin_assigned: false,
            days_remaining: None,
            canceled_by: None,
            created_at: now,
            updated_at: now,
        };

        assert!(EmailNotifier::render(&LifecycleEvent::StatusChanged {
            subscription,
            new_status: SubscriptionStatus::Failed,
        })
        .is_none());
    }
}
