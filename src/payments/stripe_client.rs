use async_trait::async_trait;
use stripe::{
    Client, CreatePaymentIntent, Currency,
    EventObject, EventType, PaymentIntent, PaymentIntentId, Webhook, WebhookError,
};

use crate::{
    error::{AppError, Result},
    payments::{
        CreatedIntent, GatewayEvent, GatewayEventKind, IntentMetadata, IntentRecord,
        PaymentGateway,
    },
};

pub struct StripeGateway {
    client: Client,
    webhook_secret: String,
}

impl StripeGateway {
    pub fn new(api_key: String, webhook_secret: String) -> Self {
        let client = Client::new(api_key);
        Self {
            client,
            webhook_secret,
        }
    }

    fn parse_intent_id(intent_id: &str) -> Result<PaymentIntentId> {
        intent_id
            .parse::<PaymentIntentId>()
            .map_err(|e| AppError::Validation(format!("Invalid payment intent id {}: {}", intent_id, e)))
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    fn name(&self) -> &str {
        "stripe"
    }

    async fn create_intent(
        &self,
        amount_minor_units: i64,
        currency: &str,
        metadata: &IntentMetadata,
    ) -> Result<CreatedIntent> {
        let currency = currency
            .to_lowercase()
            .parse::<Currency>()
            .map_err(|_| AppError::Validation(format!("Unsupported currency: {}", currency)))?;

        let mut params = CreatePaymentIntent::new(amount_minor_units, currency);
        params.metadata = Some(metadata.to_map());

        let intent = PaymentIntent::create(&self.client, params)
            .await
            .map_err(|e| AppError::Gateway(format!("Stripe error: {}", e)))?;

        let client_secret = intent
            .client_secret
            .ok_or_else(|| AppError::Gateway("No client secret returned".to_string()))?;

        tracing::debug!(intent_id = %intent.id, amount_minor_units, "Created Stripe payment intent");

        Ok(CreatedIntent {
            id: intent.id.to_string(),
            client_secret,
        })
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<IntentRecord> {
        let id = Self::parse_intent_id(intent_id)?;

        let intent = PaymentIntent::retrieve(&self.client, &id, &[])
            .await
            .map_err(|e| AppError::Gateway(format!("Stripe error: {}", e)))?;

        Ok(IntentRecord {
            id: intent.id.to_string(),
            status: intent.status.as_str().to_string(),
            metadata: intent.metadata,
        })
    }

    fn verify_webhook(&self, payload: &str, signature: &str) -> Result<GatewayEvent> {
        // Verify webhook signature and construct event
        let event = Webhook::construct_event(payload, signature, &self.webhook_secret)
            .map_err(|e| match e {
                WebhookError::BadSignature
                | WebhookError::BadHeader(_)
                | WebhookError::BadTimestamp(_) => AppError::Signature(e.to_string()),
                _ => AppError::Validation(format!("Webhook error: {}", e)),
            })?;

        let snapshot = serde_json::from_str(payload)
            .map_err(|e| AppError::Validation(format!("Webhook payload is not JSON: {}", e)))?;

        let kind = match event.type_ {
            EventType::PaymentIntentSucceeded => GatewayEventKind::PaymentSucceeded,
            EventType::PaymentIntentPaymentFailed => GatewayEventKind::PaymentFailed,
            other => GatewayEventKind::Other(format!("{:?}", other)),
        };

        let (intent_id, metadata) = match event.data.object {
            EventObject::PaymentIntent(intent) => (Some(intent.id.to_string()), intent.metadata),
            _ => (None, Default::default()),
        };

        Ok(GatewayEvent {
            id: event.id.to_string(),
            kind,
            intent_id,
            metadata,
            snapshot,
        })
    }
}
