use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{AppError, Result};

pub mod stripe_client;
#[cfg(any(test, feature = "test-utils"))]
pub mod fake;

pub use stripe_client::StripeGateway;
#[cfg(any(test, feature = "test-utils"))]
pub use fake::FakeGateway;

/// Renewal context attached to every intent. The webhook path has no other
/// way to learn it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentMetadata {
    pub user_id: Uuid,
    pub subscription_id: Uuid,
    pub months: u32,
    pub is_renewal: bool,
}

impl IntentMetadata {
    pub fn to_map(&self) -> HashMap<String, String> {
        HashMap::from([
            ("userId".to_string(), self.user_id.to_string()),
            ("subscriptionId".to_string(), self.subscription_id.to_string()),
            ("months".to_string(), self.months.to_string()),
            ("isRenewal".to_string(), self.is_renewal.to_string()),
        ])
    }

    pub fn from_map(map: &HashMap<String, String>) -> Result<Self> {
        let field = |key: &str| {
            map.get(key)
                .ok_or_else(|| AppError::Gateway(format!("Intent metadata is missing {}", key)))
        };
        let invalid = |key: &str| AppError::Gateway(format!("Intent metadata has an invalid {}", key));

        Ok(Self {
            user_id: Uuid::parse_str(field("userId")?).map_err(|_| invalid("userId"))?,
            subscription_id: Uuid::parse_str(field("subscriptionId")?)
                .map_err(|_| invalid("subscriptionId"))?,
            months: field("months")?.parse().map_err(|_| invalid("months"))?,
            is_renewal: field("isRenewal")?.parse().map_err(|_| invalid("isRenewal"))?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct CreatedIntent {
    pub id: String,
    pub client_secret: String,
}

/// The gateway's current view of an intent.
#[derive(Debug, Clone)]
pub struct IntentRecord {
    pub id: String,
    pub status: String,
    pub metadata: HashMap<String, String>,
}

impl IntentRecord {
    pub fn succeeded(&self) -> bool {
        self.status == "succeeded"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEventKind {
    PaymentSucceeded,
    PaymentFailed,
    Other(String),
}

/// A webhook delivery that passed signature verification.
#[derive(Debug, Clone)]
pub struct GatewayEvent {
    pub id: String,
    pub kind: GatewayEventKind,
    pub intent_id: Option<String>,
    pub metadata: HashMap<String, String>,
    /// The verified event as delivered, stored on the payment row.
    pub snapshot: serde_json::Value,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn name(&self) -> &str;

    async fn create_intent(
        &self,
        amount_minor_units: i64,
        currency: &str,
        metadata: &IntentMetadata,
    ) -> Result<CreatedIntent>;

    async fn retrieve_intent(&self, intent_id: &str) -> Result<IntentRecord>;

    /// Checks the signature over the exact raw body before parsing anything.
    fn verify_webhook(&self, payload: &str, signature: &str) -> Result<GatewayEvent>;
}

/// Stands in when no payment provider is configured, so plan reads, admin
/// assignment and cancellation keep working.
pub struct DisabledGateway;

#[async_trait]
impl PaymentGateway for DisabledGateway {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn create_intent(&self, _: i64, _: &str, _: &IntentMetadata) -> Result<CreatedIntent> {
        Err(AppError::ServiceUnavailable("Payment processing is not configured".to_string()))
    }

    async fn retrieve_intent(&self, _: &str) -> Result<IntentRecord> {
        Err(AppError::ServiceUnavailable("Payment processing is not configured".to_string()))
    }

    fn verify_webhook(&self, _: &str, _: &str) -> Result<GatewayEvent> {
        Err(AppError::ServiceUnavailable("Payment processing is not configured".to_string()))
    }
}
