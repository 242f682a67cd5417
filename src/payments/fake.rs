//! In-process gateway for tests. Signs webhooks the way Stripe does
//! (`t=<ts>,v1=<hex hmac-sha256 of "<ts>.<body>">`).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    payments::{
        CreatedIntent, GatewayEvent, GatewayEventKind, IntentMetadata, IntentRecord,
        PaymentGateway,
    },
};

pub const SUCCEEDED_EVENT: &str = "payment_intent.succeeded";
pub const FAILED_EVENT: &str = "payment_intent.payment_failed";

#[derive(Debug, Clone)]
pub struct FakeIntent {
    pub id: String,
    pub amount_minor_units: i64,
    pub currency: String,
    pub status: String,
    pub metadata: HashMap<String, String>,
}

#[derive(Default)]
struct FakeState {
    intents: Vec<FakeIntent>,
    fail_create: bool,
    create_delay: Option<Duration>,
    retrieve_calls: usize,
}

pub struct FakeGateway {
    webhook_secret: String,
    state: Mutex<FakeState>,
}

#[derive(Deserialize)]
struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: RawEventData,
}

#[derive(Deserialize)]
struct RawEventData {
    object: RawObject,
}

#[derive(Deserialize)]
struct RawObject {
    id: Option<String>,
    object: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

impl FakeGateway {
    pub fn new(webhook_secret: impl Into<String>) -> Self {
        Self {
            webhook_secret: webhook_secret.into(),
            state: Mutex::new(FakeState::default()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Makes every following `create_intent` fail until reset.
    pub fn fail_intent_creation(&self, fail: bool) {
        self.state().fail_create = fail;
    }

    /// Makes `create_intent` stall before answering.
    pub fn delay_intent_creation(&self, delay: Option<Duration>) {
        self.state().create_delay = delay;
    }

    pub fn set_status(&self, intent_id: &str, status: &str) {
        if let Some(intent) = self.state().intents.iter_mut().find(|i| i.id == intent_id) {
            intent.status = status.to_string();
        }
    }

    pub fn intents(&self) -> Vec<FakeIntent> {
        self.state().intents.clone()
    }

    pub fn intent(&self, intent_id: &str) -> Option<FakeIntent> {
        self.state().intents.iter().find(|i| i.id == intent_id).cloned()
    }

    pub fn retrieve_calls(&self) -> usize {
        self.state().retrieve_calls
    }

    pub fn sign(&self, payload: &str, timestamp: i64) -> String {
        format!("t={},v1={}", timestamp, self.compute_signature(payload, &timestamp.to_string()))
    }

    /// A signed `payment_intent.*` delivery for a previously created intent,
    /// carrying the intent's metadata like the real gateway does.
    pub fn signed_event(&self, event_type: &str, intent_id: &str) -> (String, String) {
        let metadata = self
            .intent(intent_id)
            .map(|i| i.metadata)
            .unwrap_or_default();

        let payload = json!({
            "id": format!("evt_{}", Uuid::new_v4().simple()),
            "object": "event",
            "type": event_type,
            "created": Utc::now().timestamp(),
            "data": {
                "object": {
                    "id": intent_id,
                    "object": "payment_intent",
                    "metadata": metadata,
                }
            }
        })
        .to_string();

        let signature = self.sign(&payload, Utc::now().timestamp());
        (payload, signature)
    }

    fn compute_signature(&self, payload: &str, timestamp: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.webhook_secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    fn name(&self) -> &str {
        "fake"
    }

    async fn create_intent(
        &self,
        amount_minor_units: i64,
        currency: &str,
        metadata: &IntentMetadata,
    ) -> Result<CreatedIntent> {
        let delay = self.state().create_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        if state.fail_create {
            return Err(AppError::Gateway("card_declined: fake gateway refused the intent".to_string()));
        }

        let id = format!("pi_{}", Uuid::new_v4().simple());
        state.intents.push(FakeIntent {
            id: id.clone(),
            amount_minor_units,
            currency: currency.to_string(),
            status: "requires_payment_method".to_string(),
            metadata: metadata.to_map(),
        });

        Ok(CreatedIntent {
            client_secret: format!("{}_secret_{}", id, Uuid::new_v4().simple()),
            id,
        })
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<IntentRecord> {
        let mut state = self.state();
        state.retrieve_calls += 1;

        state
            .intents
            .iter()
            .find(|i| i.id == intent_id)
            .map(|i| IntentRecord {
                id: i.id.clone(),
                status: i.status.clone(),
                metadata: i.metadata.clone(),
            })
            .ok_or_else(|| AppError::Gateway(format!("No such payment_intent: {}", intent_id)))
    }

    fn verify_webhook(&self, payload: &str, signature: &str) -> Result<GatewayEvent> {
        let mut timestamp = None;
        let mut sig_v1 = None;
        for part in signature.split(',') {
            match part.split_once('=') {
                Some(("t", value)) => timestamp = Some(value),
                Some(("v1", value)) => sig_v1 = Some(value),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or_else(|| AppError::Signature("Missing timestamp".to_string()))?;
        let sig_v1 = sig_v1.ok_or_else(|| AppError::Signature("Missing signature".to_string()))?;

        let expected = self.compute_signature(payload, timestamp);
        if !bool::from(expected.as_bytes().ct_eq(sig_v1.as_bytes())) {
            return Err(AppError::Signature("Signature verification failed".to_string()));
        }

        let snapshot: serde_json::Value = serde_json::from_str(payload)
            .map_err(|e| AppError::Validation(format!("Webhook payload is not JSON: {}", e)))?;
        let raw: RawEvent = serde_json::from_value(snapshot.clone())
            .map_err(|e| AppError::Validation(format!("Malformed webhook event: {}", e)))?;

        let kind = match raw.event_type.as_str() {
            SUCCEEDED_EVENT => GatewayEventKind::PaymentSucceeded,
            FAILED_EVENT => GatewayEventKind::PaymentFailed,
            other => GatewayEventKind::Other(other.to_string()),
        };

        let is_intent = raw.data.object.object.as_deref() == Some("payment_intent");

        Ok(GatewayEvent {
            id: raw.id,
            kind,
            intent_id: raw.data.object.id.filter(|_| is_intent),
            metadata: raw.data.object.metadata,
            snapshot,
        })
    }
}
