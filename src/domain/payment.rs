use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::{prelude::ToPrimitive, Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    /// Gateway payment-intent id. Unique; the idempotency key shared by the
    /// confirm and webhook paths.
    pub transaction_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    /// Snapshot of the last gateway event applied to this row.
    pub gateway_response: Option<serde_json::Value>,
    pub user_id: Uuid,
    pub subscription_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn is_terminal(&self) -> bool {
        self.status != PaymentStatus::Pending
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Converts a human-unit amount to the gateway's minor units, rounding
/// half away from zero (`12.345` -> `1235`).
pub fn to_minor_units(amount: Decimal) -> Result<i64> {
    amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .map(|minor| minor.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero))
        .and_then(|minor| minor.to_i64())
        .ok_or_else(|| AppError::Validation(format!("Amount {} is out of range", amount)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_to_minor_units() {
        assert_eq!(to_minor_units(dec("20")).unwrap(), 2000);
        assert_eq!(to_minor_units(dec("9.99")).unwrap(), 999);
        assert_eq!(to_minor_units(dec("12.345")).unwrap(), 1235);
        assert_eq!(to_minor_units(dec("0.005")).unwrap(), 1);
        assert_eq!(to_minor_units(Decimal::ZERO).unwrap(), 0);
    }

    #[test]
    fn test_out_of_range_amount() {
        assert!(to_minor_units(Decimal::MAX).is_err());
    }
}
