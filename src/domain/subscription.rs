use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub status: SubscriptionStatus,
    pub payment_method: String,
    pub is_unlimited: bool,
    pub admin_assigned: bool,
    /// Whole days left when the subscription was canceled, kept for refunds.
    pub days_remaining: Option<i64>,
    pub canceled_by: Option<CancelActor>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }

    /// Closes the window at `now`. Returns the whole days that were left.
    pub fn cancel(&mut self, by: CancelActor, now: DateTime<Utc>) -> i64 {
        let remaining = days_remaining(self.end_date, now);
        self.status = SubscriptionStatus::Canceled;
        self.end_date = now;
        self.days_remaining = Some(remaining);
        self.canceled_by = Some(by);
        self.updated_at = now;
        remaining
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Pending,
    Active,
    Canceled,
    Expired,
    Failed,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Pending => "pending",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Expired => "expired",
            SubscriptionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CancelActor {
    User,
    Admin,
    /// Replaced by a newer subscription (admin assignment or a second activation).
    System,
}

impl CancelActor {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancelActor::User => "user",
            CancelActor::Admin => "admin",
            CancelActor::System => "system",
        }
    }
}

/// `ceil((end - now) / 1 day)`, floored at zero.
pub fn days_remaining(end_date: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    const DAY_SECS: i64 = 24 * 60 * 60;
    let secs = (end_date - now).num_seconds();
    if secs <= 0 {
        0
    } else {
        (secs + DAY_SECS - 1) / DAY_SECS
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DurationUnit {
    Days,
    Months,
    Years,
}

impl FromStr for DurationUnit {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "day" | "days" => Ok(DurationUnit::Days),
            "month" | "months" => Ok(DurationUnit::Months),
            "year" | "years" => Ok(DurationUnit::Years),
            other => Err(AppError::Validation(format!(
                "Invalid duration unit: {}. Expected one of: days, months, years",
                other
            ))),
        }
    }
}

/// How long an admin-assigned plan lasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanTerm {
    /// Ten years out rather than a null end date, so date arithmetic stays total.
    Unlimited,
    Fixed { amount: u32, unit: DurationUnit },
}

impl PlanTerm {
    pub const UNLIMITED_YEARS: u32 = 10;

    /// Parses the admin form pair, e.g. (`"unlimited"`, `"days"`) or (`"3"`, `"months"`).
    pub fn parse(duration: &str, unit: &str) -> Result<Self> {
        let duration = duration.trim();
        if duration.eq_ignore_ascii_case("unlimited") {
            return Ok(PlanTerm::Unlimited);
        }

        let amount = duration.parse::<u32>().map_err(|_| {
            AppError::Validation(format!(
                "Invalid duration: {}. Expected a positive number or \"unlimited\"",
                duration
            ))
        })?;
        if amount == 0 {
            return Err(AppError::Validation("Duration must be at least 1".to_string()));
        }

        Ok(PlanTerm::Fixed {
            amount,
            unit: unit.parse()?,
        })
    }

    pub fn is_unlimited(&self) -> bool {
        matches!(self, PlanTerm::Unlimited)
    }

    pub fn end_from(&self, start: DateTime<Utc>) -> Result<DateTime<Utc>> {
        let end = match *self {
            PlanTerm::Unlimited => start.checked_add_months(Months::new(Self::UNLIMITED_YEARS * 12)),
            PlanTerm::Fixed { amount, unit: DurationUnit::Days } => {
                start.checked_add_signed(Duration::days(i64::from(amount)))
            }
            PlanTerm::Fixed { amount, unit: DurationUnit::Months } => {
                start.checked_add_months(Months::new(amount))
            }
            PlanTerm::Fixed { amount, unit: DurationUnit::Years } => amount
                .checked_mul(12)
                .and_then(|months| start.checked_add_months(Months::new(months))),
        };

        end.ok_or_else(|| AppError::Validation("Duration is out of range".to_string()))
    }

    /// Human readable form used in notifications.
    pub fn describe(&self) -> String {
        match self {
            PlanTerm::Unlimited => "unlimited".to_string(),
            PlanTerm::Fixed { amount, unit } => {
                let unit = match unit {
                    DurationUnit::Days => "day",
                    DurationUnit::Months => "month",
                    DurationUnit::Years => "year",
                };
                if *amount == 1 {
                    format!("1 {}", unit)
                } else {
                    format!("{} {}s", amount, unit)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_days_remaining_rounds_up() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(days_remaining(now + Duration::hours(1), now), 1);
        assert_eq!(days_remaining(now + Duration::days(10), now), 10);
        assert_eq!(days_remaining(now + Duration::days(10) + Duration::seconds(1), now), 11);
        assert_eq!(days_remaining(now - Duration::days(2), now), 0);
        assert_eq!(days_remaining(now, now), 0);
    }

    #[test]
    fn test_plan_term_parsing() {
        assert_eq!(PlanTerm::parse("unlimited", "days").unwrap(), PlanTerm::Unlimited);
        assert_eq!(PlanTerm::parse("Unlimited", "whatever").unwrap(), PlanTerm::Unlimited);
        assert_eq!(
            PlanTerm::parse("3", "Months").unwrap(),
            PlanTerm::Fixed { amount: 3, unit: DurationUnit::Months }
        );
        assert!(matches!(PlanTerm::parse("3", "weeks"), Err(AppError::Validation(_))));
        assert!(matches!(PlanTerm::parse("abc", "days"), Err(AppError::Validation(_))));
        assert!(matches!(PlanTerm::parse("0", "days"), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_plan_term_end_dates() {
        let start = Utc.with_ymd_and_hms(2024, 1, 31, 8, 30, 0).unwrap();

        assert_eq!(
            PlanTerm::Unlimited.end_from(start).unwrap(),
            Utc.with_ymd_and_hms(2034, 1, 31, 8, 30, 0).unwrap()
        );
        assert_eq!(
            PlanTerm::Fixed { amount: 10, unit: DurationUnit::Days }.end_from(start).unwrap(),
            Utc.with_ymd_and_hms(2024, 2, 10, 8, 30, 0).unwrap()
        );
        // Month arithmetic clamps to the end of the shorter month.
        assert_eq!(
            PlanTerm::Fixed { amount: 1, unit: DurationUnit::Months }.end_from(start).unwrap(),
            Utc.with_ymd_and_hms(2024, 2, 29, 8, 30, 0).unwrap()
        );
        assert_eq!(
            PlanTerm::Fixed { amount: 2, unit: DurationUnit::Years }.end_from(start).unwrap(),
            Utc.with_ymd_and_hms(2026, 1, 31, 8, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_describe() {
        assert_eq!(PlanTerm::Unlimited.describe(), "unlimited");
        assert_eq!(PlanTerm::Fixed { amount: 1, unit: DurationUnit::Years }.describe(), "1 year");
        assert_eq!(PlanTerm::Fixed { amount: 6, unit: DurationUnit::Months }.describe(), "6 months");
    }

    #[test]
    fn test_cancel_pulls_end_date_forward() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let mut sub = Subscription {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            plan_id: Uuid::new_v4(),
            start_date: now - Duration::days(20),
            end_date: now + Duration::days(10),
            status: SubscriptionStatus::Active,
            payment_method: "card".to_string(),
            is_unlimited: false,
            admin_assigned: false,
            days_remaining: None,
            canceled_by: None,
            created_at: now,
            updated_at: now,
        };

        assert_eq!(sub.cancel(CancelActor::User, now), 10);
        assert_eq!(sub.status, SubscriptionStatus::Canceled);
        assert_eq!(sub.end_date, now);
        assert_eq!(sub.days_remaining, Some(10));
        assert_eq!(sub.canceled_by, Some(CancelActor::User));
    }
}
