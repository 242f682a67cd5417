use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Name of the implicit default plan. Users without an active subscription
/// are on it; it is never stored as a subscription row.
pub const FREE_PLAN_NAME: &str = "Free";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: Uuid,
    pub name: String,
    pub price: Decimal,
    pub duration_days: i64,
    pub features: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Plan {
    pub fn is_free(&self) -> bool {
        self.name.eq_ignore_ascii_case(FREE_PLAN_NAME)
    }

    pub fn entitlements(&self) -> PlanFeatures {
        PlanFeatures::parse(&self.features)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePlanRequest {
    pub name: String,
    pub price: Decimal,
    pub duration_days: i64,
    #[serde(default)]
    pub features: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum Quota {
    Unlimited,
    Limited(u32),
}

/// Entitlements parsed from a plan's free-form feature strings.
///
/// `"5 custom domains"` and `"unlimited api keys"` become quotas keyed by
/// the remaining words; anything else (`"password protection"`) is a flag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanFeatures {
    pub quotas: BTreeMap<String, Quota>,
    pub flags: BTreeSet<String>,
}

impl PlanFeatures {
    pub fn parse<S: AsRef<str>>(features: &[S]) -> Self {
        let mut parsed = Self::default();

        for raw in features {
            let normalized = raw
                .as_ref()
                .split_whitespace()
                .map(|w| w.to_lowercase())
                .collect::<Vec<_>>();

            let Some((first, rest)) = normalized.split_first() else {
                continue;
            };

            let quota = if first == "unlimited" {
                Some(Quota::Unlimited)
            } else {
                first.parse::<u32>().ok().map(Quota::Limited)
            };

            match quota {
                Some(quota) if !rest.is_empty() => {
                    parsed.quotas.insert(rest.join(" "), quota);
                }
                _ => {
                    parsed.flags.insert(normalized.join(" "));
                }
            }
        }

        parsed
    }

    pub fn quota(&self, name: &str) -> Option<Quota> {
        self.quotas.get(&name.to_lowercase()).copied()
    }

    pub fn has(&self, flag: &str) -> bool {
        let flag = flag.to_lowercase();
        self.flags.contains(&flag) || self.quotas.contains_key(&flag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_features() {
        let features = PlanFeatures::parse(&[
            "unlimited api keys",
            "5 Custom Domains",
            "password protection",
            "  ",
        ]);

        assert_eq!(features.quota("api keys"), Some(Quota::Unlimited));
        assert_eq!(features.quota("custom domains"), Some(Quota::Limited(5)));
        assert!(features.has("Password Protection"));
        assert!(!features.has("analytics"));
        assert_eq!(features.quota("analytics"), None);
        assert_eq!(features.flags.len(), 1);
    }

    #[test]
    fn test_bare_number_is_a_flag() {
        let features = PlanFeatures::parse(&["42"]);
        assert!(features.quotas.is_empty());
        assert!(features.has("42"));
    }

    #[test]
    fn test_free_plan_detection() {
        let plan = Plan {
            id: Uuid::new_v4(),
            name: "free".to_string(),
            price: Decimal::ZERO,
            duration_days: 30,
            features: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(plan.is_free());
    }
}
