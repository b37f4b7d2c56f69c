// Enumerated columns - fixed value sets stored as TEXT
//
// Each enum's ALL array drives the CHECK constraint in the schema, so the
// database and the Rust type always agree on the allowed strings.

use crate::error::StoreError;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* #[serde(rename = $text)] $variant ),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[ $( $name::$variant ),+ ];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $( $name::$variant => $text ),+
                }
            }

            /// `'a', 'b', ...` for use inside a CHECK (col IN (...)) clause
            pub fn sql_list() -> String {
                Self::ALL
                    .iter()
                    .map(|v| format!("'{}'", v.as_str()))
                    .collect::<Vec<_>>()
                    .join(", ")
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = StoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $text => Ok($name::$variant), )+
                    other => Err(StoreError::InvalidEnum {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: StoreError| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

text_enum! {
    /// Plan a user is billed on
    SubscriptionPlan, "subscription plan" {
        Free => "free",
        Premium => "premium",
        Pro => "pro",
    }
}

text_enum! {
    SubscriptionStatus, "subscription status" {
        Active => "active",
        Inactive => "inactive",
        Trial => "trial",
        Cancelled => "cancelled",
    }
}

text_enum! {
    /// Minimum plan a premium feature is gated behind
    RequiredPlan, "required plan" {
        Premium => "premium",
        Pro => "pro",
    }
}

text_enum! {
    /// How a feature value's `value` text should be read
    FeatureValueType, "feature value type" {
        Boolean => "boolean",
        String => "string",
        Number => "number",
        /// Integer cents
        Currency => "currency",
    }
}

text_enum! {
    InsightCategory, "insight category" {
        MarketTrends => "market-trends",
        Regulatory => "regulatory",
        ProductAnalysis => "product-analysis",
    }
}

text_enum! {
    MetricTrend, "metric trend" {
        Up => "up",
        Down => "down",
        Stable => "stable",
    }
}

text_enum! {
    MetricComparison, "metric comparison" {
        Better => "better",
        Worse => "worse",
        Equal => "equal",
    }
}

impl SubscriptionPlan {
    fn rank(&self) -> u8 {
        match self {
            SubscriptionPlan::Free => 0,
            SubscriptionPlan::Premium => 1,
            SubscriptionPlan::Pro => 2,
        }
    }

    /// Whether this plan unlocks features gated behind `required`.
    /// Pro includes everything Premium has.
    pub fn grants(&self, required: RequiredPlan) -> bool {
        let needed = match required {
            RequiredPlan::Premium => SubscriptionPlan::Premium,
            RequiredPlan::Pro => SubscriptionPlan::Pro,
        };
        self.rank() >= needed.rank()
    }
}

impl Default for SubscriptionPlan {
    fn default() -> Self {
        SubscriptionPlan::Free
    }
}

impl Default for SubscriptionStatus {
    fn default() -> Self {
        SubscriptionStatus::Inactive
    }
}

impl Default for FeatureValueType {
    fn default() -> Self {
        FeatureValueType::Boolean
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trips_database_strings() {
        assert_eq!("market-trends".parse::<InsightCategory>().unwrap(), InsightCategory::MarketTrends);
        assert_eq!(InsightCategory::ProductAnalysis.as_str(), "product-analysis");
        assert_eq!("cancelled".parse::<SubscriptionStatus>().unwrap(), SubscriptionStatus::Cancelled);
    }

    #[test]
    fn test_unknown_value_is_rejected() {
        let err = "enterprise".parse::<SubscriptionPlan>().unwrap_err();
        match err {
            StoreError::InvalidEnum { kind, value } => {
                assert_eq!(kind, "subscription plan");
                assert_eq!(value, "enterprise");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_sql_list_matches_all_values() {
        assert_eq!(SubscriptionPlan::sql_list(), "'free', 'premium', 'pro'");
        assert_eq!(RequiredPlan::sql_list(), "'premium', 'pro'");
    }

    #[test]
    fn test_serde_uses_column_strings() {
        let json = serde_json::to_string(&InsightCategory::MarketTrends).unwrap();
        assert_eq!(json, "\"market-trends\"");
        let trend: MetricTrend = serde_json::from_str("\"stable\"").unwrap();
        assert_eq!(trend, MetricTrend::Stable);
    }

    #[test]
    fn test_plan_grants() {
        assert!(SubscriptionPlan::Pro.grants(RequiredPlan::Premium));
        assert!(SubscriptionPlan::Pro.grants(RequiredPlan::Pro));
        assert!(SubscriptionPlan::Premium.grants(RequiredPlan::Premium));
        assert!(!SubscriptionPlan::Premium.grants(RequiredPlan::Pro));
        assert!(!SubscriptionPlan::Free.grants(RequiredPlan::Premium));
    }

    #[test]
    fn test_defaults_match_column_defaults() {
        assert_eq!(SubscriptionPlan::default(), SubscriptionPlan::Free);
        assert_eq!(SubscriptionStatus::default(), SubscriptionStatus::Inactive);
        assert_eq!(FeatureValueType::default(), FeatureValueType::Boolean);
    }
}
