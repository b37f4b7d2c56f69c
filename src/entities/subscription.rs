// 💳 Subscriptions + premium feature catalog

use crate::db::{get_json, get_opt_time, get_time, new_id, now, opt_db_time, to_db_time, to_json};
use crate::enums::{RequiredPlan, SubscriptionPlan, SubscriptionStatus};
use crate::error::{Result, StoreError};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::debug;

// ============================================================================
// USER SUBSCRIPTION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSubscription {
    pub id: String,
    pub user_id: String,
    pub subscription_type: SubscriptionPlan,
    pub subscription_status: SubscriptionStatus,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub subscription_starts_at: Option<DateTime<Utc>>,
    pub subscription_ends_at: Option<DateTime<Utc>>,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    /// Feature names unlocked for this user beyond the plan defaults
    pub features: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserSubscription {
    /// Active or trialing (and the trial has not run out at `at`)
    pub fn is_entitled_at(&self, at: DateTime<Utc>) -> bool {
        match self.subscription_status {
            SubscriptionStatus::Active => self.subscription_ends_at.map_or(true, |end| end > at),
            SubscriptionStatus::Trial => self.trial_ends_at.map_or(true, |end| end > at),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewUserSubscription {
    pub user_id: String,
    pub subscription_type: SubscriptionPlan,
    pub subscription_status: SubscriptionStatus,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub subscription_starts_at: Option<DateTime<Utc>>,
    pub subscription_ends_at: Option<DateTime<Utc>>,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub features: Vec<String>,
}

impl NewUserSubscription {
    /// Free plan, inactive, no features
    pub fn new(user_id: &str) -> Self {
        NewUserSubscription {
            user_id: user_id.to_string(),
            ..Default::default()
        }
    }
}

const SUBSCRIPTION_COLUMNS: &str = "id, user_id, subscription_type, subscription_status,
    trial_ends_at, subscription_starts_at, subscription_ends_at,
    stripe_customer_id, stripe_subscription_id, features, created_at, updated_at";

fn subscription_from_row(row: &Row<'_>) -> rusqlite::Result<UserSubscription> {
    Ok(UserSubscription {
        id: row.get(0)?,
        user_id: row.get(1)?,
        subscription_type: row.get(2)?,
        subscription_status: row.get(3)?,
        trial_ends_at: get_opt_time(row, 4)?,
        subscription_starts_at: get_opt_time(row, 5)?,
        subscription_ends_at: get_opt_time(row, 6)?,
        stripe_customer_id: row.get(7)?,
        stripe_subscription_id: row.get(8)?,
        features: get_json(row, 9)?,
        created_at: get_time(row, 10)?,
        updated_at: get_time(row, 11)?,
    })
}

pub fn insert_subscription(conn: &Connection, new: NewUserSubscription) -> Result<UserSubscription> {
    let created_at = now();
    let subscription = UserSubscription {
        id: new_id(),
        user_id: new.user_id,
        subscription_type: new.subscription_type,
        subscription_status: new.subscription_status,
        trial_ends_at: new.trial_ends_at,
        subscription_starts_at: new.subscription_starts_at,
        subscription_ends_at: new.subscription_ends_at,
        stripe_customer_id: new.stripe_customer_id,
        stripe_subscription_id: new.stripe_subscription_id,
        features: new.features,
        created_at,
        updated_at: created_at,
    };

    conn.execute(
        &format!(
            "INSERT INTO user_subscription ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            SUBSCRIPTION_COLUMNS
        ),
        params![
            subscription.id,
            subscription.user_id,
            subscription.subscription_type,
            subscription.subscription_status,
            opt_db_time(&subscription.trial_ends_at),
            opt_db_time(&subscription.subscription_starts_at),
            opt_db_time(&subscription.subscription_ends_at),
            subscription.stripe_customer_id,
            subscription.stripe_subscription_id,
            to_json(&subscription.features)?,
            to_db_time(&subscription.created_at),
            to_db_time(&subscription.updated_at),
        ],
    )?;

    Ok(subscription)
}

/// The user's subscription. The table only indexes `user_id`, so when more
/// than one row exists the most recently created wins.
pub fn subscription_for_user(conn: &Connection, user_id: &str) -> Result<Option<UserSubscription>> {
    let subscription = conn
        .query_row(
            &format!(
                "SELECT {} FROM user_subscription
                 WHERE user_id = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT 1",
                SUBSCRIPTION_COLUMNS
            ),
            [user_id],
            subscription_from_row,
        )
        .optional()?;
    Ok(subscription)
}

pub fn find_subscription_by_stripe_customer(
    conn: &Connection,
    stripe_customer_id: &str,
) -> Result<Option<UserSubscription>> {
    let subscription = conn
        .query_row(
            &format!(
                "SELECT {} FROM user_subscription WHERE stripe_customer_id = ?1
                 ORDER BY created_at DESC LIMIT 1",
                SUBSCRIPTION_COLUMNS
            ),
            [stripe_customer_id],
            subscription_from_row,
        )
        .optional()?;
    Ok(subscription)
}

/// Move a subscription to a new plan/status and refresh `updated_at`
pub fn update_subscription_status(
    conn: &Connection,
    id: &str,
    plan: SubscriptionPlan,
    status: SubscriptionStatus,
) -> Result<UserSubscription> {
    let changed = conn.execute(
        "UPDATE user_subscription
         SET subscription_type = ?1, subscription_status = ?2, updated_at = ?3
         WHERE id = ?4",
        params![plan, status, to_db_time(&now()), id],
    )?;
    if changed == 0 {
        return Err(StoreError::not_found("user_subscription", id));
    }
    debug!(subscription_id = %id, plan = %plan, status = %status, "subscription updated");

    conn.query_row(
        &format!("SELECT {} FROM user_subscription WHERE id = ?1", SUBSCRIPTION_COLUMNS),
        [id],
        subscription_from_row,
    )
    .map_err(StoreError::from)
}

// ============================================================================
// PREMIUM FEATURE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PremiumFeature {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub required_plan: RequiredPlan,
    pub icon: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPremiumFeature {
    pub name: String,
    pub description: Option<String>,
    pub required_plan: RequiredPlan,
    pub icon: Option<String>,
    pub is_active: bool,
}

impl NewPremiumFeature {
    pub fn new(name: &str, required_plan: RequiredPlan) -> Self {
        NewPremiumFeature {
            name: name.to_string(),
            description: None,
            required_plan,
            icon: None,
            is_active: true,
        }
    }
}

pub fn insert_premium_feature(conn: &Connection, new: NewPremiumFeature) -> Result<PremiumFeature> {
    let feature = PremiumFeature {
        id: new_id(),
        name: new.name,
        description: new.description,
        required_plan: new.required_plan,
        icon: new.icon,
        is_active: new.is_active,
        created_at: now(),
    };

    conn.execute(
        "INSERT INTO premium_feature (id, name, description, required_plan, icon, is_active, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            feature.id,
            feature.name,
            feature.description,
            feature.required_plan,
            feature.icon,
            feature.is_active,
            to_db_time(&feature.created_at),
        ],
    )?;

    Ok(feature)
}

/// Active premium features the given plan unlocks, by name
pub fn premium_features_for_plan(conn: &Connection, plan: SubscriptionPlan) -> Result<Vec<PremiumFeature>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, description, required_plan, icon, is_active, created_at
         FROM premium_feature
         WHERE is_active = 1
         ORDER BY name",
    )?;

    let features = stmt
        .query_map([], |row| {
            Ok(PremiumFeature {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                required_plan: row.get(3)?,
                icon: row.get(4)?,
                is_active: row.get(5)?,
                created_at: get_time(row, 6)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(features
        .into_iter()
        .filter(|f| plan.grants(f.required_plan))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{count_rows, fixtures};
    use crate::entities::user::delete_user;
    use chrono::Duration;

    #[test]
    fn test_defaults_are_free_and_inactive() {
        let conn = fixtures::conn();
        let user_id = fixtures::user(&conn, "sub@example.com");

        let sub = insert_subscription(&conn, NewUserSubscription::new(&user_id)).unwrap();
        assert_eq!(sub.subscription_type, SubscriptionPlan::Free);
        assert_eq!(sub.subscription_status, SubscriptionStatus::Inactive);
        assert!(sub.features.is_empty());

        assert_eq!(subscription_for_user(&conn, &user_id).unwrap(), Some(sub));
    }

    #[test]
    fn test_raw_insert_uses_column_defaults() {
        let conn = fixtures::conn();
        let user_id = fixtures::user(&conn, "raw@example.com");
        conn.execute(
            "INSERT INTO user_subscription (id, user_id) VALUES ('s1', ?1)",
            [&user_id],
        )
        .unwrap();

        let sub = subscription_for_user(&conn, &user_id).unwrap().unwrap();
        assert_eq!(sub.subscription_type, SubscriptionPlan::Free);
        assert_eq!(sub.subscription_status, SubscriptionStatus::Inactive);
        assert!(sub.features.is_empty());
    }

    #[test]
    fn test_unknown_plan_rejected_by_check() {
        let conn = fixtures::conn();
        let user_id = fixtures::user(&conn, "bad@example.com");
        let err: StoreError = conn
            .execute(
                "INSERT INTO user_subscription (id, user_id, subscription_type) VALUES ('s1', ?1, 'enterprise')",
                [&user_id],
            )
            .unwrap_err()
            .into();
        assert!(err.is_check_violation());
    }

    #[test]
    fn test_update_status_refreshes_updated_at() {
        let conn = fixtures::conn();
        let user_id = fixtures::user(&conn, "up@example.com");
        let sub = insert_subscription(&conn, NewUserSubscription::new(&user_id)).unwrap();
        let stale = sub.updated_at - Duration::minutes(5);
        conn.execute(
            "UPDATE user_subscription SET updated_at = ?1 WHERE id = ?2",
            params![to_db_time(&stale), sub.id],
        )
        .unwrap();

        let updated =
            update_subscription_status(&conn, &sub.id, SubscriptionPlan::Pro, SubscriptionStatus::Active)
                .unwrap();
        assert_eq!(updated.subscription_type, SubscriptionPlan::Pro);
        assert_eq!(updated.subscription_status, SubscriptionStatus::Active);
        assert!(updated.updated_at > stale);
        assert_eq!(updated.created_at, sub.created_at);
        assert!(updated.is_entitled_at(now()));
    }

    #[test]
    fn test_stripe_lookup() {
        let conn = fixtures::conn();
        let user_id = fixtures::user(&conn, "stripe@example.com");
        let mut new = NewUserSubscription::new(&user_id);
        new.stripe_customer_id = Some("cus_123".to_string());
        new.subscription_type = SubscriptionPlan::Premium;
        new.subscription_status = SubscriptionStatus::Trial;
        new.trial_ends_at = Some(now() + Duration::days(14));
        insert_subscription(&conn, new).unwrap();

        let found = find_subscription_by_stripe_customer(&conn, "cus_123").unwrap().unwrap();
        assert_eq!(found.user_id, user_id);
        assert!(found.is_entitled_at(now()));
        assert!(!found.is_entitled_at(now() + Duration::days(15)));
    }

    #[test]
    fn test_subscription_cascades_with_user() {
        let conn = fixtures::conn();
        let user_id = fixtures::user(&conn, "c@example.com");
        insert_subscription(&conn, NewUserSubscription::new(&user_id)).unwrap();

        delete_user(&conn, &user_id).unwrap();
        assert_eq!(count_rows(&conn, "user_subscription").unwrap(), 0);
    }

    #[test]
    fn test_premium_features_by_plan() {
        let conn = fixtures::conn();
        insert_premium_feature(&conn, NewPremiumFeature::new("Fee alerts", RequiredPlan::Premium)).unwrap();
        insert_premium_feature(&conn, NewPremiumFeature::new("Advanced analytics", RequiredPlan::Pro)).unwrap();
        let mut retired = NewPremiumFeature::new("Retired", RequiredPlan::Premium);
        retired.is_active = false;
        insert_premium_feature(&conn, retired).unwrap();

        let names = |plan| -> Vec<String> {
            premium_features_for_plan(&conn, plan)
                .unwrap()
                .into_iter()
                .map(|f| f.name)
                .collect()
        };
        assert!(names(SubscriptionPlan::Free).is_empty());
        assert_eq!(names(SubscriptionPlan::Premium), vec!["Fee alerts".to_string()]);
        assert_eq!(
            names(SubscriptionPlan::Pro),
            vec!["Advanced analytics".to_string(), "Fee alerts".to_string()]
        );
    }

    #[test]
    fn test_premium_feature_name_unique() {
        let conn = fixtures::conn();
        insert_premium_feature(&conn, NewPremiumFeature::new("Fee alerts", RequiredPlan::Premium)).unwrap();
        let err =
            insert_premium_feature(&conn, NewPremiumFeature::new("Fee alerts", RequiredPlan::Pro)).unwrap_err();
        assert!(err.is_unique_violation());
    }
}
