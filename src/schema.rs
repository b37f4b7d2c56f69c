// 📐 Schema - tables, indexes, foreign keys
//
// The table layout is the contract with every other reader of the database:
// names, nullability, defaults, enumerated value sets, delete actions and the
// named index set must not drift. `verify_schema` fingerprints what is on disk
// against what this module would create.

use crate::enums::{
    FeatureValueType, InsightCategory, RequiredPlan, SubscriptionPlan, SubscriptionStatus,
};
use crate::error::Result;
use rusqlite::Connection;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

/// Stored in `PRAGMA user_version`
pub const SCHEMA_VERSION: i32 = 1;

/// Every table, parents before children
pub const TABLES: &[&str] = &[
    "user",
    "session",
    "account",
    "verification",
    "user_subscription",
    "premium_feature",
    "bank_type",
    "bank",
    "bank_service",
    "service_feature",
    "service_feature_value",
    "service_review",
    "comparison_session",
    "advanced_comparison",
    "market_insight",
    "user_activity",
    "service_pricing_history",
];

/// Every named index
pub const INDEXES: &[&str] = &[
    "user_subscription_user_id_idx",
    "user_subscription_type_idx",
    "user_subscription_stripe_customer_idx",
    "premium_feature_name_idx",
    "premium_feature_required_plan_idx",
    "bank_slug_idx",
    "bank_name_idx",
    "bank_is_active_idx",
    "bank_service_bank_id_idx",
    "bank_service_type_idx",
    "bank_service_rating_idx",
    "bank_service_fee_idx",
    "bank_service_is_active_idx",
    "bank_service_bank_slug_idx",
    "service_feature_name_idx",
    "service_feature_category_idx",
    "service_feature_value_service_feature_idx",
    "service_feature_value_service_idx",
    "service_feature_value_feature_idx",
    "service_feature_value_numeric_idx",
    "service_review_service_idx",
    "service_review_user_idx",
    "service_review_rating_idx",
    "service_review_approved_idx",
    "service_review_created_idx",
    "comparison_session_user_idx",
    "comparison_session_token_idx",
    "comparison_session_expires_idx",
    "advanced_comparison_user_idx",
    "advanced_comparison_saved_idx",
    "market_insight_slug_idx",
    "market_insight_category_idx",
    "market_insight_premium_idx",
    "market_insight_published_idx",
    "user_activity_user_idx",
    "user_activity_type_idx",
    "user_activity_created_idx",
    "service_pricing_history_service_idx",
    "service_pricing_history_effective_idx",
];

/// Full DDL. Idempotent thanks to `IF NOT EXISTS`.
///
/// Conventions: timestamps are RFC 3339 UTC text with millisecond precision,
/// booleans are 0/1 integers, JSON columns are `json_valid` text, money is
/// integer cents.
pub fn schema_sql() -> String {
    format!(
        r#"
-- ============================================================================
-- AUTH (tables owned by the external auth library)
-- ============================================================================
CREATE TABLE IF NOT EXISTS user (
    id             TEXT PRIMARY KEY,
    name           TEXT NOT NULL,
    email          TEXT NOT NULL UNIQUE,
    email_verified INTEGER NOT NULL DEFAULT 0 CHECK (email_verified IN (0, 1)),
    image          TEXT,
    created_at     TEXT NOT NULL DEFAULT ({now}),
    updated_at     TEXT NOT NULL DEFAULT ({now})
);

CREATE TABLE IF NOT EXISTS session (
    id         TEXT PRIMARY KEY,
    expires_at TEXT NOT NULL,
    token      TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    ip_address TEXT,
    user_agent TEXT,
    user_id    TEXT NOT NULL REFERENCES user(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS account (
    id                       TEXT PRIMARY KEY,
    account_id               TEXT NOT NULL,
    provider_id              TEXT NOT NULL,
    user_id                  TEXT NOT NULL REFERENCES user(id) ON DELETE CASCADE,
    access_token             TEXT,
    refresh_token            TEXT,
    id_token                 TEXT,
    access_token_expires_at  TEXT,
    refresh_token_expires_at TEXT,
    scope                    TEXT,
    password                 TEXT,
    created_at               TEXT NOT NULL,
    updated_at               TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS verification (
    id         TEXT PRIMARY KEY,
    identifier TEXT NOT NULL,
    value      TEXT NOT NULL,
    expires_at TEXT NOT NULL,
    created_at TEXT DEFAULT ({now}),
    updated_at TEXT DEFAULT ({now})
);

-- ============================================================================
-- SUBSCRIPTIONS & PREMIUM FEATURES
-- ============================================================================
CREATE TABLE IF NOT EXISTS user_subscription (
    id                     TEXT PRIMARY KEY,
    user_id                TEXT NOT NULL REFERENCES user(id) ON DELETE CASCADE,
    subscription_type      TEXT NOT NULL DEFAULT 'free' CHECK (subscription_type IN ({plans})),
    subscription_status    TEXT NOT NULL DEFAULT 'inactive' CHECK (subscription_status IN ({statuses})),
    trial_ends_at          TEXT,
    subscription_starts_at TEXT,
    subscription_ends_at   TEXT,
    stripe_customer_id     TEXT,
    stripe_subscription_id TEXT,
    features               TEXT DEFAULT '[]' CHECK (json_valid(features)),
    created_at             TEXT NOT NULL DEFAULT ({now}),
    updated_at             TEXT NOT NULL DEFAULT ({now})
);
CREATE INDEX IF NOT EXISTS user_subscription_user_id_idx ON user_subscription(user_id);
CREATE INDEX IF NOT EXISTS user_subscription_type_idx ON user_subscription(subscription_type);
CREATE INDEX IF NOT EXISTS user_subscription_stripe_customer_idx ON user_subscription(stripe_customer_id);

CREATE TABLE IF NOT EXISTS premium_feature (
    id            TEXT PRIMARY KEY,
    name          TEXT NOT NULL CHECK (length(name) <= 100),
    description   TEXT,
    required_plan TEXT NOT NULL CHECK (required_plan IN ({required_plans})),
    icon          TEXT CHECK (length(icon) <= 100),
    is_active     INTEGER NOT NULL DEFAULT 1 CHECK (is_active IN (0, 1)),
    created_at    TEXT NOT NULL DEFAULT ({now})
);
CREATE UNIQUE INDEX IF NOT EXISTS premium_feature_name_idx ON premium_feature(name);
CREATE INDEX IF NOT EXISTS premium_feature_required_plan_idx ON premium_feature(required_plan);

-- ============================================================================
-- BANKS & SERVICES
-- ============================================================================
CREATE TABLE IF NOT EXISTS bank_type (
    id          TEXT PRIMARY KEY CHECK (length(id) <= 50),
    name        TEXT NOT NULL CHECK (length(name) <= 100),
    description TEXT,
    sort_order  INTEGER DEFAULT 0
);

CREATE TABLE IF NOT EXISTS bank (
    id                   TEXT PRIMARY KEY,
    name                 TEXT NOT NULL CHECK (length(name) <= 255),
    slug                 TEXT NOT NULL CHECK (length(slug) <= 255),
    logo_url             TEXT,
    website_url          TEXT,
    description          TEXT,
    headquarters_country TEXT CHECK (length(headquarters_country) <= 2),
    founded_year         INTEGER,
    is_active            INTEGER NOT NULL DEFAULT 1 CHECK (is_active IN (0, 1)),
    created_at           TEXT NOT NULL DEFAULT ({now}),
    updated_at           TEXT NOT NULL DEFAULT ({now})
);
CREATE UNIQUE INDEX IF NOT EXISTS bank_slug_idx ON bank(slug);
CREATE INDEX IF NOT EXISTS bank_name_idx ON bank(name);
CREATE INDEX IF NOT EXISTS bank_is_active_idx ON bank(is_active);

CREATE TABLE IF NOT EXISTS bank_service (
    id                    TEXT PRIMARY KEY,
    bank_id               TEXT NOT NULL REFERENCES bank(id) ON DELETE CASCADE,
    name                  TEXT NOT NULL CHECK (length(name) <= 255),
    slug                  TEXT NOT NULL CHECK (length(slug) <= 255),
    type_id               TEXT NOT NULL REFERENCES bank_type(id) CHECK (length(type_id) <= 50),
    logo_url              TEXT,
    monthly_fee_cents     INTEGER NOT NULL DEFAULT 0,
    setup_fee_cents       INTEGER NOT NULL DEFAULT 0,
    minimum_balance_cents INTEGER NOT NULL DEFAULT 0,
    description           TEXT,
    pros                  TEXT DEFAULT '[]' CHECK (json_valid(pros)),
    cons                  TEXT DEFAULT '[]' CHECK (json_valid(cons)),
    features              TEXT DEFAULT '[]' CHECK (json_valid(features)),
    rating                NUMERIC NOT NULL DEFAULT 0 CHECK (rating >= 0 AND rating < 10),
    review_count          INTEGER NOT NULL DEFAULT 0,
    is_featured           INTEGER NOT NULL DEFAULT 0 CHECK (is_featured IN (0, 1)),
    is_active             INTEGER NOT NULL DEFAULT 1 CHECK (is_active IN (0, 1)),
    data_last_updated     TEXT NOT NULL DEFAULT ({now}),
    created_at            TEXT NOT NULL DEFAULT ({now}),
    updated_at            TEXT NOT NULL DEFAULT ({now})
);
CREATE INDEX IF NOT EXISTS bank_service_bank_id_idx ON bank_service(bank_id);
CREATE INDEX IF NOT EXISTS bank_service_type_idx ON bank_service(type_id);
CREATE INDEX IF NOT EXISTS bank_service_rating_idx ON bank_service(rating);
CREATE INDEX IF NOT EXISTS bank_service_fee_idx ON bank_service(monthly_fee_cents);
CREATE INDEX IF NOT EXISTS bank_service_is_active_idx ON bank_service(is_active);
CREATE UNIQUE INDEX IF NOT EXISTS bank_service_bank_slug_idx ON bank_service(bank_id, slug);

-- ============================================================================
-- FEATURES & COMPARISON
-- ============================================================================
CREATE TABLE IF NOT EXISTS service_feature (
    id                 TEXT PRIMARY KEY,
    name               TEXT NOT NULL CHECK (length(name) <= 100),
    category           TEXT CHECK (length(category) <= 100),
    description        TEXT,
    icon               TEXT CHECK (length(icon) <= 100),
    is_premium_feature INTEGER NOT NULL DEFAULT 0 CHECK (is_premium_feature IN (0, 1)),
    sort_order         INTEGER NOT NULL DEFAULT 0
);
CREATE UNIQUE INDEX IF NOT EXISTS service_feature_name_idx ON service_feature(name);
CREATE INDEX IF NOT EXISTS service_feature_category_idx ON service_feature(category);

CREATE TABLE IF NOT EXISTS service_feature_value (
    id            TEXT PRIMARY KEY,
    service_id    TEXT NOT NULL REFERENCES bank_service(id) ON DELETE CASCADE,
    feature_id    TEXT NOT NULL REFERENCES service_feature(id) ON DELETE CASCADE,
    value         TEXT,
    value_type    TEXT NOT NULL DEFAULT 'boolean' CHECK (value_type IN ({value_types})),
    numeric_value NUMERIC,
    is_available  INTEGER NOT NULL DEFAULT 1 CHECK (is_available IN (0, 1)),
    notes         TEXT
);
CREATE UNIQUE INDEX IF NOT EXISTS service_feature_value_service_feature_idx ON service_feature_value(service_id, feature_id);
CREATE INDEX IF NOT EXISTS service_feature_value_service_idx ON service_feature_value(service_id);
CREATE INDEX IF NOT EXISTS service_feature_value_feature_idx ON service_feature_value(feature_id);
CREATE INDEX IF NOT EXISTS service_feature_value_numeric_idx ON service_feature_value(numeric_value);

-- ============================================================================
-- REVIEWS
-- ============================================================================
CREATE TABLE IF NOT EXISTS service_review (
    id                TEXT PRIMARY KEY,
    service_id        TEXT NOT NULL REFERENCES bank_service(id) ON DELETE CASCADE,
    user_id           TEXT REFERENCES user(id) ON DELETE SET NULL,
    rating            INTEGER NOT NULL,
    title             TEXT CHECK (length(title) <= 255),
    content           TEXT,
    pros              TEXT DEFAULT '[]' CHECK (json_valid(pros)),
    cons              TEXT DEFAULT '[]' CHECK (json_valid(cons)),
    verified_customer INTEGER NOT NULL DEFAULT 0 CHECK (verified_customer IN (0, 1)),
    helpful_votes     INTEGER NOT NULL DEFAULT 0,
    is_featured       INTEGER NOT NULL DEFAULT 0 CHECK (is_featured IN (0, 1)),
    is_approved       INTEGER NOT NULL DEFAULT 0 CHECK (is_approved IN (0, 1)),
    created_at        TEXT NOT NULL DEFAULT ({now}),
    updated_at        TEXT NOT NULL DEFAULT ({now})
);
CREATE INDEX IF NOT EXISTS service_review_service_idx ON service_review(service_id);
CREATE INDEX IF NOT EXISTS service_review_user_idx ON service_review(user_id);
CREATE INDEX IF NOT EXISTS service_review_rating_idx ON service_review(rating);
CREATE INDEX IF NOT EXISTS service_review_approved_idx ON service_review(is_approved);
CREATE INDEX IF NOT EXISTS service_review_created_idx ON service_review(created_at);

-- ============================================================================
-- COMPARISONS
-- ============================================================================
CREATE TABLE IF NOT EXISTS comparison_session (
    id            TEXT PRIMARY KEY,
    user_id       TEXT REFERENCES user(id) ON DELETE SET NULL,
    session_token TEXT CHECK (length(session_token) <= 255),
    service_ids   TEXT NOT NULL CHECK (json_valid(service_ids)),
    created_at    TEXT NOT NULL DEFAULT ({now}),
    expires_at    TEXT NOT NULL DEFAULT ({expiry})
);
CREATE INDEX IF NOT EXISTS comparison_session_user_idx ON comparison_session(user_id);
CREATE INDEX IF NOT EXISTS comparison_session_token_idx ON comparison_session(session_token);
CREATE INDEX IF NOT EXISTS comparison_session_expires_idx ON comparison_session(expires_at);

CREATE TABLE IF NOT EXISTS advanced_comparison (
    id              TEXT PRIMARY KEY,
    user_id         TEXT NOT NULL REFERENCES user(id) ON DELETE CASCADE,
    title           TEXT CHECK (length(title) <= 255),
    service_ids     TEXT NOT NULL CHECK (json_valid(service_ids)),
    metrics         TEXT DEFAULT '[]' CHECK (json_valid(metrics)),
    insights        TEXT DEFAULT '[]' CHECK (json_valid(insights)),
    recommendations TEXT DEFAULT '[]' CHECK (json_valid(recommendations)),
    is_saved        INTEGER NOT NULL DEFAULT 0 CHECK (is_saved IN (0, 1)),
    created_at      TEXT NOT NULL DEFAULT ({now}),
    updated_at      TEXT NOT NULL DEFAULT ({now})
);
CREATE INDEX IF NOT EXISTS advanced_comparison_user_idx ON advanced_comparison(user_id);
CREATE INDEX IF NOT EXISTS advanced_comparison_saved_idx ON advanced_comparison(is_saved);

-- ============================================================================
-- MARKET INSIGHTS
-- ============================================================================
CREATE TABLE IF NOT EXISTS market_insight (
    id                 TEXT PRIMARY KEY,
    title              TEXT NOT NULL CHECK (length(title) <= 255),
    slug               TEXT NOT NULL CHECK (length(slug) <= 255),
    content            TEXT NOT NULL,
    excerpt            TEXT,
    category           TEXT NOT NULL CHECK (category IN ({categories})),
    is_premium         INTEGER NOT NULL DEFAULT 0 CHECK (is_premium IN (0, 1)),
    author             TEXT CHECK (length(author) <= 100),
    featured_image_url TEXT,
    tags               TEXT DEFAULT '[]' CHECK (json_valid(tags)),
    view_count         INTEGER NOT NULL DEFAULT 0,
    is_published       INTEGER NOT NULL DEFAULT 0 CHECK (is_published IN (0, 1)),
    published_at       TEXT,
    created_at         TEXT NOT NULL DEFAULT ({now}),
    updated_at         TEXT NOT NULL DEFAULT ({now})
);
CREATE UNIQUE INDEX IF NOT EXISTS market_insight_slug_idx ON market_insight(slug);
CREATE INDEX IF NOT EXISTS market_insight_category_idx ON market_insight(category);
CREATE INDEX IF NOT EXISTS market_insight_premium_idx ON market_insight(is_premium);
CREATE INDEX IF NOT EXISTS market_insight_published_idx ON market_insight(is_published, published_at);

-- ============================================================================
-- ACTIVITY TRACKING
-- ============================================================================
CREATE TABLE IF NOT EXISTS user_activity (
    id            TEXT PRIMARY KEY,
    user_id       TEXT REFERENCES user(id) ON DELETE CASCADE,
    session_token TEXT CHECK (length(session_token) <= 255),
    activity_type TEXT NOT NULL CHECK (length(activity_type) <= 50),
    resource_type TEXT CHECK (length(resource_type) <= 50),
    resource_id   TEXT,
    metadata      TEXT DEFAULT '{{}}' CHECK (json_valid(metadata)),
    ip_address    TEXT,
    user_agent    TEXT,
    created_at    TEXT NOT NULL DEFAULT ({now})
);
CREATE INDEX IF NOT EXISTS user_activity_user_idx ON user_activity(user_id);
CREATE INDEX IF NOT EXISTS user_activity_type_idx ON user_activity(activity_type);
CREATE INDEX IF NOT EXISTS user_activity_created_idx ON user_activity(created_at);

-- ============================================================================
-- PRICING HISTORY
-- ============================================================================
CREATE TABLE IF NOT EXISTS service_pricing_history (
    id                    TEXT PRIMARY KEY,
    service_id            TEXT NOT NULL REFERENCES bank_service(id) ON DELETE CASCADE,
    monthly_fee_cents     INTEGER,
    setup_fee_cents       INTEGER,
    minimum_balance_cents INTEGER,
    effective_from        TEXT NOT NULL DEFAULT ({now}),
    effective_to          TEXT,
    change_reason         TEXT CHECK (length(change_reason) <= 255),
    created_at            TEXT NOT NULL DEFAULT ({now})
);
CREATE INDEX IF NOT EXISTS service_pricing_history_service_idx ON service_pricing_history(service_id);
CREATE INDEX IF NOT EXISTS service_pricing_history_effective_idx ON service_pricing_history(effective_from);
"#,
        now = NOW_SQL,
        expiry = SESSION_EXPIRY_SQL,
        plans = SubscriptionPlan::sql_list(),
        statuses = SubscriptionStatus::sql_list(),
        required_plans = RequiredPlan::sql_list(),
        value_types = FeatureValueType::sql_list(),
        categories = InsightCategory::sql_list(),
    )
}

/// Current time in the stored timestamp format
const NOW_SQL: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";

/// Comparison sessions live 7 days unless told otherwise
const SESSION_EXPIRY_SQL: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now', '+7 days')";

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Foreign keys are per connection in SQLite and off by default
    conn.pragma_update(None, "foreign_keys", true)?;

    // WAL for file databases; in-memory databases answer "memory"
    let journal_mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    debug!(journal_mode = %journal_mode, "journal mode set");

    conn.execute_batch(&schema_sql())?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

    info!(
        tables = TABLES.len(),
        indexes = INDEXES.len(),
        version = SCHEMA_VERSION,
        "schema ready"
    );
    Ok(())
}

/// Result of comparing an on-disk schema with the compiled-in one
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaCheck {
    pub fingerprint: String,
    pub expected: String,
    pub user_version: i32,
    pub missing_tables: Vec<String>,
    pub missing_indexes: Vec<String>,
}

impl SchemaCheck {
    pub fn is_current(&self) -> bool {
        self.fingerprint == self.expected
            && self.user_version == SCHEMA_VERSION
            && self.missing_tables.is_empty()
            && self.missing_indexes.is_empty()
    }
}

/// SHA-256 over the stored DDL of the contract tables and indexes
pub fn schema_fingerprint(conn: &Connection) -> Result<String> {
    let mut stmt = conn.prepare(
        "SELECT type, name, sql FROM sqlite_master
         WHERE sql IS NOT NULL
         ORDER BY type, name",
    )?;

    let entries = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut hasher = Sha256::new();
    for (kind, name, sql) in entries {
        if TABLES.contains(&name.as_str()) || INDEXES.contains(&name.as_str()) {
            hasher.update(format!("{}|{}|{}\n", kind, name, sql));
        }
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Fingerprint of a freshly created schema
pub fn expected_fingerprint() -> Result<String> {
    let conn = Connection::open_in_memory()?;
    setup_database(&conn)?;
    schema_fingerprint(&conn)
}

fn existing_names(conn: &Connection, kind: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM sqlite_master WHERE type = ?1")?;
    let names = stmt
        .query_map([kind], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(names)
}

pub fn verify_schema(conn: &Connection) -> Result<SchemaCheck> {
    let tables = existing_names(conn, "table")?;
    let indexes = existing_names(conn, "index")?;
    let user_version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    let check = SchemaCheck {
        fingerprint: schema_fingerprint(conn)?,
        expected: expected_fingerprint()?,
        user_version,
        missing_tables: TABLES
            .iter()
            .filter(|t| !tables.iter().any(|name| name == *t))
            .map(|t| t.to_string())
            .collect(),
        missing_indexes: INDEXES
            .iter()
            .filter(|i| !indexes.iter().any(|name| name == *i))
            .map(|i| i.to_string())
            .collect(),
    };

    if !check.is_current() {
        warn!(
            missing_tables = ?check.missing_tables,
            missing_indexes = ?check.missing_indexes,
            "schema drift detected"
        );
    }
    Ok(check)
}

// ============================================================================
// TESTS
// ============================================================================
