// Bank Compare - Core Library
// Relational store for banks, their services, reviews, comparisons and
// premium content. Used by the CLI and by tests.

pub mod config;
pub mod db;
pub mod entities;
pub mod enums;
pub mod error;
pub mod schema;
pub mod seed;

// Re-export commonly used types
pub use config::{init_tracing, Config};
pub use db::{now, open_database, table_counts, TableCount};
pub use enums::{
    FeatureValueType, InsightCategory, MetricComparison, MetricTrend, RequiredPlan, SubscriptionPlan,
    SubscriptionStatus,
};
pub use error::{Result, StoreError};
pub use schema::{setup_database, verify_schema, SchemaCheck, SCHEMA_VERSION};
pub use seed::{import_catalog, load_catalog, seed_bank_types, CatalogRow, ImportSummary};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
