// Entity Models
//
// One module per table group. Each exposes:
// - A read struct mirroring the row (what `SELECT` gives back)
// - A `New*` insert struct with the caller-supplied fields
// - Free functions taking `&Connection` for inserts, lookups and updates
//
// Foreign keys and delete actions live in the schema; these modules never
// emulate cascades by hand.

pub mod activity;
pub mod bank;
pub mod comparison;
pub mod feature;
pub mod insight;
pub mod pricing;
pub mod review;
pub mod subscription;
pub mod user;

pub use activity::{NewUserActivity, UserActivity};
pub use bank::{Bank, BankService, BankType, BankUpdate, NewBank, NewBankService, ServiceWithRelations};
pub use comparison::{
    AdvancedComparison, ComparisonMetric, ComparisonSession, NewAdvancedComparison, NewComparisonSession,
};
pub use feature::{
    FeatureValueWithFeature, NewServiceFeature, NewServiceFeatureValue, RankedService, ServiceFeature,
    ServiceFeatureValue, TypedValue,
};
pub use insight::{MarketInsight, NewMarketInsight};
pub use pricing::{FeeSchedule, NewPricingEntry, ServicePricingHistory};
pub use review::{NewServiceReview, ServiceReview};
pub use subscription::{NewPremiumFeature, NewUserSubscription, PremiumFeature, UserSubscription};
pub use user::{Account, NewAccount, NewSession, NewUser, Session, User, UserWithRelations, Verification};
