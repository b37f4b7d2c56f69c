// 🏦 Banks, bank types and the services banks offer
//
// Ownership: a bank owns its services (cascade), a service owns its reviews,
// feature values and pricing history (cascade). Bank types are a reference
// table; a type still used by a service cannot be deleted.
//
// Money is integer cents everywhere.

use crate::db::{
    decimal_to_db, get_decimal, get_json, get_time, new_id, now, round_decimal, to_db_time, to_json,
};
use crate::entities::feature::{feature_values_for_service, FeatureValueWithFeature};
use crate::entities::pricing::{pricing_history_for_service, ServicePricingHistory};
use crate::entities::review::{reviews_for_service, ServiceReview};
use crate::error::{Result, StoreError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::info;

/// decimal(2,1)
pub const RATING_SCALE: u32 = 1;

// ============================================================================
// BANK TYPE
// ============================================================================

/// Category of banking service ("checking", "savings", ...).
/// The id is a short human-chosen key, not a UUID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankType {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub sort_order: Option<i64>,
}

/// Insert or replace the name/description/sort order of a bank type.
/// A `None` sort order is stored as NULL and lists as 0.
pub fn upsert_bank_type(conn: &Connection, bank_type: &BankType) -> Result<()> {
    conn.execute(
        "INSERT INTO bank_type (id, name, description, sort_order)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(id) DO UPDATE SET
             name = excluded.name,
             description = excluded.description,
             sort_order = excluded.sort_order",
        params![
            bank_type.id,
            bank_type.name,
            bank_type.description,
            bank_type.sort_order,
        ],
    )?;
    Ok(())
}

fn bank_type_from_row(row: &Row<'_>) -> rusqlite::Result<BankType> {
    Ok(BankType {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        sort_order: row.get(3)?,
    })
}

pub fn get_bank_type(conn: &Connection, id: &str) -> Result<BankType> {
    conn.query_row(
        "SELECT id, name, description, sort_order FROM bank_type WHERE id = ?1",
        [id],
        bank_type_from_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found("bank_type", id))
}

/// All bank types by sort order, then name
pub fn list_bank_types(conn: &Connection) -> Result<Vec<BankType>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, description, sort_order FROM bank_type
         ORDER BY COALESCE(sort_order, 0), name",
    )?;
    let types = stmt
        .query_map([], bank_type_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(types)
}

/// Fails with a foreign key violation while any service uses the type
pub fn delete_bank_type(conn: &Connection, id: &str) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM bank_type WHERE id = ?1", [id])?;
    Ok(deleted > 0)
}

// ============================================================================
// BANK
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bank {
    pub id: String,
    pub name: String,
    /// Unique across banks
    pub slug: String,
    pub logo_url: Option<String>,
    pub website_url: Option<String>,
    pub description: Option<String>,
    /// ISO 3166-1 alpha-2
    pub headquarters_country: Option<String>,
    pub founded_year: Option<i32>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewBank {
    pub name: String,
    pub slug: String,
    pub logo_url: Option<String>,
    pub website_url: Option<String>,
    pub description: Option<String>,
    pub headquarters_country: Option<String>,
    pub founded_year: Option<i32>,
    pub is_active: bool,
}

impl NewBank {
    pub fn new(name: &str, slug: &str) -> Self {
        NewBank {
            name: name.to_string(),
            slug: slug.to_string(),
            logo_url: None,
            website_url: None,
            description: None,
            headquarters_country: None,
            founded_year: None,
            is_active: true,
        }
    }
}

/// Partial update; `None` leaves a column unchanged
#[derive(Debug, Clone, Default)]
pub struct BankUpdate {
    pub name: Option<String>,
    pub logo_url: Option<String>,
    pub website_url: Option<String>,
    pub description: Option<String>,
    pub headquarters_country: Option<String>,
    pub founded_year: Option<i32>,
    pub is_active: Option<bool>,
}

const BANK_COLUMNS: &str = "id, name, slug, logo_url, website_url, description,
    headquarters_country, founded_year, is_active, created_at, updated_at";

fn bank_from_row(row: &Row<'_>) -> rusqlite::Result<Bank> {
    Ok(Bank {
        id: row.get(0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
        logo_url: row.get(3)?,
        website_url: row.get(4)?,
        description: row.get(5)?,
        headquarters_country: row.get(6)?,
        founded_year: row.get(7)?,
        is_active: row.get(8)?,
        created_at: get_time(row, 9)?,
        updated_at: get_time(row, 10)?,
    })
}

fn write_bank(conn: &Connection, sql: &str, bank: &Bank) -> Result<usize> {
    let changed = conn.execute(
        sql,
        params![
            bank.id,
            bank.name,
            bank.slug,
            bank.logo_url,
            bank.website_url,
            bank.description,
            bank.headquarters_country,
            bank.founded_year,
            bank.is_active,
            to_db_time(&bank.created_at),
            to_db_time(&bank.updated_at),
        ],
    )?;
    Ok(changed)
}

pub fn insert_bank(conn: &Connection, new: NewBank) -> Result<Bank> {
    let created_at = now();
    let bank = Bank {
        id: new_id(),
        name: new.name,
        slug: new.slug,
        logo_url: new.logo_url,
        website_url: new.website_url,
        description: new.description,
        headquarters_country: new.headquarters_country,
        founded_year: new.founded_year,
        is_active: new.is_active,
        created_at,
        updated_at: created_at,
    };

    write_bank(
        conn,
        &format!(
            "INSERT INTO bank ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            BANK_COLUMNS
        ),
        &bank,
    )?;
    Ok(bank)
}

pub fn get_bank(conn: &Connection, id: &str) -> Result<Bank> {
    conn.query_row(
        &format!("SELECT {} FROM bank WHERE id = ?1", BANK_COLUMNS),
        [id],
        bank_from_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found("bank", id))
}

pub fn find_bank_by_slug(conn: &Connection, slug: &str) -> Result<Option<Bank>> {
    let bank = conn
        .query_row(
            &format!("SELECT {} FROM bank WHERE slug = ?1", BANK_COLUMNS),
            [slug],
            bank_from_row,
        )
        .optional()?;
    Ok(bank)
}

pub fn list_banks(conn: &Connection, active_only: bool) -> Result<Vec<Bank>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM bank WHERE (?1 = 0 OR is_active = 1) ORDER BY name",
        BANK_COLUMNS
    ))?;
    let banks = stmt
        .query_map([active_only], bank_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(banks)
}

/// Apply `changes` and refresh `updated_at`
pub fn update_bank(conn: &Connection, id: &str, changes: BankUpdate) -> Result<Bank> {
    let mut bank = get_bank(conn, id)?;

    if let Some(name) = changes.name {
        bank.name = name;
    }
    if changes.logo_url.is_some() {
        bank.logo_url = changes.logo_url;
    }
    if changes.website_url.is_some() {
        bank.website_url = changes.website_url;
    }
    if changes.description.is_some() {
        bank.description = changes.description;
    }
    if changes.headquarters_country.is_some() {
        bank.headquarters_country = changes.headquarters_country;
    }
    if changes.founded_year.is_some() {
        bank.founded_year = changes.founded_year;
    }
    if let Some(active) = changes.is_active {
        bank.is_active = active;
    }
    bank.updated_at = now();

    write_bank(
        conn,
        "UPDATE bank SET
            name = ?2, slug = ?3, logo_url = ?4, website_url = ?5, description = ?6,
            headquarters_country = ?7, founded_year = ?8, is_active = ?9,
            created_at = ?10, updated_at = ?11
         WHERE id = ?1",
        &bank,
    )?;
    Ok(bank)
}

/// Delete a bank and, through cascades, its services and everything they own
pub fn delete_bank(conn: &Connection, id: &str) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM bank WHERE id = ?1", [id])?;
    if deleted > 0 {
        info!(bank_id = %id, "bank deleted");
    }
    Ok(deleted > 0)
}

// ============================================================================
// BANK SERVICE
// ============================================================================

/// A product offered by a bank (an account, a card, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankService {
    pub id: String,
    pub bank_id: String,
    pub name: String,
    /// Unique within the owning bank
    pub slug: String,
    pub type_id: String,
    pub logo_url: Option<String>,
    pub monthly_fee_cents: i64,
    pub setup_fee_cents: i64,
    pub minimum_balance_cents: i64,
    pub description: Option<String>,
    pub pros: Vec<String>,
    pub cons: Vec<String>,
    pub features: Vec<String>,
    pub rating: Decimal,
    pub review_count: i64,
    pub is_featured: bool,
    pub is_active: bool,
    pub data_last_updated: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewBankService {
    pub bank_id: String,
    pub name: String,
    pub slug: String,
    pub type_id: String,
    pub logo_url: Option<String>,
    pub monthly_fee_cents: i64,
    pub setup_fee_cents: i64,
    pub minimum_balance_cents: i64,
    pub description: Option<String>,
    pub pros: Vec<String>,
    pub cons: Vec<String>,
    pub features: Vec<String>,
    pub rating: Decimal,
    pub is_featured: bool,
    pub is_active: bool,
}

impl NewBankService {
    pub fn new(bank_id: &str, name: &str, slug: &str, type_id: &str) -> Self {
        NewBankService {
            bank_id: bank_id.to_string(),
            name: name.to_string(),
            slug: slug.to_string(),
            type_id: type_id.to_string(),
            logo_url: None,
            monthly_fee_cents: 0,
            setup_fee_cents: 0,
            minimum_balance_cents: 0,
            description: None,
            pros: Vec::new(),
            cons: Vec::new(),
            features: Vec::new(),
            rating: Decimal::ZERO,
            is_featured: false,
            is_active: true,
        }
    }
}

pub(crate) const SERVICE_COLUMNS: &str = "id, bank_id, name, slug, type_id, logo_url,
    monthly_fee_cents, setup_fee_cents, minimum_balance_cents, description,
    pros, cons, features, rating, review_count, is_featured, is_active,
    data_last_updated, created_at, updated_at";

pub(crate) fn service_from_row(row: &Row<'_>) -> rusqlite::Result<BankService> {
    Ok(BankService {
        id: row.get(0)?,
        bank_id: row.get(1)?,
        name: row.get(2)?,
        slug: row.get(3)?,
        type_id: row.get(4)?,
        logo_url: row.get(5)?,
        monthly_fee_cents: row.get(6)?,
        setup_fee_cents: row.get(7)?,
        minimum_balance_cents: row.get(8)?,
        description: row.get(9)?,
        pros: get_json(row, 10)?,
        cons: get_json(row, 11)?,
        features: get_json(row, 12)?,
        rating: get_decimal(row, 13, RATING_SCALE)?,
        review_count: row.get(14)?,
        is_featured: row.get(15)?,
        is_active: row.get(16)?,
        data_last_updated: get_time(row, 17)?,
        created_at: get_time(row, 18)?,
        updated_at: get_time(row, 19)?,
    })
}

pub fn insert_service(conn: &Connection, new: NewBankService) -> Result<BankService> {
    let created_at = now();
    let service = BankService {
        id: new_id(),
        bank_id: new.bank_id,
        name: new.name,
        slug: new.slug,
        type_id: new.type_id,
        logo_url: new.logo_url,
        monthly_fee_cents: new.monthly_fee_cents,
        setup_fee_cents: new.setup_fee_cents,
        minimum_balance_cents: new.minimum_balance_cents,
        description: new.description,
        pros: new.pros,
        cons: new.cons,
        features: new.features,
        rating: round_decimal(new.rating, RATING_SCALE),
        review_count: 0,
        is_featured: new.is_featured,
        is_active: new.is_active,
        data_last_updated: created_at,
        created_at,
        updated_at: created_at,
    };

    conn.execute(
        &format!(
            "INSERT INTO bank_service ({}) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20
            )",
            SERVICE_COLUMNS
        ),
        params![
            service.id,
            service.bank_id,
            service.name,
            service.slug,
            service.type_id,
            service.logo_url,
            service.monthly_fee_cents,
            service.setup_fee_cents,
            service.minimum_balance_cents,
            service.description,
            to_json(&service.pros)?,
            to_json(&service.cons)?,
            to_json(&service.features)?,
            decimal_to_db(&service.rating),
            service.review_count,
            service.is_featured,
            service.is_active,
            to_db_time(&service.data_last_updated),
            to_db_time(&service.created_at),
            to_db_time(&service.updated_at),
        ],
    )?;

    Ok(service)
}

pub fn get_service(conn: &Connection, id: &str) -> Result<BankService> {
    conn.query_row(
        &format!("SELECT {} FROM bank_service WHERE id = ?1", SERVICE_COLUMNS),
        [id],
        service_from_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found("bank_service", id))
}

/// Look a service up by its per-bank slug
pub fn find_service(conn: &Connection, bank_id: &str, slug: &str) -> Result<Option<BankService>> {
    let service = conn
        .query_row(
            &format!(
                "SELECT {} FROM bank_service WHERE bank_id = ?1 AND slug = ?2",
                SERVICE_COLUMNS
            ),
            [bank_id, slug],
            service_from_row,
        )
        .optional()?;
    Ok(service)
}

pub fn services_for_bank(conn: &Connection, bank_id: &str) -> Result<Vec<BankService>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM bank_service WHERE bank_id = ?1 ORDER BY name",
        SERVICE_COLUMNS
    ))?;
    let services = stmt
        .query_map([bank_id], service_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(services)
}

/// Active services of one type, best rated first, cheapest breaking ties
pub fn services_by_type(conn: &Connection, type_id: &str) -> Result<Vec<BankService>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM bank_service
         WHERE type_id = ?1 AND is_active = 1
         ORDER BY rating DESC, monthly_fee_cents ASC, name",
        SERVICE_COLUMNS
    ))?;
    let services = stmt
        .query_map([type_id], service_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(services)
}

pub fn service_bank(conn: &Connection, service: &BankService) -> Result<Bank> {
    get_bank(conn, &service.bank_id)
}

pub fn service_type(conn: &Connection, service: &BankService) -> Result<BankType> {
    get_bank_type(conn, &service.type_id)
}

/// Store a recomputed rating and review count; refreshes `updated_at` and
/// `data_last_updated`
pub fn update_service_stats(
    conn: &Connection,
    id: &str,
    rating: Decimal,
    review_count: i64,
) -> Result<BankService> {
    let stamp = to_db_time(&now());
    let changed = conn.execute(
        "UPDATE bank_service
         SET rating = ?1, review_count = ?2, updated_at = ?3, data_last_updated = ?3
         WHERE id = ?4",
        params![
            decimal_to_db(&round_decimal(rating, RATING_SCALE)),
            review_count,
            stamp,
            id
        ],
    )?;
    if changed == 0 {
        return Err(StoreError::not_found("bank_service", id));
    }
    get_service(conn, id)
}

/// A service with its owning bank, type and child rows
#[derive(Debug, Clone, Serialize)]
pub struct ServiceWithRelations {
    pub service: BankService,
    pub bank: Bank,
    pub bank_type: BankType,
    pub reviews: Vec<ServiceReview>,
    pub feature_values: Vec<FeatureValueWithFeature>,
    pub pricing_history: Vec<ServicePricingHistory>,
}

pub fn service_with_relations(conn: &Connection, id: &str) -> Result<ServiceWithRelations> {
    let service = get_service(conn, id)?;
    Ok(ServiceWithRelations {
        bank: service_bank(conn, &service)?,
        bank_type: service_type(conn, &service)?,
        reviews: reviews_for_service(conn, id, false)?,
        feature_values: feature_values_for_service(conn, id)?,
        pricing_history: pricing_history_for_service(conn, id)?,
        service,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{count_rows, fixtures};
    use chrono::Duration;
    use std::str::FromStr;

    #[test]
    fn test_bank_slug_unique() {
        let conn = fixtures::conn();
        insert_bank(&conn, NewBank::new("First Bank", "first")).unwrap();

        let err = insert_bank(&conn, NewBank::new("First Bank Again", "first")).unwrap_err();
        match err {
            StoreError::UniqueViolation { constraint } => assert_eq!(constraint, "bank.slug"),
            other => panic!("expected unique violation, got {other:?}"),
        }
    }

    #[test]
    fn test_service_slug_unique_per_bank_only() {
        let conn = fixtures::conn();
        let a = fixtures::bank(&conn, "a");
        let b = fixtures::bank(&conn, "b");

        fixtures::service(&conn, &a, "everyday");
        let dup = insert_service(&conn, NewBankService::new(&a, "Everyday 2", "everyday", "checking"))
            .unwrap_err();
        assert!(dup.is_unique_violation());

        // Same slug under another bank is fine
        fixtures::service(&conn, &b, "everyday");
        assert_eq!(count_rows(&conn, "bank_service").unwrap(), 2);
        assert!(find_service(&conn, &a, "everyday").unwrap().is_some());
        assert!(find_service(&conn, &b, "everyday").unwrap().is_some());
    }

    #[test]
    fn test_service_requires_known_bank_and_type() {
        let conn = fixtures::conn();
        let bank_id = fixtures::bank(&conn, "a");

        let no_type = insert_service(&conn, NewBankService::new(&bank_id, "X", "x", "nope")).unwrap_err();
        assert!(no_type.is_foreign_key_violation());

        fixtures::checking_type(&conn);
        let no_bank = insert_service(&conn, NewBankService::new("ghost", "X", "x", "checking")).unwrap_err();
        assert!(no_bank.is_foreign_key_violation());
    }

    #[test]
    fn test_bank_type_in_use_cannot_be_deleted() {
        let conn = fixtures::conn();
        let bank_id = fixtures::bank(&conn, "a");
        fixtures::service(&conn, &bank_id, "x");

        let err = delete_bank_type(&conn, "checking").unwrap_err();
        assert!(err.is_foreign_key_violation());

        delete_bank(&conn, &bank_id).unwrap();
        assert!(delete_bank_type(&conn, "checking").unwrap());
    }

    #[test]
    fn test_bank_types_sorted_and_upserted() {
        let conn = fixtures::conn();
        for (id, name, order) in [("savings", "Savings", 2), ("checking", "Checking", 1), ("loan", "Loan", 2)] {
            upsert_bank_type(
                &conn,
                &BankType {
                    id: id.to_string(),
                    name: name.to_string(),
                    description: None,
                    sort_order: Some(order),
                },
            )
            .unwrap();
        }
        upsert_bank_type(
            &conn,
            &BankType {
                id: "loan".to_string(),
                name: "Loans".to_string(),
                description: Some("Personal loans".to_string()),
                sort_order: Some(0),
            },
        )
        .unwrap();

        let ids: Vec<String> = list_bank_types(&conn).unwrap().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["loan", "checking", "savings"]);
        assert_eq!(get_bank_type(&conn, "loan").unwrap().name, "Loans");
    }

    #[test]
    fn test_bank_type_sort_order_can_be_null() {
        let conn = fixtures::conn();
        let mut bank_type = BankType {
            id: "savings".to_string(),
            name: "Savings".to_string(),
            description: None,
            sort_order: Some(3),
        };
        upsert_bank_type(&conn, &bank_type).unwrap();
        bank_type.sort_order = None;
        upsert_bank_type(&conn, &bank_type).unwrap();
        upsert_bank_type(
            &conn,
            &BankType {
                id: "atm".to_string(),
                name: "ATM".to_string(),
                description: None,
                sort_order: None,
            },
        )
        .unwrap();

        assert_eq!(get_bank_type(&conn, "savings").unwrap().sort_order, None);
        assert_eq!(get_bank_type(&conn, "atm").unwrap().sort_order, None);

        let ids: Vec<String> = list_bank_types(&conn).unwrap().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["atm", "savings"]);
    }

    #[test]
    fn test_service_defaults_and_round_trip() {
        let conn = fixtures::conn();
        let bank_id = fixtures::bank(&conn, "a");
        fixtures::checking_type(&conn);

        let mut new = NewBankService::new(&bank_id, "Everyday", "everyday", "checking");
        new.monthly_fee_cents = 495;
        new.pros = vec!["No overdraft fees".to_string()];
        new.rating = Decimal::from_str("4.25").unwrap();
        let service = insert_service(&conn, new).unwrap();

        assert_eq!(service.rating, Decimal::from_str("4.3").unwrap());
        assert_eq!(service.review_count, 0);
        assert!(service.is_active);
        assert_eq!(get_service(&conn, &service.id).unwrap(), service);
    }

    #[test]
    fn test_raw_service_insert_gets_defaults() {
        let conn = fixtures::conn();
        let bank_id = fixtures::bank(&conn, "a");
        fixtures::checking_type(&conn);
        conn.execute(
            "INSERT INTO bank_service (id, bank_id, name, slug, type_id)
             VALUES ('svc', ?1, 'Raw', 'raw', 'checking')",
            [&bank_id],
        )
        .unwrap();

        let service = get_service(&conn, "svc").unwrap();
        assert_eq!(service.monthly_fee_cents, 0);
        assert_eq!(service.rating, Decimal::ZERO);
        assert!(service.pros.is_empty());
        assert!(!service.is_featured);
    }

    #[test]
    fn test_rating_out_of_range_rejected() {
        let conn = fixtures::conn();
        let bank_id = fixtures::bank(&conn, "a");
        fixtures::checking_type(&conn);
        let mut new = NewBankService::new(&bank_id, "Everyday", "everyday", "checking");
        new.rating = Decimal::from(12);
        assert!(insert_service(&conn, new).unwrap_err().is_check_violation());
    }

    #[test]
    fn test_update_bank_refreshes_updated_at() {
        let conn = fixtures::conn();
        let bank = insert_bank(&conn, NewBank::new("Old Name", "old")).unwrap();
        let stale = bank.updated_at - Duration::minutes(1);
        conn.execute(
            "UPDATE bank SET updated_at = ?1 WHERE id = ?2",
            params![to_db_time(&stale), bank.id],
        )
        .unwrap();

        let updated = update_bank(
            &conn,
            &bank.id,
            BankUpdate {
                name: Some("New Name".to_string()),
                is_active: Some(false),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(updated.name, "New Name");
        assert!(!updated.is_active);
        assert!(updated.updated_at > stale);
        assert_eq!(get_bank(&conn, &bank.id).unwrap(), updated);
        assert!(list_banks(&conn, true).unwrap().is_empty());
        assert_eq!(list_banks(&conn, false).unwrap().len(), 1);
    }

    #[test]
    fn test_services_by_type_ordering() {
        let conn = fixtures::conn();
        let bank_id = fixtures::bank(&conn, "a");
        fixtures::checking_type(&conn);

        for (slug, rating, fee) in [("cheap", "4.0", 0), ("best", "4.8", 900), ("pricey", "4.0", 1500)] {
            let mut new = NewBankService::new(&bank_id, slug, slug, "checking");
            new.rating = Decimal::from_str(rating).unwrap();
            new.monthly_fee_cents = fee;
            insert_service(&conn, new).unwrap();
        }

        let slugs: Vec<String> = services_by_type(&conn, "checking")
            .unwrap()
            .into_iter()
            .map(|s| s.slug)
            .collect();
        assert_eq!(slugs, vec!["best", "cheap", "pricey"]);
    }

    #[test]
    fn test_update_service_stats() {
        let conn = fixtures::conn();
        let bank_id = fixtures::bank(&conn, "a");
        let service_id = fixtures::service(&conn, &bank_id, "x");

        let updated = update_service_stats(&conn, &service_id, Decimal::from_str("3.66").unwrap(), 3).unwrap();
        assert_eq!(updated.rating, Decimal::from_str("3.7").unwrap());
        assert_eq!(updated.review_count, 3);
        assert_eq!(updated.updated_at, updated.data_last_updated);
    }

    #[test]
    fn test_service_with_relations() {
        use crate::entities::feature::{insert_feature, insert_feature_value, NewServiceFeature, NewServiceFeatureValue};
        use crate::entities::pricing::{insert_pricing_entry, FeeSchedule, NewPricingEntry};
        use crate::entities::review::{insert_review, NewServiceReview};

        let conn = fixtures::conn();
        let bank_id = fixtures::bank(&conn, "a");
        let service_id = fixtures::service(&conn, &bank_id, "x");
        let feature = insert_feature(&conn, NewServiceFeature::new("Mobile deposit", None)).unwrap();

        insert_review(&conn, NewServiceReview::new(&service_id, None, 5)).unwrap();
        insert_feature_value(&conn, NewServiceFeatureValue::boolean(&service_id, &feature.id, true)).unwrap();
        insert_pricing_entry(&conn, NewPricingEntry::new(&service_id, FeeSchedule::default())).unwrap();

        let loaded = service_with_relations(&conn, &service_id).unwrap();
        assert_eq!(loaded.bank.id, bank_id);
        assert_eq!(loaded.bank_type.id, "checking");
        assert_eq!(loaded.reviews.len(), 1);
        assert_eq!(loaded.feature_values[0].feature.name, "Mobile deposit");
        assert_eq!(loaded.pricing_history.len(), 1);
    }
}
