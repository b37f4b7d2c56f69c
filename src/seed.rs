// 🌱 Reference data and catalogue import
//
// Bank types are fixed reference rows. The catalogue CSV carries one line per
// service with its bank repeated on every line; banks are matched by slug and
// services by (bank, slug), so importing the same file twice is a no-op.

use crate::entities::bank::{find_bank_by_slug, find_service, insert_bank, insert_service, upsert_bank_type};
use crate::entities::bank::{BankType, NewBank, NewBankService};
use crate::error::Result;
use rusqlite::Connection;
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

/// (id, display name, sort order)
pub const DEFAULT_BANK_TYPES: &[(&str, &str, i64)] = &[
    ("checking", "Checking Account", 1),
    ("savings", "Savings Account", 2),
    ("credit-card", "Credit Card", 3),
    ("business", "Business Account", 4),
    ("investment", "Investment Account", 5),
    ("loan", "Loan", 6),
    ("digital-wallet", "Digital Wallet", 7),
];

/// Insert or refresh the standard bank types. Returns how many were written.
pub fn seed_bank_types(conn: &Connection) -> Result<usize> {
    for (id, name, sort_order) in DEFAULT_BANK_TYPES {
        upsert_bank_type(
            conn,
            &BankType {
                id: id.to_string(),
                name: name.to_string(),
                description: None,
                sort_order: Some(*sort_order),
            },
        )?;
    }
    info!(count = DEFAULT_BANK_TYPES.len(), "bank types seeded");
    Ok(DEFAULT_BANK_TYPES.len())
}

/// One CSV line of the service catalogue
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CatalogRow {
    pub bank_name: String,
    /// Derived from `bank_name` when empty
    pub bank_slug: Option<String>,
    pub country: Option<String>,
    pub founded_year: Option<i32>,
    pub service_name: String,
    /// Derived from `service_name` when empty
    pub service_slug: Option<String>,
    pub type_id: String,
    pub monthly_fee_cents: Option<i64>,
    pub setup_fee_cents: Option<i64>,
    pub minimum_balance_cents: Option<i64>,
}

impl CatalogRow {
    fn bank_slug(&self) -> String {
        slug_or_derived(&self.bank_slug, &self.bank_name)
    }

    fn service_slug(&self) -> String {
        slug_or_derived(&self.service_slug, &self.service_name)
    }
}

fn slug_or_derived(slug: &Option<String>, name: &str) -> String {
    match slug.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => slugify(name),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub rows: usize,
    pub banks_created: usize,
    pub services_created: usize,
    pub services_skipped: usize,
}

/// Lowercase ASCII alphanumerics joined by single dashes
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

pub fn load_catalog(csv_path: &Path) -> Result<Vec<CatalogRow>> {
    let mut rdr = csv::Reader::from_path(csv_path)?;

    let mut rows = Vec::new();
    for result in rdr.deserialize() {
        let row: CatalogRow = result?;
        rows.push(row);
    }

    debug!(path = %csv_path.display(), rows = rows.len(), "catalogue loaded");
    Ok(rows)
}

/// Create missing banks and services in one transaction. Existing rows are
/// left as they are. Any failure (unknown type, bad country code) rolls the
/// whole import back.
pub fn import_catalog(conn: &mut Connection, rows: &[CatalogRow]) -> Result<ImportSummary> {
    let tx = conn.transaction()?;
    let mut summary = ImportSummary {
        rows: rows.len(),
        ..Default::default()
    };

    for row in rows {
        let bank_slug = row.bank_slug();
        let bank = match find_bank_by_slug(&tx, &bank_slug)? {
            Some(bank) => bank,
            None => {
                let mut new = NewBank::new(row.bank_name.trim(), &bank_slug);
                new.headquarters_country = row.country.clone();
                new.founded_year = row.founded_year;
                summary.banks_created += 1;
                insert_bank(&tx, new)?
            }
        };

        let service_slug = row.service_slug();
        if find_service(&tx, &bank.id, &service_slug)?.is_some() {
            summary.services_skipped += 1;
            continue;
        }

        let mut new = NewBankService::new(&bank.id, row.service_name.trim(), &service_slug, &row.type_id);
        new.monthly_fee_cents = row.monthly_fee_cents.unwrap_or(0);
        new.setup_fee_cents = row.setup_fee_cents.unwrap_or(0);
        new.minimum_balance_cents = row.minimum_balance_cents.unwrap_or(0);
        insert_service(&tx, new)?;
        summary.services_created += 1;
    }

    tx.commit()?;

    info!(
        rows = summary.rows,
        banks_created = summary.banks_created,
        services_created = summary.services_created,
        services_skipped = summary.services_skipped,
        "catalogue imported"
    );
    Ok(summary)
}
