// 💸 Service pricing history
//
// Each row is the fee schedule of a service over [effective_from,
// effective_to). The open row (effective_to NULL) is the current price and
// mirrors the fee columns on `bank_service`.

use crate::db::{get_opt_time, get_time, new_id, now, opt_db_time, to_db_time};
use crate::error::{Result, StoreError};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::info;

/// The three fee columns of a service, in cents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub monthly_fee_cents: i64,
    pub setup_fee_cents: i64,
    pub minimum_balance_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServicePricingHistory {
    pub id: String,
    pub service_id: String,
    pub monthly_fee_cents: Option<i64>,
    pub setup_fee_cents: Option<i64>,
    pub minimum_balance_cents: Option<i64>,
    pub effective_from: DateTime<Utc>,
    /// NULL while this is the price in force
    pub effective_to: Option<DateTime<Utc>>,
    pub change_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ServicePricingHistory {
    pub fn is_open(&self) -> bool {
        self.effective_to.is_none()
    }

    pub fn in_effect_at(&self, at: DateTime<Utc>) -> bool {
        self.effective_from <= at && self.effective_to.map_or(true, |to| at < to)
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewPricingEntry {
    pub service_id: String,
    pub monthly_fee_cents: Option<i64>,
    pub setup_fee_cents: Option<i64>,
    pub minimum_balance_cents: Option<i64>,
    /// Defaults to now
    pub effective_from: Option<DateTime<Utc>>,
    pub effective_to: Option<DateTime<Utc>>,
    pub change_reason: Option<String>,
}

impl NewPricingEntry {
    pub fn new(service_id: &str, fees: FeeSchedule) -> Self {
        NewPricingEntry {
            service_id: service_id.to_string(),
            monthly_fee_cents: Some(fees.monthly_fee_cents),
            setup_fee_cents: Some(fees.setup_fee_cents),
            minimum_balance_cents: Some(fees.minimum_balance_cents),
            ..Default::default()
        }
    }
}

const PRICING_COLUMNS: &str = "id, service_id, monthly_fee_cents, setup_fee_cents, minimum_balance_cents, \
     effective_from, effective_to, change_reason, created_at";

fn pricing_from_row(row: &Row<'_>) -> rusqlite::Result<ServicePricingHistory> {
    Ok(ServicePricingHistory {
        id: row.get(0)?,
        service_id: row.get(1)?,
        monthly_fee_cents: row.get(2)?,
        setup_fee_cents: row.get(3)?,
        minimum_balance_cents: row.get(4)?,
        effective_from: get_time(row, 5)?,
        effective_to: get_opt_time(row, 6)?,
        change_reason: row.get(7)?,
        created_at: get_time(row, 8)?,
    })
}

pub fn insert_pricing_entry(conn: &Connection, new: NewPricingEntry) -> Result<ServicePricingHistory> {
    let created_at = now();
    let entry = ServicePricingHistory {
        id: new_id(),
        service_id: new.service_id,
        monthly_fee_cents: new.monthly_fee_cents,
        setup_fee_cents: new.setup_fee_cents,
        minimum_balance_cents: new.minimum_balance_cents,
        effective_from: new.effective_from.unwrap_or(created_at),
        effective_to: new.effective_to,
        change_reason: new.change_reason,
        created_at,
    };

    conn.execute(
        &format!(
            "INSERT INTO service_pricing_history ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            PRICING_COLUMNS
        ),
        params![
            entry.id,
            entry.service_id,
            entry.monthly_fee_cents,
            entry.setup_fee_cents,
            entry.minimum_balance_cents,
            to_db_time(&entry.effective_from),
            opt_db_time(&entry.effective_to),
            entry.change_reason,
            to_db_time(&entry.created_at),
        ],
    )?;

    Ok(entry)
}

/// Newest `effective_from` first
pub fn pricing_history_for_service(conn: &Connection, service_id: &str) -> Result<Vec<ServicePricingHistory>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM service_pricing_history WHERE service_id = ?1
         ORDER BY effective_from DESC, rowid DESC",
        PRICING_COLUMNS
    ))?;
    let history = stmt
        .query_map([service_id], pricing_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(history)
}

/// The open history row, if the service has one
pub fn current_pricing(conn: &Connection, service_id: &str) -> Result<Option<ServicePricingHistory>> {
    let entry = conn
        .query_row(
            &format!(
                "SELECT {} FROM service_pricing_history
                 WHERE service_id = ?1 AND effective_to IS NULL
                 ORDER BY effective_from DESC, rowid DESC LIMIT 1",
                PRICING_COLUMNS
            ),
            [service_id],
            pricing_from_row,
        )
        .optional()?;
    Ok(entry)
}

/// Change a service's fees as of `at`.
///
/// Closes the open history row, opens a new one and rewrites the service's
/// fee columns, all or nothing. `at` must be later than the open row's
/// `effective_from`, otherwise the closed range would be empty or inverted.
pub fn record_price_change(
    conn: &mut Connection,
    service_id: &str,
    fees: FeeSchedule,
    reason: Option<&str>,
    at: DateTime<Utc>,
) -> Result<ServicePricingHistory> {
    let tx = conn.transaction()?;
    let stamp = to_db_time(&at);

    if let Some(open) = current_pricing(&tx, service_id)? {
        if at <= open.effective_from {
            return Err(StoreError::CheckViolation {
                detail: format!(
                    "price change at {} does not follow open pricing from {}",
                    stamp,
                    to_db_time(&open.effective_from)
                ),
            });
        }
    }

    let updated = tx.execute(
        "UPDATE bank_service
         SET monthly_fee_cents = ?1, setup_fee_cents = ?2, minimum_balance_cents = ?3,
             updated_at = ?4, data_last_updated = ?4
         WHERE id = ?5",
        params![
            fees.monthly_fee_cents,
            fees.setup_fee_cents,
            fees.minimum_balance_cents,
            stamp,
            service_id,
        ],
    )?;
    if updated == 0 {
        return Err(StoreError::not_found("bank_service", service_id));
    }

    let closed = tx.execute(
        "UPDATE service_pricing_history SET effective_to = ?1
         WHERE service_id = ?2 AND effective_to IS NULL",
        params![stamp, service_id],
    )?;

    let mut entry = NewPricingEntry::new(service_id, fees);
    entry.effective_from = Some(at);
    entry.change_reason = reason.map(str::to_string);
    let entry = insert_pricing_entry(&tx, entry)?;

    tx.commit()?;

    info!(
        service_id = %service_id,
        monthly_fee_cents = fees.monthly_fee_cents,
        closed,
        "price change recorded"
    );
    Ok(entry)
}
