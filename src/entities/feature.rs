// 🧩 Comparable feature dimensions and each service's value for them
//
// `value` keeps the text as entered; `numeric_value` mirrors it as a
// decimal(15,2) so services can be sorted on a feature. One value per
// (service, feature) pair.

use crate::db::{decimal_to_db, get_opt_decimal, new_id, round_decimal};
use crate::entities::bank::{get_service, BankService};
use crate::enums::FeatureValueType;
use crate::error::{Result, StoreError};
use rust_decimal::Decimal;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// decimal(15,2)
pub const NUMERIC_SCALE: u32 = 2;

// ============================================================================
// SERVICE FEATURE (catalog)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceFeature {
    pub id: String,
    /// Unique across the catalog
    pub name: String,
    pub category: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub is_premium_feature: bool,
    pub sort_order: i64,
}

#[derive(Debug, Clone, Default)]
pub struct NewServiceFeature {
    pub name: String,
    pub category: Option<String>,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub is_premium_feature: bool,
    pub sort_order: i64,
}

impl NewServiceFeature {
    pub fn new(name: &str, category: Option<&str>) -> Self {
        NewServiceFeature {
            name: name.to_string(),
            category: category.map(str::to_string),
            ..Default::default()
        }
    }
}

fn feature_from_row(row: &Row<'_>) -> rusqlite::Result<ServiceFeature> {
    Ok(ServiceFeature {
        id: row.get(0)?,
        name: row.get(1)?,
        category: row.get(2)?,
        description: row.get(3)?,
        icon: row.get(4)?,
        is_premium_feature: row.get(5)?,
        sort_order: row.get(6)?,
    })
}

pub fn insert_feature(conn: &Connection, new: NewServiceFeature) -> Result<ServiceFeature> {
    let feature = ServiceFeature {
        id: new_id(),
        name: new.name,
        category: new.category,
        description: new.description,
        icon: new.icon,
        is_premium_feature: new.is_premium_feature,
        sort_order: new.sort_order,
    };

    conn.execute(
        "INSERT INTO service_feature (id, name, category, description, icon, is_premium_feature, sort_order)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            feature.id,
            feature.name,
            feature.category,
            feature.description,
            feature.icon,
            feature.is_premium_feature,
            feature.sort_order,
        ],
    )?;

    Ok(feature)
}

pub fn find_feature_by_name(conn: &Connection, name: &str) -> Result<Option<ServiceFeature>> {
    let feature = conn
        .query_row(
            "SELECT id, name, category, description, icon, is_premium_feature, sort_order
             FROM service_feature WHERE name = ?1",
            [name],
            feature_from_row,
        )
        .optional()?;
    Ok(feature)
}

pub fn features_in_category(conn: &Connection, category: &str) -> Result<Vec<ServiceFeature>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, category, description, icon, is_premium_feature, sort_order
         FROM service_feature WHERE category = ?1
         ORDER BY sort_order, name",
    )?;
    let features = stmt
        .query_map([category], feature_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(features)
}

// ============================================================================
// SERVICE FEATURE VALUE
// ============================================================================

/// A feature value read according to its `value_type`
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Boolean(bool),
    Text(String),
    Number(Decimal),
    Cents(i64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceFeatureValue {
    pub id: String,
    pub service_id: String,
    pub feature_id: String,
    pub value: Option<String>,
    pub value_type: FeatureValueType,
    pub numeric_value: Option<Decimal>,
    pub is_available: bool,
    pub notes: Option<String>,
}

impl ServiceFeatureValue {
    /// Parse `value` by `value_type`. `None` when there is no value or the
    /// text does not fit the declared type.
    pub fn typed(&self) -> Option<TypedValue> {
        let text = self.value.as_deref()?;
        match self.value_type {
            FeatureValueType::Boolean => match text {
                "true" => Some(TypedValue::Boolean(true)),
                "false" => Some(TypedValue::Boolean(false)),
                _ => None,
            },
            FeatureValueType::String => Some(TypedValue::Text(text.to_string())),
            FeatureValueType::Number => Decimal::from_str(text).ok().map(TypedValue::Number),
            FeatureValueType::Currency => text.parse().ok().map(TypedValue::Cents),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewServiceFeatureValue {
    pub service_id: String,
    pub feature_id: String,
    pub value: Option<String>,
    pub value_type: FeatureValueType,
    pub numeric_value: Option<Decimal>,
    pub is_available: bool,
    pub notes: Option<String>,
}

impl NewServiceFeatureValue {
    fn base(service_id: &str, feature_id: &str, value_type: FeatureValueType) -> Self {
        NewServiceFeatureValue {
            service_id: service_id.to_string(),
            feature_id: feature_id.to_string(),
            value: None,
            value_type,
            numeric_value: None,
            is_available: true,
            notes: None,
        }
    }

    /// Mirror is 1 / 0 so "has it" sorts above "doesn't"
    pub fn boolean(service_id: &str, feature_id: &str, value: bool) -> Self {
        NewServiceFeatureValue {
            value: Some(value.to_string()),
            numeric_value: Some(if value { Decimal::ONE } else { Decimal::ZERO }),
            ..Self::base(service_id, feature_id, FeatureValueType::Boolean)
        }
    }

    pub fn text(service_id: &str, feature_id: &str, value: &str) -> Self {
        NewServiceFeatureValue {
            value: Some(value.to_string()),
            ..Self::base(service_id, feature_id, FeatureValueType::String)
        }
    }

    pub fn number(service_id: &str, feature_id: &str, value: Decimal) -> Self {
        NewServiceFeatureValue {
            value: Some(value.to_string()),
            numeric_value: Some(round_decimal(value, NUMERIC_SCALE)),
            ..Self::base(service_id, feature_id, FeatureValueType::Number)
        }
    }

    /// `value` holds integer cents; the mirror holds whole currency units
    pub fn currency_cents(service_id: &str, feature_id: &str, cents: i64) -> Self {
        NewServiceFeatureValue {
            value: Some(cents.to_string()),
            numeric_value: Some(Decimal::new(cents, NUMERIC_SCALE)),
            ..Self::base(service_id, feature_id, FeatureValueType::Currency)
        }
    }

    /// The service does not offer this feature at all
    pub fn unavailable(mut self) -> Self {
        self.is_available = false;
        self
    }
}

const VALUE_COLUMNS: &str =
    "id, service_id, feature_id, value, value_type, numeric_value, is_available, notes";

fn value_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<ServiceFeatureValue> {
    Ok(ServiceFeatureValue {
        id: row.get(offset)?,
        service_id: row.get(offset + 1)?,
        feature_id: row.get(offset + 2)?,
        value: row.get(offset + 3)?,
        value_type: row.get(offset + 4)?,
        numeric_value: get_opt_decimal(row, offset + 5, NUMERIC_SCALE)?,
        is_available: row.get(offset + 6)?,
        notes: row.get(offset + 7)?,
    })
}

pub fn insert_feature_value(conn: &Connection, new: NewServiceFeatureValue) -> Result<ServiceFeatureValue> {
    let value = ServiceFeatureValue {
        id: new_id(),
        service_id: new.service_id,
        feature_id: new.feature_id,
        value: new.value,
        value_type: new.value_type,
        numeric_value: new.numeric_value.map(|d| round_decimal(d, NUMERIC_SCALE)),
        is_available: new.is_available,
        notes: new.notes,
    };

    conn.execute(
        &format!(
            "INSERT INTO service_feature_value ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            VALUE_COLUMNS
        ),
        params![
            value.id,
            value.service_id,
            value.feature_id,
            value.value,
            value.value_type,
            value.numeric_value.as_ref().and_then(decimal_to_db),
            value.is_available,
            value.notes,
        ],
    )?;

    Ok(value)
}

/// A value together with the catalog entry it belongs to
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureValueWithFeature {
    pub feature: ServiceFeature,
    pub value: ServiceFeatureValue,
}

/// Every feature value of a service, in catalog order
pub fn feature_values_for_service(conn: &Connection, service_id: &str) -> Result<Vec<FeatureValueWithFeature>> {
    let mut stmt = conn.prepare(
        "SELECT f.id, f.name, f.category, f.description, f.icon, f.is_premium_feature, f.sort_order,
                v.id, v.service_id, v.feature_id, v.value, v.value_type, v.numeric_value,
                v.is_available, v.notes
         FROM service_feature_value v
         JOIN service_feature f ON f.id = v.feature_id
         WHERE v.service_id = ?1
         ORDER BY f.sort_order, f.name",
    )?;

    let values = stmt
        .query_map([service_id], |row| {
            Ok(FeatureValueWithFeature {
                feature: feature_from_row(row)?,
                value: value_from_row(row, 7)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(values)
}

pub fn get_feature_value(conn: &Connection, service_id: &str, feature_id: &str) -> Result<ServiceFeatureValue> {
    conn.query_row(
        &format!(
            "SELECT {} FROM service_feature_value WHERE service_id = ?1 AND feature_id = ?2",
            VALUE_COLUMNS
        ),
        [service_id, feature_id],
        |row| value_from_row(row, 0),
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found("service_feature_value", format!("{}/{}", service_id, feature_id)))
}

/// A service and its value for the feature it was ranked on
#[derive(Debug, Clone, Serialize)]
pub struct RankedService {
    pub service: BankService,
    pub value: ServiceFeatureValue,
}

/// Services offering a feature, ordered by the numeric mirror.
/// Values without a mirror sort last either way.
pub fn services_ranked_by_feature(
    conn: &Connection,
    feature_id: &str,
    descending: bool,
) -> Result<Vec<RankedService>> {
    let order = if descending { "DESC" } else { "ASC" };
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM service_feature_value
         WHERE feature_id = ?1 AND is_available = 1
         ORDER BY numeric_value {} NULLS LAST, service_id",
        VALUE_COLUMNS, order
    ))?;

    let values = stmt
        .query_map([feature_id], |row| value_from_row(row, 0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    values
        .into_iter()
        .map(|value| {
            Ok(RankedService {
                service: get_service(conn, &value.service_id)?,
                value,
            })
        })
        .collect()
}
