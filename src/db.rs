use crate::error::{Result, StoreError};
use crate::schema::{setup_database, TABLES};
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use rusqlite::types::Type;
use rusqlite::{Connection, Row};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// Open (or create) a database and bring its schema up to date.
/// `:memory:` opens a private in-memory database.
pub fn open_database(path: &Path) -> Result<Connection> {
    let conn = if path.as_os_str() == ":memory:" {
        Connection::open_in_memory()?
    } else {
        Connection::open(path)?
    };
    setup_database(&conn)?;
    info!(path = %path.display(), "database opened");
    Ok(conn)
}

/// Fresh v4 UUID for primary keys
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ============================================================================
// TIMESTAMPS
// Stored as RFC 3339 UTC text, millisecond precision, same shape as the SQL
// column defaults produce.
// ============================================================================

/// Current time at storage precision
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

pub fn to_db_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn opt_db_time(time: &Option<DateTime<Utc>>) -> Option<String> {
    time.as_ref().map(to_db_time)
}

pub fn parse_db_time(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StoreError::InvalidTimestamp(text.to_string()))
}

fn conversion_error(idx: usize, err: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

pub fn get_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    parse_db_time(&text).map_err(|e| conversion_error(idx, e))
}

pub fn get_opt_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| parse_db_time(&t).map_err(|e| conversion_error(idx, e)))
        .transpose()
}

// ============================================================================
// JSON COLUMNS
// ============================================================================

pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// Decode a nullable JSON column; NULL becomes `T::default()`
pub fn get_json<T: DeserializeOwned + Default>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: Option<String> = row.get(idx)?;
    match text {
        Some(json) => serde_json::from_str(&json).map_err(|e| conversion_error(idx, e)),
        None => Ok(T::default()),
    }
}

// ============================================================================
// DECIMAL COLUMNS
// NUMERIC affinity keeps them sortable; Rust sees exact decimals at the
// column's declared scale.
// ============================================================================

/// Round to a column's declared scale, halves away from zero
pub fn round_decimal(value: Decimal, scale: u32) -> Decimal {
    value.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero)
}

pub fn decimal_to_db(value: &Decimal) -> Option<f64> {
    value.to_f64()
}

pub fn get_decimal(row: &Row<'_>, idx: usize, scale: u32) -> rusqlite::Result<Decimal> {
    let raw: f64 = row.get(idx)?;
    Decimal::from_f64(raw)
        .map(|d| round_decimal(d, scale))
        .ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                Type::Real,
                format!("{} is not representable as a decimal", raw).into(),
            )
        })
}

pub fn get_opt_decimal(row: &Row<'_>, idx: usize, scale: u32) -> rusqlite::Result<Option<Decimal>> {
    let raw: Option<f64> = row.get(idx)?;
    Ok(raw.and_then(Decimal::from_f64).map(|d| round_decimal(d, scale)))
}

// ============================================================================
// STATS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableCount {
    pub table: &'static str,
    pub rows: i64,
}

/// Row count for every table in the schema
pub fn table_counts(conn: &Connection) -> Result<Vec<TableCount>> {
    TABLES
        .iter()
        .map(|table| -> Result<TableCount> {
            let rows: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
            Ok(TableCount { table: *table, rows })
        })
        .collect()
}

pub fn count_rows(conn: &Connection, table: &str) -> Result<i64> {
    if !TABLES.contains(&table) {
        return Err(StoreError::not_found("table", table));
    }
    let rows = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
    Ok(rows)
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::entities::bank::{insert_bank, insert_service, upsert_bank_type, BankType, NewBank, NewBankService};
    use crate::entities::user::{insert_user, NewUser};

    pub fn conn() -> Connection {
        open_database(Path::new(":memory:")).unwrap()
    }

    pub fn user(conn: &Connection, email: &str) -> String {
        insert_user(conn, NewUser::new("Test User", email)).unwrap().id
    }

    pub fn checking_type(conn: &Connection) -> String {
        upsert_bank_type(
            conn,
            &BankType {
                id: "checking".to_string(),
                name: "Checking".to_string(),
                description: None,
                sort_order: Some(1),
            },
        )
        .unwrap();
        "checking".to_string()
    }

    pub fn bank(conn: &Connection, slug: &str) -> String {
        insert_bank(conn, NewBank::new(&format!("Bank {}", slug), slug)).unwrap().id
    }

    pub fn service(conn: &Connection, bank_id: &str, slug: &str) -> String {
        let type_id = checking_type(conn);
        insert_service(conn, NewBankService::new(bank_id, &format!("Service {}", slug), slug, &type_id))
            .unwrap()
            .id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_round_trip_at_millis() {
        let t = now();
        let stored = to_db_time(&t);
        assert!(stored.ends_with('Z'));
        assert_eq!(parse_db_time(&stored).unwrap(), t);
    }

    #[test]
    fn test_sql_default_timestamps_parse() {
        let conn = fixtures::conn();
        let text: String = conn
            .query_row("SELECT strftime('%Y-%m-%dT%H:%M:%fZ', 'now')", [], |row| row.get(0))
            .unwrap();
        assert!(parse_db_time(&text).is_ok(), "{}", text);
    }

    #[test]
    fn test_decimal_halves_round_away_from_zero() {
        assert_eq!(round_decimal(Decimal::new(425, 2), 1), Decimal::new(43, 1));
        assert_eq!(round_decimal(Decimal::new(435, 2), 1), Decimal::new(44, 1));
        assert_eq!(round_decimal(Decimal::new(-1005, 3), 2), Decimal::new(-101, 2));
        assert_eq!(round_decimal(Decimal::new(1234, 3), 2), Decimal::new(123, 2));
    }

    #[test]
    fn test_bad_timestamp_rejected() {
        assert!(matches!(
            parse_db_time("yesterday"),
            Err(StoreError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_table_counts_cover_schema() {
        let conn = fixtures::conn();
        fixtures::user(&conn, "a@example.com");

        let counts = table_counts(&conn).unwrap();
        assert_eq!(counts.len(), TABLES.len());
        let users = counts.iter().find(|c| c.table == "user").unwrap();
        assert_eq!(users.rows, 1);
        assert_eq!(count_rows(&conn, "bank").unwrap(), 0);
        assert!(count_rows(&conn, "sqlite_master").is_err());
    }

    #[test]
    fn test_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("compare.db");

        {
            let conn = open_database(&path).unwrap();
            fixtures::user(&conn, "persist@example.com");
        }

        let conn = open_database(&path).unwrap();
        assert_eq!(count_rows(&conn, "user").unwrap(), 1);
        let mode: String = conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }
}
