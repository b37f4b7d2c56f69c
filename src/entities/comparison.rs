// ⚖️ Comparisons
//
// A comparison session is the short-lived, possibly anonymous basket of
// services a visitor is looking at. It expires 7 days after creation unless
// told otherwise and survives its user's deletion with `user_id` NULL.
//
// Advanced comparisons are the saved, premium analyses. They belong to a user
// and go with them.

use crate::db::{get_json, get_time, new_id, now, to_db_time, to_json};
use crate::enums::{MetricComparison, MetricTrend};
use crate::error::{Result, StoreError};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Lifetime of a comparison session when no expiry is given
pub const SESSION_TTL_DAYS: i64 = 7;

// ============================================================================
// COMPARISON SESSION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonSession {
    pub id: String,
    pub user_id: Option<String>,
    pub session_token: Option<String>,
    pub service_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ComparisonSession {
    pub fn is_expired_at(&self, at: DateTime<Utc>) -> bool {
        self.expires_at <= at
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewComparisonSession {
    pub user_id: Option<String>,
    pub session_token: Option<String>,
    pub service_ids: Vec<String>,
    /// Defaults to creation time + 7 days
    pub expires_at: Option<DateTime<Utc>>,
}

impl NewComparisonSession {
    pub fn anonymous(session_token: &str, service_ids: Vec<String>) -> Self {
        NewComparisonSession {
            session_token: Some(session_token.to_string()),
            service_ids,
            ..Default::default()
        }
    }

    pub fn for_user(user_id: &str, service_ids: Vec<String>) -> Self {
        NewComparisonSession {
            user_id: Some(user_id.to_string()),
            service_ids,
            ..Default::default()
        }
    }
}

const SESSION_COLUMNS: &str = "id, user_id, session_token, service_ids, created_at, expires_at";

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<ComparisonSession> {
    Ok(ComparisonSession {
        id: row.get(0)?,
        user_id: row.get(1)?,
        session_token: row.get(2)?,
        service_ids: get_json(row, 3)?,
        created_at: get_time(row, 4)?,
        expires_at: get_time(row, 5)?,
    })
}

pub fn insert_comparison_session(conn: &Connection, new: NewComparisonSession) -> Result<ComparisonSession> {
    let created_at = now();
    let session = ComparisonSession {
        id: new_id(),
        user_id: new.user_id,
        session_token: new.session_token,
        service_ids: new.service_ids,
        created_at,
        expires_at: new
            .expires_at
            .unwrap_or(created_at + Duration::days(SESSION_TTL_DAYS)),
    };

    conn.execute(
        &format!(
            "INSERT INTO comparison_session ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            SESSION_COLUMNS
        ),
        params![
            session.id,
            session.user_id,
            session.session_token,
            to_json(&session.service_ids)?,
            to_db_time(&session.created_at),
            to_db_time(&session.expires_at),
        ],
    )?;

    debug!(
        session_id = %session.id,
        services = session.service_ids.len(),
        "comparison session started"
    );
    Ok(session)
}

pub fn get_comparison_session(conn: &Connection, id: &str) -> Result<ComparisonSession> {
    conn.query_row(
        &format!("SELECT {} FROM comparison_session WHERE id = ?1", SESSION_COLUMNS),
        [id],
        session_from_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found("comparison_session", id))
}

/// Latest session for a token. The token column is indexed, not unique.
pub fn find_comparison_session_by_token(conn: &Connection, token: &str) -> Result<Option<ComparisonSession>> {
    let session = conn
        .query_row(
            &format!(
                "SELECT {} FROM comparison_session WHERE session_token = ?1
                 ORDER BY created_at DESC, rowid DESC LIMIT 1",
                SESSION_COLUMNS
            ),
            [token],
            session_from_row,
        )
        .optional()?;
    Ok(session)
}

/// Delete sessions whose expiry is at or before `at`
pub fn purge_expired_sessions(conn: &Connection, at: DateTime<Utc>) -> Result<usize> {
    let purged = conn.execute(
        "DELETE FROM comparison_session WHERE expires_at <= ?1",
        [to_db_time(&at)],
    )?;
    info!(purged, cutoff = %to_db_time(&at), "expired comparison sessions purged");
    Ok(purged)
}

// ============================================================================
// ADVANCED COMPARISON
// ============================================================================

/// One metric row of an advanced comparison, stored inside its JSON array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonMetric {
    pub name: String,
    pub value: f64,
    pub unit: String,
    pub trend: MetricTrend,
    pub comparison: MetricComparison,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvancedComparison {
    pub id: String,
    pub user_id: String,
    pub title: Option<String>,
    pub service_ids: Vec<String>,
    pub metrics: Vec<ComparisonMetric>,
    pub insights: Vec<String>,
    pub recommendations: Vec<String>,
    pub is_saved: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewAdvancedComparison {
    pub user_id: String,
    pub title: Option<String>,
    pub service_ids: Vec<String>,
    pub metrics: Vec<ComparisonMetric>,
    pub insights: Vec<String>,
    pub recommendations: Vec<String>,
    pub is_saved: bool,
    /// Backfills keep their original timestamp
    pub created_at: Option<DateTime<Utc>>,
}

impl NewAdvancedComparison {
    pub fn new(user_id: &str, service_ids: Vec<String>) -> Self {
        NewAdvancedComparison {
            user_id: user_id.to_string(),
            service_ids,
            ..Default::default()
        }
    }
}

const ADVANCED_COLUMNS: &str = "id, user_id, title, service_ids, metrics, insights, recommendations, \
     is_saved, created_at, updated_at";

fn advanced_from_row(row: &Row<'_>) -> rusqlite::Result<AdvancedComparison> {
    Ok(AdvancedComparison {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        service_ids: get_json(row, 3)?,
        metrics: get_json(row, 4)?,
        insights: get_json(row, 5)?,
        recommendations: get_json(row, 6)?,
        is_saved: row.get(7)?,
        created_at: get_time(row, 8)?,
        updated_at: get_time(row, 9)?,
    })
}

/// Metric values must be finite; JSON has no NaN or infinity
pub fn insert_advanced_comparison(conn: &Connection, new: NewAdvancedComparison) -> Result<AdvancedComparison> {
    if let Some(bad) = new.metrics.iter().find(|m| !m.value.is_finite()) {
        return Err(StoreError::CheckViolation {
            detail: format!("metric {:?} has non-finite value {}", bad.name, bad.value),
        });
    }

    let created_at = new.created_at.unwrap_or_else(now);
    let comparison = AdvancedComparison {
        id: new_id(),
        user_id: new.user_id,
        title: new.title,
        service_ids: new.service_ids,
        metrics: new.metrics,
        insights: new.insights,
        recommendations: new.recommendations,
        is_saved: new.is_saved,
        created_at,
        updated_at: created_at,
    };

    conn.execute(
        &format!(
            "INSERT INTO advanced_comparison ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            ADVANCED_COLUMNS
        ),
        params![
            comparison.id,
            comparison.user_id,
            comparison.title,
            to_json(&comparison.service_ids)?,
            to_json(&comparison.metrics)?,
            to_json(&comparison.insights)?,
            to_json(&comparison.recommendations)?,
            comparison.is_saved,
            to_db_time(&comparison.created_at),
            to_db_time(&comparison.updated_at),
        ],
    )?;

    Ok(comparison)
}

pub fn get_advanced_comparison(conn: &Connection, id: &str) -> Result<AdvancedComparison> {
    conn.query_row(
        &format!("SELECT {} FROM advanced_comparison WHERE id = ?1", ADVANCED_COLUMNS),
        [id],
        advanced_from_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found("advanced_comparison", id))
}

/// Newest first
pub fn comparisons_for_user(conn: &Connection, user_id: &str) -> Result<Vec<AdvancedComparison>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM advanced_comparison WHERE user_id = ?1
         ORDER BY created_at DESC, rowid DESC",
        ADVANCED_COLUMNS
    ))?;
    let comparisons = stmt
        .query_map([user_id], advanced_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(comparisons)
}

pub fn set_comparison_saved(conn: &Connection, id: &str, saved: bool) -> Result<AdvancedComparison> {
    let changed = conn.execute(
        "UPDATE advanced_comparison SET is_saved = ?1, updated_at = ?2 WHERE id = ?3",
        params![saved, to_db_time(&now()), id],
    )?;
    if changed == 0 {
        return Err(StoreError::not_found("advanced_comparison", id));
    }
    get_advanced_comparison(conn, id)
}
