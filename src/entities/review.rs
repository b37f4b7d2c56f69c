// ⭐ Service reviews
//
// Reviews belong to their service (deleted with it) but only reference their
// author: deleting the user keeps the review with `user_id` NULL.

use crate::db::{get_json, get_time, new_id, now, to_db_time, to_json};
use crate::error::{Result, StoreError};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceReview {
    pub id: String,
    pub service_id: String,
    /// NULL once the author's account is gone
    pub user_id: Option<String>,
    pub rating: i64,
    pub title: Option<String>,
    pub content: Option<String>,
    pub pros: Vec<String>,
    pub cons: Vec<String>,
    pub verified_customer: bool,
    pub helpful_votes: i64,
    pub is_featured: bool,
    pub is_approved: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewServiceReview {
    pub service_id: String,
    pub user_id: Option<String>,
    pub rating: i64,
    pub title: Option<String>,
    pub content: Option<String>,
    pub pros: Vec<String>,
    pub cons: Vec<String>,
    pub verified_customer: bool,
}

impl NewServiceReview {
    pub fn new(service_id: &str, user_id: Option<&str>, rating: i64) -> Self {
        NewServiceReview {
            service_id: service_id.to_string(),
            user_id: user_id.map(str::to_string),
            rating,
            ..Default::default()
        }
    }
}

const REVIEW_COLUMNS: &str = "id, service_id, user_id, rating, title, content, pros, cons, \
     verified_customer, helpful_votes, is_featured, is_approved, created_at, updated_at";

fn review_from_row(row: &Row<'_>) -> rusqlite::Result<ServiceReview> {
    Ok(ServiceReview {
        id: row.get(0)?,
        service_id: row.get(1)?,
        user_id: row.get(2)?,
        rating: row.get(3)?,
        title: row.get(4)?,
        content: row.get(5)?,
        pros: get_json(row, 6)?,
        cons: get_json(row, 7)?,
        verified_customer: row.get(8)?,
        helpful_votes: row.get(9)?,
        is_featured: row.get(10)?,
        is_approved: row.get(11)?,
        created_at: get_time(row, 12)?,
        updated_at: get_time(row, 13)?,
    })
}

/// New reviews start unapproved, unfeatured, with no votes
pub fn insert_review(conn: &Connection, new: NewServiceReview) -> Result<ServiceReview> {
    let created_at = now();
    let review = ServiceReview {
        id: new_id(),
        service_id: new.service_id,
        user_id: new.user_id,
        rating: new.rating,
        title: new.title,
        content: new.content,
        pros: new.pros,
        cons: new.cons,
        verified_customer: new.verified_customer,
        helpful_votes: 0,
        is_featured: false,
        is_approved: false,
        created_at,
        updated_at: created_at,
    };

    conn.execute(
        &format!(
            "INSERT INTO service_review ({})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            REVIEW_COLUMNS
        ),
        params![
            review.id,
            review.service_id,
            review.user_id,
            review.rating,
            review.title,
            review.content,
            to_json(&review.pros)?,
            to_json(&review.cons)?,
            review.verified_customer,
            review.helpful_votes,
            review.is_featured,
            review.is_approved,
            to_db_time(&review.created_at),
            to_db_time(&review.updated_at),
        ],
    )?;

    debug!(review_id = %review.id, service_id = %review.service_id, rating = review.rating, "review stored");
    Ok(review)
}

pub fn get_review(conn: &Connection, id: &str) -> Result<ServiceReview> {
    conn.query_row(
        &format!("SELECT {} FROM service_review WHERE id = ?1", REVIEW_COLUMNS),
        [id],
        review_from_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found("service_review", id))
}

/// Newest first. Featured reviews lead when only approved ones are wanted.
pub fn reviews_for_service(conn: &Connection, service_id: &str, approved_only: bool) -> Result<Vec<ServiceReview>> {
    let sql = if approved_only {
        format!(
            "SELECT {} FROM service_review
             WHERE service_id = ?1 AND is_approved = 1
             ORDER BY is_featured DESC, created_at DESC, rowid DESC",
            REVIEW_COLUMNS
        )
    } else {
        format!(
            "SELECT {} FROM service_review
             WHERE service_id = ?1
             ORDER BY created_at DESC, rowid DESC",
            REVIEW_COLUMNS
        )
    };

    let mut stmt = conn.prepare(&sql)?;
    let reviews = stmt
        .query_map([service_id], review_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(reviews)
}

pub fn reviews_by_user(conn: &Connection, user_id: &str) -> Result<Vec<ServiceReview>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM service_review WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC",
        REVIEW_COLUMNS
    ))?;
    let reviews = stmt
        .query_map([user_id], review_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(reviews)
}

fn touch_review(conn: &Connection, id: &str, set: &str) -> Result<ServiceReview> {
    let changed = conn.execute(
        &format!("UPDATE service_review SET {}, updated_at = ?1 WHERE id = ?2", set),
        params![to_db_time(&now()), id],
    )?;
    if changed == 0 {
        return Err(StoreError::not_found("service_review", id));
    }
    get_review(conn, id)
}

pub fn approve_review(conn: &Connection, id: &str) -> Result<ServiceReview> {
    let review = touch_review(conn, id, "is_approved = 1")?;
    debug!(review_id = %id, "review approved");
    Ok(review)
}

pub fn add_helpful_vote(conn: &Connection, id: &str) -> Result<ServiceReview> {
    touch_review(conn, id, "helpful_votes = helpful_votes + 1")
}
