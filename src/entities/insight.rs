// 📰 Market insight articles

use crate::db::{get_json, get_opt_time, get_time, new_id, now, opt_db_time, to_db_time, to_json};
use crate::enums::InsightCategory;
use crate::error::{Result, StoreError};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketInsight {
    pub id: String,
    pub title: String,
    /// Unique across all insights
    pub slug: String,
    pub content: String,
    pub excerpt: Option<String>,
    pub category: InsightCategory,
    pub is_premium: bool,
    pub author: Option<String>,
    pub featured_image_url: Option<String>,
    pub tags: Vec<String>,
    pub view_count: i64,
    pub is_published: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMarketInsight {
    pub title: String,
    pub slug: String,
    pub content: String,
    pub excerpt: Option<String>,
    pub category: InsightCategory,
    pub is_premium: bool,
    pub author: Option<String>,
    pub featured_image_url: Option<String>,
    pub tags: Vec<String>,
}

impl NewMarketInsight {
    pub fn new(title: &str, slug: &str, content: &str, category: InsightCategory) -> Self {
        NewMarketInsight {
            title: title.to_string(),
            slug: slug.to_string(),
            content: content.to_string(),
            excerpt: None,
            category,
            is_premium: false,
            author: None,
            featured_image_url: None,
            tags: Vec::new(),
        }
    }
}

const INSIGHT_COLUMNS: &str = "id, title, slug, content, excerpt, category, is_premium, author, \
     featured_image_url, tags, view_count, is_published, published_at, created_at, updated_at";

fn insight_from_row(row: &Row<'_>) -> rusqlite::Result<MarketInsight> {
    Ok(MarketInsight {
        id: row.get(0)?,
        title: row.get(1)?,
        slug: row.get(2)?,
        content: row.get(3)?,
        excerpt: row.get(4)?,
        category: row.get(5)?,
        is_premium: row.get(6)?,
        author: row.get(7)?,
        featured_image_url: row.get(8)?,
        tags: get_json(row, 9)?,
        view_count: row.get(10)?,
        is_published: row.get(11)?,
        published_at: get_opt_time(row, 12)?,
        created_at: get_time(row, 13)?,
        updated_at: get_time(row, 14)?,
    })
}

/// Drafts: unpublished, zero views
pub fn insert_insight(conn: &Connection, new: NewMarketInsight) -> Result<MarketInsight> {
    let created_at = now();
    let insight = MarketInsight {
        id: new_id(),
        title: new.title,
        slug: new.slug,
        content: new.content,
        excerpt: new.excerpt,
        category: new.category,
        is_premium: new.is_premium,
        author: new.author,
        featured_image_url: new.featured_image_url,
        tags: new.tags,
        view_count: 0,
        is_published: false,
        published_at: None,
        created_at,
        updated_at: created_at,
    };

    conn.execute(
        &format!(
            "INSERT INTO market_insight ({})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            INSIGHT_COLUMNS
        ),
        params![
            insight.id,
            insight.title,
            insight.slug,
            insight.content,
            insight.excerpt,
            insight.category,
            insight.is_premium,
            insight.author,
            insight.featured_image_url,
            to_json(&insight.tags)?,
            insight.view_count,
            insight.is_published,
            opt_db_time(&insight.published_at),
            to_db_time(&insight.created_at),
            to_db_time(&insight.updated_at),
        ],
    )?;

    Ok(insight)
}

pub fn get_insight(conn: &Connection, id: &str) -> Result<MarketInsight> {
    conn.query_row(
        &format!("SELECT {} FROM market_insight WHERE id = ?1", INSIGHT_COLUMNS),
        [id],
        insight_from_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found("market_insight", id))
}

pub fn find_insight_by_slug(conn: &Connection, slug: &str) -> Result<Option<MarketInsight>> {
    let insight = conn
        .query_row(
            &format!("SELECT {} FROM market_insight WHERE slug = ?1", INSIGHT_COLUMNS),
            [slug],
            insight_from_row,
        )
        .optional()?;
    Ok(insight)
}

pub fn publish_insight(conn: &Connection, id: &str, at: DateTime<Utc>) -> Result<MarketInsight> {
    let changed = conn.execute(
        "UPDATE market_insight SET is_published = 1, published_at = ?1, updated_at = ?2 WHERE id = ?3",
        params![to_db_time(&at), to_db_time(&now()), id],
    )?;
    if changed == 0 {
        return Err(StoreError::not_found("market_insight", id));
    }
    info!(insight_id = %id, published_at = %to_db_time(&at), "insight published");
    get_insight(conn, id)
}

/// Published insights, newest publication first
pub fn published_insights(
    conn: &Connection,
    category: Option<InsightCategory>,
    include_premium: bool,
) -> Result<Vec<MarketInsight>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM market_insight
         WHERE is_published = 1
           AND (?1 IS NULL OR category = ?1)
           AND (?2 = 1 OR is_premium = 0)
         ORDER BY published_at DESC, rowid DESC",
        INSIGHT_COLUMNS
    ))?;
    let insights = stmt
        .query_map(params![category, include_premium], insight_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(insights)
}

/// Bump the view counter. Does not touch `updated_at`.
pub fn record_insight_view(conn: &Connection, id: &str) -> Result<i64> {
    let changed = conn.execute(
        "UPDATE market_insight SET view_count = view_count + 1 WHERE id = ?1",
        [id],
    )?;
    if changed == 0 {
        return Err(StoreError::not_found("market_insight", id));
    }
    let views = conn.query_row(
        "SELECT view_count FROM market_insight WHERE id = ?1",
        [id],
        |row| row.get(0),
    )?;
    Ok(views)
}
