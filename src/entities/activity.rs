// 📈 User activity log
//
// Append-only. Anonymous visitors are tracked by session token with no user;
// rows of a deleted user go with the user.

use crate::db::{get_json, get_time, new_id, now, to_db_time, to_json};
use crate::error::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserActivity {
    pub id: String,
    pub user_id: Option<String>,
    pub session_token: Option<String>,
    /// e.g. `view_service`, `compare`, `search`
    pub activity_type: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub metadata: Map<String, Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewUserActivity {
    pub user_id: Option<String>,
    pub session_token: Option<String>,
    pub activity_type: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub metadata: Map<String, Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl NewUserActivity {
    pub fn new(activity_type: &str) -> Self {
        NewUserActivity {
            activity_type: activity_type.to_string(),
            ..Default::default()
        }
    }

    pub fn by_user(mut self, user_id: &str) -> Self {
        self.user_id = Some(user_id.to_string());
        self
    }

    pub fn on(mut self, resource_type: &str, resource_id: &str) -> Self {
        self.resource_type = Some(resource_type.to_string());
        self.resource_id = Some(resource_id.to_string());
        self
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

const ACTIVITY_COLUMNS: &str = "id, user_id, session_token, activity_type, resource_type, resource_id, \
     metadata, ip_address, user_agent, created_at";

fn activity_from_row(row: &Row<'_>) -> rusqlite::Result<UserActivity> {
    Ok(UserActivity {
        id: row.get(0)?,
        user_id: row.get(1)?,
        session_token: row.get(2)?,
        activity_type: row.get(3)?,
        resource_type: row.get(4)?,
        resource_id: row.get(5)?,
        metadata: get_json(row, 6)?,
        ip_address: row.get(7)?,
        user_agent: row.get(8)?,
        created_at: get_time(row, 9)?,
    })
}

pub fn insert_activity(conn: &Connection, new: NewUserActivity) -> Result<UserActivity> {
    let activity = UserActivity {
        id: new_id(),
        user_id: new.user_id,
        session_token: new.session_token,
        activity_type: new.activity_type,
        resource_type: new.resource_type,
        resource_id: new.resource_id,
        metadata: new.metadata,
        ip_address: new.ip_address,
        user_agent: new.user_agent,
        created_at: now(),
    };

    conn.execute(
        &format!(
            "INSERT INTO user_activity ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            ACTIVITY_COLUMNS
        ),
        params![
            activity.id,
            activity.user_id,
            activity.session_token,
            activity.activity_type,
            activity.resource_type,
            activity.resource_id,
            to_json(&activity.metadata)?,
            activity.ip_address,
            activity.user_agent,
            to_db_time(&activity.created_at),
        ],
    )?;

    Ok(activity)
}

/// LIMIT value for an optional cap; -1 is "no limit" in SQLite
fn sql_limit(limit: Option<usize>) -> i64 {
    limit.map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX))
}

/// Newest first, optionally capped
pub fn activities_for_user(conn: &Connection, user_id: &str, limit: Option<usize>) -> Result<Vec<UserActivity>> {
    let limit = sql_limit(limit);
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM user_activity WHERE user_id = ?1
         ORDER BY created_at DESC, rowid DESC LIMIT ?2",
        ACTIVITY_COLUMNS
    ))?;
    let activities = stmt
        .query_map(params![user_id, limit], activity_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(activities)
}

pub fn activities_by_type(conn: &Connection, activity_type: &str) -> Result<Vec<UserActivity>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM user_activity WHERE activity_type = ?1
         ORDER BY created_at DESC, rowid DESC",
        ACTIVITY_COLUMNS
    ))?;
    let activities = stmt
        .query_map([activity_type], activity_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(activities)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{count_rows, fixtures};
    use crate::entities::user::delete_user;

    #[test]
    fn test_metadata_defaults_to_empty_object() {
        let conn = fixtures::conn();
        conn.execute(
            "INSERT INTO user_activity (id, activity_type) VALUES ('a1', 'search')",
            [],
        )
        .unwrap();

        let metadata: String = conn
            .query_row("SELECT metadata FROM user_activity WHERE id = 'a1'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(metadata, "{}");

        let found = activities_by_type(&conn, "search").unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].metadata.is_empty());
        assert_eq!(found[0].user_id, None);
    }

    #[test]
    fn test_newest_first_with_limit() {
        let conn = fixtures::conn();
        let user_id = fixtures::user(&conn, "act@example.com");

        for step in 0..3 {
            insert_activity(
                &conn,
                NewUserActivity::new("view_service")
                    .by_user(&user_id)
                    .on("bank_service", "svc")
                    .with_meta("step", step),
            )
            .unwrap();
        }

        let all = activities_for_user(&conn, &user_id, None).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].metadata["step"], 2);

        let latest = activities_for_user(&conn, &user_id, Some(1)).unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].id, all[0].id);

        assert!(activities_for_user(&conn, &user_id, Some(0)).unwrap().is_empty());
        assert_eq!(activities_for_user(&conn, &user_id, Some(usize::MAX)).unwrap().len(), 3);
    }

    #[test]
    fn test_huge_limit_never_goes_negative() {
        assert_eq!(sql_limit(None), -1);
        assert_eq!(sql_limit(Some(0)), 0);
        assert_eq!(sql_limit(Some(25)), 25);
        assert!(sql_limit(Some(usize::MAX)) > 0);
    }

    #[test]
    fn test_activity_type_length_checked() {
        let conn = fixtures::conn();
        let err = insert_activity(&conn, NewUserActivity::new(&"x".repeat(51))).unwrap_err();
        assert!(err.is_check_violation());
    }

    #[test]
    fn test_deleting_user_removes_activity() {
        let conn = fixtures::conn();
        let user_id = fixtures::user(&conn, "act@example.com");
        insert_activity(&conn, NewUserActivity::new("login").by_user(&user_id)).unwrap();
        insert_activity(&conn, NewUserActivity::new("search")).unwrap();

        delete_user(&conn, &user_id).unwrap();
        assert_eq!(count_rows(&conn, "user_activity").unwrap(), 1);
    }
}
