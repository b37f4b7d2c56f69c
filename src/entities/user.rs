// 👤 User + auth records
//
// `user`, `session`, `account` and `verification` belong to the external auth
// library. We model them so foreign keys and cascades can be enforced and so
// the rest of the data model can hang off `user.id`.
//
// Deleting a user cascades to sessions, accounts, subscriptions, advanced
// comparisons and activity; reviews and comparison sessions keep their rows
// with `user_id` set to NULL.

use crate::db::{get_opt_time, get_time, new_id, now, opt_db_time, to_db_time};
use crate::entities::activity::{activities_for_user, UserActivity};
use crate::entities::comparison::{comparisons_for_user, AdvancedComparison};
use crate::entities::review::{reviews_by_user, ServiceReview};
use crate::entities::subscription::{subscription_for_user, UserSubscription};
use crate::error::{Result, StoreError};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::info;

// ============================================================================
// USER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    /// Unique across all users
    pub email: String,
    pub email_verified: bool,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub email_verified: bool,
    pub image: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl NewUser {
    pub fn new(name: &str, email: &str) -> Self {
        NewUser {
            id: new_id(),
            name: name.to_string(),
            email: email.to_string(),
            email_verified: false,
            image: None,
            created_at: None,
        }
    }
}

const USER_COLUMNS: &str = "id, name, email, email_verified, image, created_at, updated_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        email_verified: row.get(3)?,
        image: row.get(4)?,
        created_at: get_time(row, 5)?,
        updated_at: get_time(row, 6)?,
    })
}

pub fn insert_user(conn: &Connection, new: NewUser) -> Result<User> {
    let created_at = new.created_at.unwrap_or_else(now);
    let user = User {
        id: new.id,
        name: new.name,
        email: new.email,
        email_verified: new.email_verified,
        image: new.image,
        created_at,
        updated_at: created_at,
    };

    conn.execute(
        "INSERT INTO user (id, name, email, email_verified, image, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            user.id,
            user.name,
            user.email,
            user.email_verified,
            user.image,
            to_db_time(&user.created_at),
            to_db_time(&user.updated_at),
        ],
    )?;

    Ok(user)
}

pub fn get_user(conn: &Connection, id: &str) -> Result<User> {
    conn.query_row(
        &format!("SELECT {} FROM user WHERE id = ?1", USER_COLUMNS),
        [id],
        user_from_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found("user", id))
}

pub fn find_user_by_email(conn: &Connection, email: &str) -> Result<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {} FROM user WHERE email = ?1", USER_COLUMNS),
            [email],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

pub fn set_email_verified(conn: &Connection, id: &str, verified: bool) -> Result<User> {
    let changed = conn.execute(
        "UPDATE user SET email_verified = ?1, updated_at = ?2 WHERE id = ?3",
        params![verified, to_db_time(&now()), id],
    )?;
    if changed == 0 {
        return Err(StoreError::not_found("user", id));
    }
    get_user(conn, id)
}

/// Delete a user; owned rows cascade, attributions are set to NULL.
/// Returns false when no such user existed.
pub fn delete_user(conn: &Connection, id: &str) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM user WHERE id = ?1", [id])?;
    if deleted > 0 {
        info!(user_id = %id, "user deleted");
    }
    Ok(deleted > 0)
}

/// A user with everything that hangs off it
#[derive(Debug, Clone, Serialize)]
pub struct UserWithRelations {
    pub user: User,
    pub subscription: Option<UserSubscription>,
    pub reviews: Vec<ServiceReview>,
    pub comparisons: Vec<AdvancedComparison>,
    pub activities: Vec<UserActivity>,
}

pub fn user_with_relations(conn: &Connection, id: &str) -> Result<UserWithRelations> {
    let user = get_user(conn, id)?;
    Ok(UserWithRelations {
        subscription: subscription_for_user(conn, id)?,
        reviews: reviews_by_user(conn, id)?,
        comparisons: comparisons_for_user(conn, id)?,
        activities: activities_for_user(conn, id, None)?,
        user,
    })
}

// ============================================================================
// SESSION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub expires_at: DateTime<Utc>,
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub user_id: String,
}

#[derive(Debug, Clone)]
pub struct NewSession {
    pub id: String,
    pub user_id: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl NewSession {
    pub fn new(user_id: &str, token: &str, expires_at: DateTime<Utc>) -> Self {
        NewSession {
            id: new_id(),
            user_id: user_id.to_string(),
            token: token.to_string(),
            expires_at,
            ip_address: None,
            user_agent: None,
        }
    }
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        expires_at: get_time(row, 1)?,
        token: row.get(2)?,
        created_at: get_time(row, 3)?,
        updated_at: get_time(row, 4)?,
        ip_address: row.get(5)?,
        user_agent: row.get(6)?,
        user_id: row.get(7)?,
    })
}

pub fn insert_session(conn: &Connection, new: NewSession) -> Result<Session> {
    let created_at = now();
    let session = Session {
        id: new.id,
        expires_at: new.expires_at,
        token: new.token,
        created_at,
        updated_at: created_at,
        ip_address: new.ip_address,
        user_agent: new.user_agent,
        user_id: new.user_id,
    };

    conn.execute(
        "INSERT INTO session (id, expires_at, token, created_at, updated_at, ip_address, user_agent, user_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            session.id,
            to_db_time(&session.expires_at),
            session.token,
            to_db_time(&session.created_at),
            to_db_time(&session.updated_at),
            session.ip_address,
            session.user_agent,
            session.user_id,
        ],
    )?;

    Ok(session)
}

pub fn find_session_by_token(conn: &Connection, token: &str) -> Result<Option<Session>> {
    let session = conn
        .query_row(
            "SELECT id, expires_at, token, created_at, updated_at, ip_address, user_agent, user_id
             FROM session WHERE token = ?1",
            [token],
            session_from_row,
        )
        .optional()?;
    Ok(session)
}

/// Remove sessions that expired at or before `at`
pub fn delete_expired_sessions(conn: &Connection, at: DateTime<Utc>) -> Result<usize> {
    let deleted = conn.execute("DELETE FROM session WHERE expires_at <= ?1", [to_db_time(&at)])?;
    Ok(deleted)
}

// ============================================================================
// ACCOUNT (credential per auth provider)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub account_id: String,
    pub provider_id: String,
    pub user_id: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    pub access_token_expires_at: Option<DateTime<Utc>>,
    pub refresh_token_expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
    /// Password hash for the credential provider; never plaintext
    pub password: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewAccount {
    pub account_id: String,
    pub provider_id: String,
    pub user_id: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    pub access_token_expires_at: Option<DateTime<Utc>>,
    pub refresh_token_expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
    pub password: Option<String>,
}

impl NewAccount {
    pub fn new(user_id: &str, provider_id: &str, account_id: &str) -> Self {
        NewAccount {
            account_id: account_id.to_string(),
            provider_id: provider_id.to_string(),
            user_id: user_id.to_string(),
            ..Default::default()
        }
    }
}

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        account_id: row.get(1)?,
        provider_id: row.get(2)?,
        user_id: row.get(3)?,
        access_token: row.get(4)?,
        refresh_token: row.get(5)?,
        id_token: row.get(6)?,
        access_token_expires_at: get_opt_time(row, 7)?,
        refresh_token_expires_at: get_opt_time(row, 8)?,
        scope: row.get(9)?,
        password: row.get(10)?,
        created_at: get_time(row, 11)?,
        updated_at: get_time(row, 12)?,
    })
}

pub fn insert_account(conn: &Connection, new: NewAccount) -> Result<Account> {
    let created_at = now();
    let account = Account {
        id: new_id(),
        account_id: new.account_id,
        provider_id: new.provider_id,
        user_id: new.user_id,
        access_token: new.access_token,
        refresh_token: new.refresh_token,
        id_token: new.id_token,
        access_token_expires_at: new.access_token_expires_at,
        refresh_token_expires_at: new.refresh_token_expires_at,
        scope: new.scope,
        password: new.password,
        created_at,
        updated_at: created_at,
    };

    conn.execute(
        "INSERT INTO account (
            id, account_id, provider_id, user_id, access_token, refresh_token, id_token,
            access_token_expires_at, refresh_token_expires_at, scope, password,
            created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            account.id,
            account.account_id,
            account.provider_id,
            account.user_id,
            account.access_token,
            account.refresh_token,
            account.id_token,
            opt_db_time(&account.access_token_expires_at),
            opt_db_time(&account.refresh_token_expires_at),
            account.scope,
            account.password,
            to_db_time(&account.created_at),
            to_db_time(&account.updated_at),
        ],
    )?;

    Ok(account)
}

pub fn accounts_for_user(conn: &Connection, user_id: &str) -> Result<Vec<Account>> {
    let mut stmt = conn.prepare(
        "SELECT id, account_id, provider_id, user_id, access_token, refresh_token, id_token,
                access_token_expires_at, refresh_token_expires_at, scope, password,
                created_at, updated_at
         FROM account
         WHERE user_id = ?1
         ORDER BY created_at",
    )?;

    let accounts = stmt
        .query_map([user_id], account_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(accounts)
}

// ============================================================================
// VERIFICATION (email / reset tokens)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verification {
    pub id: String,
    pub identifier: String,
    pub value: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

pub fn insert_verification(
    conn: &Connection,
    identifier: &str,
    value: &str,
    expires_at: DateTime<Utc>,
) -> Result<Verification> {
    let created_at = now();
    let verification = Verification {
        id: new_id(),
        identifier: identifier.to_string(),
        value: value.to_string(),
        expires_at,
        created_at: Some(created_at),
        updated_at: Some(created_at),
    };

    conn.execute(
        "INSERT INTO verification (id, identifier, value, expires_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            verification.id,
            verification.identifier,
            verification.value,
            to_db_time(&verification.expires_at),
            opt_db_time(&verification.created_at),
            opt_db_time(&verification.updated_at),
        ],
    )?;

    Ok(verification)
}

/// Latest verification for an identifier that has not expired at `at`
pub fn find_verification(
    conn: &Connection,
    identifier: &str,
    at: DateTime<Utc>,
) -> Result<Option<Verification>> {
    let verification = conn
        .query_row(
            "SELECT id, identifier, value, expires_at, created_at, updated_at
             FROM verification
             WHERE identifier = ?1 AND expires_at > ?2
             ORDER BY created_at DESC
             LIMIT 1",
            params![identifier, to_db_time(&at)],
            |row| {
                Ok(Verification {
                    id: row.get(0)?,
                    identifier: row.get(1)?,
                    value: row.get(2)?,
                    expires_at: get_time(row, 3)?,
                    created_at: get_opt_time(row, 4)?,
                    updated_at: get_opt_time(row, 5)?,
                })
            },
        )
        .optional()?;
    Ok(verification)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{count_rows, fixtures};
    use chrono::Duration;

    #[test]
    fn test_insert_and_fetch_user() {
        let conn = fixtures::conn();
        let user = insert_user(&conn, NewUser::new("Ada", "ada@example.com")).unwrap();

        assert!(!user.email_verified);
        assert_eq!(user.created_at, user.updated_at);
        assert_eq!(get_user(&conn, &user.id).unwrap(), user);
        assert_eq!(find_user_by_email(&conn, "ada@example.com").unwrap(), Some(user));
        assert_eq!(find_user_by_email(&conn, "nobody@example.com").unwrap(), None);
    }

    #[test]
    fn test_duplicate_email_is_unique_violation() {
        let conn = fixtures::conn();
        insert_user(&conn, NewUser::new("Ada", "ada@example.com")).unwrap();

        let err = insert_user(&conn, NewUser::new("Other Ada", "ada@example.com")).unwrap_err();
        match err {
            StoreError::UniqueViolation { constraint } => assert_eq!(constraint, "user.email"),
            other => panic!("expected unique violation, got {other:?}"),
        }
        assert_eq!(count_rows(&conn, "user").unwrap(), 1);
    }

    #[test]
    fn test_raw_insert_gets_defaults() {
        let conn = fixtures::conn();
        conn.execute(
            "INSERT INTO user (id, name, email) VALUES ('u1', 'Raw', 'raw@example.com')",
            [],
        )
        .unwrap();

        let user = get_user(&conn, "u1").unwrap();
        assert!(!user.email_verified);
        assert_eq!(user.created_at, user.updated_at);
    }

    #[test]
    fn test_set_email_verified_refreshes_updated_at() {
        let conn = fixtures::conn();
        let mut new = NewUser::new("Ada", "ada@example.com");
        new.created_at = Some(now() - Duration::hours(1));
        let user = insert_user(&conn, new).unwrap();

        let verified = set_email_verified(&conn, &user.id, true).unwrap();
        assert!(verified.email_verified);
        assert!(verified.updated_at > user.updated_at);
        assert_eq!(verified.created_at, user.created_at);

        assert!(matches!(
            set_email_verified(&conn, "missing", true),
            Err(StoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_session_requires_user_and_unique_token() {
        let conn = fixtures::conn();
        let user_id = fixtures::user(&conn, "s@example.com");
        let expires = now() + Duration::days(1);

        let session = insert_session(&conn, NewSession::new(&user_id, "tok", expires)).unwrap();
        assert_eq!(find_session_by_token(&conn, "tok").unwrap(), Some(session));

        let dup = insert_session(&conn, NewSession::new(&user_id, "tok", expires)).unwrap_err();
        assert!(dup.is_unique_violation());

        let orphan = insert_session(&conn, NewSession::new("ghost", "tok2", expires)).unwrap_err();
        assert!(orphan.is_foreign_key_violation());
    }

    #[test]
    fn test_delete_expired_sessions() {
        let conn = fixtures::conn();
        let user_id = fixtures::user(&conn, "s@example.com");
        let t = now();
        insert_session(&conn, NewSession::new(&user_id, "old", t - Duration::hours(1))).unwrap();
        insert_session(&conn, NewSession::new(&user_id, "new", t + Duration::hours(1))).unwrap();

        assert_eq!(delete_expired_sessions(&conn, t).unwrap(), 1);
        assert!(find_session_by_token(&conn, "old").unwrap().is_none());
        assert!(find_session_by_token(&conn, "new").unwrap().is_some());
    }

    #[test]
    fn test_accounts_and_verification() {
        let conn = fixtures::conn();
        let user_id = fixtures::user(&conn, "acct@example.com");

        let mut new = NewAccount::new(&user_id, "credential", &user_id);
        new.password = Some("$argon2id$hash".to_string());
        let account = insert_account(&conn, new).unwrap();
        assert_eq!(accounts_for_user(&conn, &user_id).unwrap(), vec![account]);

        let t = now();
        insert_verification(&conn, "acct@example.com", "123456", t + Duration::minutes(10)).unwrap();
        let found = find_verification(&conn, "acct@example.com", t).unwrap().unwrap();
        assert_eq!(found.value, "123456");
        assert!(find_verification(&conn, "acct@example.com", t + Duration::hours(1))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_delete_user_cascades_auth_rows() {
        let conn = fixtures::conn();
        let user_id = fixtures::user(&conn, "gone@example.com");
        insert_session(&conn, NewSession::new(&user_id, "tok", now())).unwrap();
        insert_account(&conn, NewAccount::new(&user_id, "github", "gh-1")).unwrap();

        assert!(delete_user(&conn, &user_id).unwrap());
        assert!(!delete_user(&conn, &user_id).unwrap());
        assert_eq!(count_rows(&conn, "session").unwrap(), 0);
        assert_eq!(count_rows(&conn, "account").unwrap(), 0);
    }

    #[test]
    fn test_user_with_relations() {
        use crate::entities::activity::{insert_activity, NewUserActivity};
        use crate::entities::comparison::{insert_advanced_comparison, NewAdvancedComparison};
        use crate::entities::review::{insert_review, NewServiceReview};
        use crate::entities::subscription::{insert_subscription, NewUserSubscription};

        let conn = fixtures::conn();
        let user_id = fixtures::user(&conn, "rel@example.com");
        let bank_id = fixtures::bank(&conn, "a");
        let service_id = fixtures::service(&conn, &bank_id, "x");

        insert_subscription(&conn, NewUserSubscription::new(&user_id)).unwrap();
        insert_review(&conn, NewServiceReview::new(&service_id, Some(&user_id), 4)).unwrap();
        insert_advanced_comparison(&conn, NewAdvancedComparison::new(&user_id, vec![service_id.clone()]))
            .unwrap();
        insert_activity(&conn, NewUserActivity::new("compare").by_user(&user_id)).unwrap();

        let loaded = user_with_relations(&conn, &user_id).unwrap();
        assert_eq!(loaded.user.email, "rel@example.com");
        assert!(loaded.subscription.is_some());
        assert_eq!(loaded.reviews.len(), 1);
        assert_eq!(loaded.comparisons.len(), 1);
        assert_eq!(loaded.activities.len(), 1);

        assert!(matches!(
            user_with_relations(&conn, "missing"),
            Err(StoreError::NotFound { entity: "user", .. })
        ));
    }
}
