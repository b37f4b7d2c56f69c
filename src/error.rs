// Store errors - constraint violations surfaced as domain errors
//
// SQLite reports every constraint failure as SQLITE_CONSTRAINT with an
// extended code telling us which kind. Callers match on these variants
// instead of parsing engine messages.

use rusqlite::ffi;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// UNIQUE or PRIMARY KEY constraint failed, e.g. `user.email`
    #[error("uniqueness violation on {constraint}")]
    UniqueViolation { constraint: String },

    #[error("foreign key violation")]
    ForeignKeyViolation,

    #[error("not-null violation on {column}")]
    NotNullViolation { column: String },

    /// CHECK constraint failed (enumerated columns, json_valid, varchar length)
    #[error("check violation: {detail}")]
    CheckViolation { detail: String },

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("invalid {kind} value: {value:?}")]
    InvalidEnum { kind: &'static str, value: String },

    #[error("invalid timestamp {0:?}")]
    InvalidTimestamp(String),

    #[error("json column error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sqlite error: {0}")]
    Sqlite(rusqlite::Error),
}

impl StoreError {
    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        StoreError::NotFound {
            entity,
            key: key.into(),
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, StoreError::UniqueViolation { .. })
    }

    pub fn is_foreign_key_violation(&self) -> bool {
        matches!(self, StoreError::ForeignKeyViolation)
    }

    pub fn is_check_violation(&self) -> bool {
        matches!(self, StoreError::CheckViolation { .. })
    }
}

/// Text after "... constraint failed: " in the SQLite message
fn constraint_detail(message: &Option<String>) -> String {
    message
        .as_deref()
        .map(|m| match m.split_once("failed: ") {
            Some((_, detail)) => detail.to_string(),
            None => m.to_string(),
        })
        .unwrap_or_default()
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(code, message) = &err {
            if code.code == rusqlite::ErrorCode::ConstraintViolation {
                match code.extended_code {
                    ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                        return StoreError::UniqueViolation {
                            constraint: constraint_detail(message),
                        };
                    }
                    ffi::SQLITE_CONSTRAINT_FOREIGNKEY => return StoreError::ForeignKeyViolation,
                    ffi::SQLITE_CONSTRAINT_NOTNULL => {
                        return StoreError::NotNullViolation {
                            column: constraint_detail(message),
                        };
                    }
                    ffi::SQLITE_CONSTRAINT_CHECK => {
                        return StoreError::CheckViolation {
                            detail: constraint_detail(message),
                        };
                    }
                    _ => {}
                }
            }
        }
        StoreError::Sqlite(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn scratch() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             CREATE TABLE parent (id TEXT PRIMARY KEY, name TEXT NOT NULL UNIQUE);
             CREATE TABLE child (
                 id TEXT PRIMARY KEY,
                 parent_id TEXT NOT NULL REFERENCES parent(id),
                 kind TEXT NOT NULL CHECK (kind IN ('a', 'b'))
             );",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_unique_violation_names_column() {
        let conn = scratch();
        conn.execute("INSERT INTO parent VALUES ('1', 'x')", []).unwrap();
        let err: StoreError = conn
            .execute("INSERT INTO parent VALUES ('2', 'x')", [])
            .unwrap_err()
            .into();

        match err {
            StoreError::UniqueViolation { constraint } => assert_eq!(constraint, "parent.name"),
            other => panic!("expected unique violation, got {other:?}"),
        }
    }

    #[test]
    fn test_primary_key_collision_is_unique_violation() {
        let conn = scratch();
        conn.execute("INSERT INTO parent VALUES ('1', 'x')", []).unwrap();
        let err: StoreError = conn
            .execute("INSERT INTO parent VALUES ('1', 'y')", [])
            .unwrap_err()
            .into();
        assert!(err.is_unique_violation());
    }

    #[test]
    fn test_foreign_key_and_check_and_not_null() {
        let conn = scratch();

        let fk: StoreError = conn
            .execute("INSERT INTO child VALUES ('c', 'missing', 'a')", [])
            .unwrap_err()
            .into();
        assert!(fk.is_foreign_key_violation());

        conn.execute("INSERT INTO parent VALUES ('1', 'x')", []).unwrap();
        let check: StoreError = conn
            .execute("INSERT INTO child VALUES ('c', '1', 'z')", [])
            .unwrap_err()
            .into();
        assert!(check.is_check_violation());

        let not_null: StoreError = conn
            .execute("INSERT INTO parent (id) VALUES ('2')", [])
            .unwrap_err()
            .into();
        match not_null {
            StoreError::NotNullViolation { column } => assert_eq!(column, "parent.name"),
            other => panic!("expected not-null violation, got {other:?}"),
        }
    }

    #[test]
    fn test_other_errors_pass_through() {
        let conn = scratch();
        let err: StoreError = conn.execute("SELECT * FROM nowhere", []).unwrap_err().into();
        assert!(matches!(err, StoreError::Sqlite(_)));
    }
}
