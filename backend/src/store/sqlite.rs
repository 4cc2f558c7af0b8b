use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::models::{Role, User, UserPatch};

use super::{StoreError, UserStore};

/// SQLite-backed user store.
///
/// The unique indexes on `external_subject_id` and `lower(email)` are what
/// make first-contact reconciliation safe under concurrency: a losing
/// concurrent create surfaces as [`StoreError::Conflict`] and the caller
/// re-resolves by lookup.
pub struct SqliteUserStore {
    conn: Mutex<Connection>,
}

impl SqliteUserStore {
    pub fn new(database_url: &str) -> Result<Self, StoreError> {
        // Accept a sqlite: prefix for parity with DATABASE_URL conventions
        let path = database_url.strip_prefix("sqlite:").unwrap_or(database_url);

        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Database(e.to_string()))?;
        }

        let conn = Connection::open(path)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        let store = Self::from_connection(conn)?;

        tracing::info!("User store initialized with database: {}", path);
        Ok(store)
    }

    /// In-memory store, used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                external_subject_id TEXT,
                email TEXT NOT NULL,
                display_name TEXT NOT NULL,
                avatar_url TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'member',
                experience_points INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )",
            [],
        )
        .map_err(map_sqlite_err)?;

        conn.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_users_external_subject
             ON users(external_subject_id) WHERE external_subject_id IS NOT NULL",
            [],
        )
        .map_err(map_sqlite_err)?;

        conn.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_users_email ON users(lower(email))",
            [],
        )
        .map_err(map_sqlite_err)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn query_one(&self, sql: &str, param: &str) -> Result<Option<User>, StoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Database(e.to_string()))?;
        conn.query_row(sql, params![param], row_to_user)
            .optional()
            .map_err(map_sqlite_err)
    }
}

const USER_COLUMNS: &str =
    "id, external_subject_id, email, display_name, avatar_url, role, experience_points, created_at";

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    let role_str: String = row.get(5)?;
    let role = role_str.parse::<Role>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let created_at_str: String = row.get(7)?;
    let created_at = chrono::DateTime::parse_from_rfc3339(&created_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());

    Ok(User {
        id: row.get(0)?,
        external_subject_id: row.get(1)?,
        email: row.get(2)?,
        display_name: row.get(3)?,
        avatar_url: row.get(4)?,
        role,
        experience_points: row.get(6)?,
        created_at,
    })
}

fn map_sqlite_err(e: rusqlite::Error) -> StoreError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StoreError::Conflict
        }
        _ => StoreError::Database(e.to_string()),
    }
}

impl UserStore for SqliteUserStore {
    fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        self.query_one(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            id,
        )
    }

    fn find_by_external_id(&self, subject_id: &str) -> Result<Option<User>, StoreError> {
        self.query_one(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE external_subject_id = ?1"),
            subject_id,
        )
    }

    fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.query_one(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower(?1)"),
            email,
        )
    }

    fn create(&self, user: &User) -> Result<(), StoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        conn.execute(
            "INSERT INTO users (id, external_subject_id, email, display_name, avatar_url, role, experience_points, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                user.id,
                user.external_subject_id,
                user.email,
                user.display_name,
                user.avatar_url,
                user.role.as_str(),
                user.experience_points,
                user.created_at.to_rfc3339(),
            ],
        )
        .map_err(map_sqlite_err)?;

        Ok(())
    }

    fn update(&self, id: &str, patch: &UserPatch) -> Result<(), StoreError> {
        if patch.is_empty() {
            return Ok(());
        }

        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        conn.execute(
            "UPDATE users SET
                external_subject_id = COALESCE(?1, external_subject_id),
                email = COALESCE(?2, email),
                display_name = COALESCE(?3, display_name),
                avatar_url = COALESCE(?4, avatar_url)
             WHERE id = ?5",
            params![
                patch.external_subject_id,
                patch.email,
                patch.display_name,
                patch.avatar_url,
                id,
            ],
        )
        .map_err(map_sqlite_err)?;

        Ok(())
    }

    fn list(&self) -> Result<Vec<User>, StoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC"
            ))
            .map_err(map_sqlite_err)?;

        let users = stmt
            .query_map([], row_to_user)
            .map_err(map_sqlite_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_sqlite_err)?;

        Ok(users)
    }

    fn add_experience(&self, id: &str, amount: i64) -> Result<Option<i64>, StoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let changed = conn
            .execute(
                "UPDATE users SET experience_points = experience_points + ?1 WHERE id = ?2",
                params![amount, id],
            )
            .map_err(map_sqlite_err)?;

        if changed == 0 {
            return Ok(None);
        }

        conn.query_row(
            "SELECT experience_points FROM users WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()
        .map_err(map_sqlite_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn store() -> SqliteUserStore {
        SqliteUserStore::open_in_memory().unwrap()
    }

    fn sample_user(subject: Option<&str>, email: &str) -> User {
        User {
            id: Uuid::new_v4().to_string(),
            external_subject_id: subject.map(String::from),
            email: email.to_string(),
            display_name: "Test".to_string(),
            avatar_url: "https://example.com/a.png".to_string(),
            role: Role::Member,
            experience_points: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_create_and_find_by_external_id() {
        let store = store();
        let user = sample_user(Some("s1"), "a@x.com");
        store.create(&user).unwrap();

        let found = store.find_by_external_id("s1").unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert_eq!(found.email, "a@x.com");
        assert_eq!(found.role, Role::Member);
    }

    #[test]
    fn test_find_by_email_is_case_insensitive() {
        let store = store();
        store.create(&sample_user(None, "a@x.com")).unwrap();

        assert!(store.find_by_email("A@X.COM").unwrap().is_some());
        assert!(store.find_by_email("other@x.com").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_external_id_is_conflict() {
        let store = store();
        store.create(&sample_user(Some("s1"), "a@x.com")).unwrap();

        let err = store
            .create(&sample_user(Some("s1"), "b@x.com"))
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
    }

    #[test]
    fn test_duplicate_email_is_conflict_regardless_of_case() {
        let store = store();
        store.create(&sample_user(Some("s1"), "a@x.com")).unwrap();

        let err = store
            .create(&sample_user(Some("s2"), "A@x.com"))
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
    }

    #[test]
    fn test_two_records_without_subject_are_allowed() {
        let store = store();
        store.create(&sample_user(None, "a@x.com")).unwrap();
        // Partial index: NULL subjects do not collide with each other
        store.create(&sample_user(None, "b@x.com")).unwrap();
        assert_eq!(store.list().unwrap().len(), 2);
    }

    #[test]
    fn test_update_patches_only_given_fields() {
        let store = store();
        let user = sample_user(None, "a@x.com");
        store.create(&user).unwrap();

        store
            .update(
                &user.id,
                &UserPatch {
                    external_subject_id: Some("s1".to_string()),
                    avatar_url: Some("https://example.com/new.png".to_string()),
                    ..Default::default()
                },
            )
            .unwrap();

        let found = store.find_by_id(&user.id).unwrap().unwrap();
        assert_eq!(found.external_subject_id.as_deref(), Some("s1"));
        assert_eq!(found.avatar_url, "https://example.com/new.png");
        assert_eq!(found.email, "a@x.com");
        assert_eq!(found.display_name, "Test");
    }

    #[test]
    fn test_add_experience() {
        let store = store();
        let user = sample_user(Some("s1"), "a@x.com");
        store.create(&user).unwrap();

        assert_eq!(store.add_experience(&user.id, 25).unwrap(), Some(25));
        assert_eq!(store.add_experience(&user.id, 10).unwrap(), Some(35));
        assert_eq!(store.add_experience("missing", 10).unwrap(), None);
    }

    #[test]
    fn test_role_survives_round_trip() {
        let store = store();
        let mut user = sample_user(Some("s1"), "a@x.com");
        user.role = Role::Admin;
        store.create(&user).unwrap();

        let found = store.find_by_id(&user.id).unwrap().unwrap();
        assert_eq!(found.role, Role::Admin);
    }
}
