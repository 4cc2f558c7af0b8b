pub mod sqlite;

pub use sqlite::SqliteUserStore;

use crate::models::{User, UserPatch};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Unique constraint conflict")]
    Conflict,
}

/// Persistence seam for user records. The reconciliation gate only ever
/// touches identity and profile columns through this trait; role and
/// experience points have their own narrow entry points.
pub trait UserStore: Send + Sync {
    fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError>;
    fn find_by_external_id(&self, subject_id: &str) -> Result<Option<User>, StoreError>;
    /// Case-insensitive lookup.
    fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    fn create(&self, user: &User) -> Result<(), StoreError>;
    fn update(&self, id: &str, patch: &UserPatch) -> Result<(), StoreError>;
    fn list(&self) -> Result<Vec<User>, StoreError>;
    /// Apply an experience reward. Returns the new total, or `None` if the
    /// user does not exist.
    fn add_experience(&self, id: &str, amount: i64) -> Result<Option<i64>, StoreError>;
}
