use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Access level of a user. Only administrative endpoints change this;
/// the reconciliation path never writes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Specialist,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Specialist => "specialist",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown role: {0}")]
pub struct ParseRoleError(String);

impl FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "member" => Ok(Role::Member),
            "specialist" => Ok(Role::Specialist),
            "admin" => Ok(Role::Admin),
            other => Err(ParseRoleError(other.to_string())),
        }
    }
}

/// Durable user record, created on first authenticated contact.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Opaque record id, generated at creation, immutable.
    pub id: String,
    /// Identity-provider subject bound to this record. Nullable for
    /// accounts that pre-date their first provider contact.
    pub external_subject_id: Option<String>,
    /// Stored lowercase; unique case-insensitively.
    pub email: String,
    pub display_name: String,
    pub avatar_url: String,
    pub role: Role,
    pub experience_points: i64,
    pub created_at: DateTime<Utc>,
}

/// Partial update applied to a user record. `None` leaves the column as is.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub external_subject_id: Option<String>,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        self.external_subject_id.is_none()
            && self.email.is_none()
            && self.display_name.is_none()
            && self.avatar_url.is_none()
    }
}
