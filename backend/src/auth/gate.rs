use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::models::{Role, User, UserPatch};
use crate::store::{StoreError, UserStore};

use super::verifier::{IdentityClaim, TokenVerifier};

const DEFAULT_DISPLAY_NAME: &str = "User";
const PLACEHOLDER_EMAIL_DOMAIN: &str = "auth.local";
const DEFAULT_AVATAR_BASE: &str = "https://ui-avatars.com/api/?background=8EC5FC&color=fff&name=";

/// Identity established for one request. Only a successful
/// [`AuthGate::authenticate`] produces one, so any code holding an
/// `AuthContext` is downstream of the gate by construction.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: String,
    pub role: Role,
    pub claim: IdentityClaim,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Missing/malformed credential or verifier rejection. The reason is
    /// deliberately not distinguished to the caller.
    #[error("Not authorized to access this route")]
    Unauthenticated,
    /// Valid identity, insufficient role.
    #[error("User role '{role}' is not authorized to access this route (requires one of: {required})")]
    Forbidden { role: Role, required: String },
    /// User store failed; details are logged, never exposed.
    #[error("Server error during authentication")]
    Internal,
}

impl AuthError {
    fn status(&self) -> StatusCode {
        match self {
            AuthError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden { .. } => StatusCode::FORBIDDEN,
            AuthError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = json!({
            "success": false,
            "message": self.to_string(),
        });
        (self.status(), Json(body)).into_response()
    }
}

/// Allow iff the caller's role is in `allowed`.
pub fn authorize(context: &AuthContext, allowed: &[Role]) -> Result<(), AuthError> {
    if allowed.contains(&context.role) {
        Ok(())
    } else {
        Err(AuthError::Forbidden {
            role: context.role,
            required: allowed
                .iter()
                .map(Role::as_str)
                .collect::<Vec<_>>()
                .join(", "),
        })
    }
}

/// Identity reconciliation gate.
///
/// Verifies the bearer credential, then resolves the local user record:
/// by provider subject first, by email second (binding the subject to an
/// email-only account on first contact), creating the record last. Profile
/// fields are synced from the claim; role and experience points are never
/// written here.
pub struct AuthGate {
    verifier: Arc<dyn TokenVerifier>,
    users: Arc<dyn UserStore>,
}

impl AuthGate {
    pub fn new(verifier: Arc<dyn TokenVerifier>, users: Arc<dyn UserStore>) -> Self {
        Self { verifier, users }
    }

    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<AuthContext, AuthError> {
        // No verifier or store call for a missing/malformed header
        let token = extract_bearer(headers).ok_or(AuthError::Unauthenticated)?;

        let claim = self.verifier.verify(token).await.map_err(|e| {
            tracing::debug!("Token verification failed: {}", e);
            AuthError::Unauthenticated
        })?;

        let user = self.resolve_user(&claim).map_err(|e| {
            tracing::error!("User reconciliation failed for subject {}: {}", claim.subject_id, e);
            AuthError::Internal
        })?;

        Ok(AuthContext {
            user_id: user.id,
            role: user.role,
            claim,
        })
    }

    fn resolve_user(&self, claim: &IdentityClaim) -> Result<User, StoreError> {
        if let Some(user) = self.users.find_by_external_id(&claim.subject_id)? {
            return self.sync_profile(user, claim, false);
        }

        let claim_email = claim
            .email
            .as_deref()
            .filter(|e| !e.is_empty())
            .map(str::to_lowercase);

        if let Some(email) = &claim_email {
            if let Some(user) = self.users.find_by_email(email)? {
                // First provider contact for an email-only account: bind
                // the subject so later requests resolve by external id.
                let bind = user.external_subject_id.is_none();
                return self.sync_profile(user, claim, bind);
            }
        }

        let user = provision_user(claim);
        match self.users.create(&user) {
            Ok(()) => {
                tracing::info!("Created user {} for subject {}", user.id, claim.subject_id);
                Ok(user)
            }
            Err(StoreError::Conflict) => {
                // Lost a concurrent first-contact race; converge on the
                // record the winner created.
                if let Some(user) = self.users.find_by_external_id(&claim.subject_id)? {
                    return Ok(user);
                }
                if let Some(email) = &claim_email {
                    if let Some(user) = self.users.find_by_email(email)? {
                        return Ok(user);
                    }
                }
                Err(StoreError::Database(
                    "create conflicted but no record resolved".to_string(),
                ))
            }
            Err(e) => Err(e),
        }
    }

    /// Overwrite stored profile fields that differ from a non-empty claim
    /// value. Writes nothing when nothing changed.
    fn sync_profile(
        &self,
        mut user: User,
        claim: &IdentityClaim,
        bind_subject: bool,
    ) -> Result<User, StoreError> {
        let mut patch = UserPatch::default();

        if bind_subject {
            patch.external_subject_id = Some(claim.subject_id.clone());
        }

        if let Some(email) = claim.email.as_deref().filter(|e| !e.is_empty()) {
            let email = email.to_lowercase();
            if !user.email.eq_ignore_ascii_case(&email) {
                patch.email = Some(email);
            }
        }

        if let Some(picture) = claim.picture_url.as_deref().filter(|p| !p.is_empty()) {
            if user.avatar_url != picture {
                patch.avatar_url = Some(picture.to_string());
            }
        }

        if !patch.is_empty() {
            self.users.update(&user.id, &patch)?;
            if let Some(subject) = patch.external_subject_id {
                user.external_subject_id = Some(subject);
            }
            if let Some(email) = patch.email {
                user.email = email;
            }
            if let Some(avatar) = patch.avatar_url {
                user.avatar_url = avatar;
            }
        }

        Ok(user)
    }
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get("authorization")?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

fn provision_user(claim: &IdentityClaim) -> User {
    let email = claim
        .email
        .as_deref()
        .filter(|e| !e.is_empty())
        .map(str::to_lowercase)
        .unwrap_or_else(|| format!("{}@{}", claim.subject_id, PLACEHOLDER_EMAIL_DOMAIN));

    let display_name = claim
        .display_name
        .as_deref()
        .filter(|n| !n.is_empty())
        .map(String::from)
        .or_else(|| {
            claim
                .email
                .as_deref()
                .filter(|e| !e.is_empty())
                .and_then(|e| e.split('@').next())
                .filter(|p| !p.is_empty())
                .map(String::from)
        })
        .unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string());

    let avatar_url = claim
        .picture_url
        .as_deref()
        .filter(|p| !p.is_empty())
        .map(String::from)
        .unwrap_or_else(|| {
            format!("{}{}", DEFAULT_AVATAR_BASE, display_name.replace(' ', "+"))
        });

    User {
        id: Uuid::new_v4().to_string(),
        external_subject_id: Some(claim.subject_id.clone()),
        email,
        display_name,
        avatar_url,
        role: Role::Member,
        experience_points: 0,
        created_at: Utc::now(),
    }
}
