//! Test helpers: a static in-process token verifier, a call-recording
//! store wrapper and app-state builders. Used by unit tests and the
//! integration smoke test.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;
use axum::Router;

use crate::auth::{AuthGate, IdentityClaim, TokenVerifier, VerifyError};
use crate::config::Config;
use crate::models::{User, UserPatch};
use crate::store::{SqliteUserStore, StoreError, UserStore};
use crate::{routes, AppState};

/// Verifier backed by a fixed token -> claim table. Counts calls so tests
/// can assert the gate short-circuits before verification.
#[derive(Default)]
pub struct StaticVerifier {
    claims: HashMap<String, IdentityClaim>,
    calls: AtomicUsize,
}

impl StaticVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, token: &str, claim: IdentityClaim) {
        self.claims.insert(token.to_string(), claim);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenVerifier for StaticVerifier {
    async fn verify(&self, token: &str) -> Result<IdentityClaim, VerifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.claims
            .get(token)
            .cloned()
            .ok_or_else(|| VerifyError::InvalidToken("unknown test token".to_string()))
    }
}

/// Store wrapper that counts reads and writes, for idempotence assertions.
pub struct RecordingStore {
    inner: Arc<dyn UserStore>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl RecordingStore {
    pub fn new(inner: Arc<dyn UserStore>) -> Self {
        Self {
            inner,
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl UserStore for RecordingStore {
    fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.find_by_id(id)
    }

    fn find_by_external_id(&self, subject_id: &str) -> Result<Option<User>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.find_by_external_id(subject_id)
    }

    fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.find_by_email(email)
    }

    fn create(&self, user: &User) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.create(user)
    }

    fn update(&self, id: &str, patch: &UserPatch) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.update(id, patch)
    }

    fn list(&self) -> Result<Vec<User>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.list()
    }

    fn add_experience(&self, id: &str, amount: i64) -> Result<Option<i64>, StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.add_experience(id, amount)
    }
}

pub fn claim_with_email(subject: &str, email: &str) -> IdentityClaim {
    IdentityClaim {
        subject_id: subject.to_string(),
        email: Some(email.to_string()),
        display_name: None,
        picture_url: None,
    }
}

pub fn auth_headers(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        "authorization",
        format!("Bearer {}", token).parse().unwrap(),
    );
    headers
}

pub fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 8080,
        database_url: ":memory:".to_string(),
        oidc_issuer: "https://test-issuer".to_string(),
        oidc_audience: "test-audience".to_string(),
        verify_timeout_secs: 5,
        log_level: "debug".to_string(),
        cors_origins: "*".to_string(),
    }
}

/// App state wired to the given verifier and a fresh in-memory store.
pub fn test_state(verifier: StaticVerifier) -> (Arc<AppState>, Arc<SqliteUserStore>) {
    let store = Arc::new(SqliteUserStore::open_in_memory().unwrap());
    let gate = AuthGate::new(Arc::new(verifier), store.clone());
    let state = Arc::new(AppState {
        config: test_config(),
        gate,
        users: store.clone(),
    });
    (state, store)
}

/// The full route surface, as assembled in main.
pub fn test_app(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(routes::health::router())
        .merge(routes::auth::router(state.clone()))
        .merge(routes::admin::router(state))
}
