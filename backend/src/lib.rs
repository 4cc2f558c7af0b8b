pub mod auth;
pub mod config;
pub mod logging;
pub mod models;
pub mod routes;
pub mod store;
pub mod test_util;

pub use auth::{authorize, AuthContext, AuthError, AuthGate, IdentityClaim, JwksVerifier, TokenVerifier};
pub use config::Config;
pub use models::{Role, User, UserPatch};
pub use store::{SqliteUserStore, StoreError, UserStore};

use std::sync::Arc;

/// Shared application state, assembled once at startup. The gate receives
/// its verifier and store here; nothing in the auth path reaches for
/// process-global state.
pub struct AppState {
    pub config: Config,
    pub gate: AuthGate,
    pub users: Arc<dyn UserStore>,
}
