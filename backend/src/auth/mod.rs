pub mod gate;
pub mod verifier;

pub use gate::{authorize, AuthContext, AuthError, AuthGate};
pub use verifier::{IdentityClaim, JwksVerifier, TokenVerifier, VerifyError};
