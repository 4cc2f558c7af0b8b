use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::RwLock;

/// Identity asserted by the external provider for one request.
/// Never persisted; the reconciliation gate turns it into a user record.
#[derive(Debug, Clone)]
pub struct IdentityClaim {
    pub subject_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub picture_url: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("Invalid token: {0}")]
    InvalidToken(String),
    #[error("JWKS fetch error: {0}")]
    JwksFetch(String),
    #[error("Key not found for kid: {0}")]
    KeyNotFound(String),
}

/// Seam between the gate and the identity provider. The production
/// implementation is [`JwksVerifier`]; tests inject a static one.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<IdentityClaim, VerifyError>;
}

#[derive(Debug, Deserialize)]
struct OidcConfig {
    jwks_uri: String,
}

#[derive(Debug, Deserialize)]
struct JwksResponse {
    keys: Vec<Jwk>,
}

#[derive(Debug, Clone, Deserialize)]
struct Jwk {
    kid: String,
    kty: String,
    n: Option<String>,
    e: Option<String>,
}

/// Claims carried by provider ID tokens. `name` and `picture` follow the
/// standard OIDC profile claim names.
#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    picture: Option<String>,
}

/// Verifies RS256 ID tokens against the issuer's JWKS document.
///
/// Keys are cached by `kid`; an unknown `kid` triggers one re-fetch before
/// the token is rejected, so provider key rotation does not require a
/// restart. All outbound calls share one bounded-timeout HTTP client.
pub struct JwksVerifier {
    http_client: Client,
    jwks_uri: String,
    keys: RwLock<HashMap<String, DecodingKey>>,
    issuer: String,
    audience: String,
}

impl JwksVerifier {
    pub async fn new(
        issuer: &str,
        audience: &str,
        timeout: Duration,
    ) -> Result<Self, VerifyError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VerifyError::JwksFetch(e.to_string()))?;

        // Discover the JWKS URI from the issuer's OIDC configuration
        let config_url = format!(
            "{}/.well-known/openid-configuration",
            issuer.trim_end_matches('/')
        );
        let config: OidcConfig = http_client
            .get(&config_url)
            .send()
            .await
            .map_err(|e| VerifyError::JwksFetch(e.to_string()))?
            .json()
            .await
            .map_err(|e| VerifyError::JwksFetch(e.to_string()))?;

        let verifier = Self {
            http_client,
            jwks_uri: config.jwks_uri,
            keys: RwLock::new(HashMap::new()),
            issuer: issuer.to_string(),
            audience: audience.to_string(),
        };

        verifier.refresh_keys().await?;

        Ok(verifier)
    }

    async fn refresh_keys(&self) -> Result<(), VerifyError> {
        tracing::info!("Fetching JWKS from {}", self.jwks_uri);

        let response: JwksResponse = self
            .http_client
            .get(&self.jwks_uri)
            .send()
            .await
            .map_err(|e| VerifyError::JwksFetch(e.to_string()))?
            .json()
            .await
            .map_err(|e| VerifyError::JwksFetch(e.to_string()))?;

        let mut keys = self.keys.write().await;
        keys.clear();

        for jwk in response.keys {
            if jwk.kty == "RSA" {
                if let (Some(n), Some(e)) = (&jwk.n, &jwk.e) {
                    match DecodingKey::from_rsa_components(n, e) {
                        Ok(key) => {
                            keys.insert(jwk.kid.clone(), key);
                        }
                        Err(e) => {
                            tracing::warn!("Failed to parse RSA key {}: {}", jwk.kid, e);
                        }
                    }
                }
            }
        }

        tracing::info!("Loaded {} JWKS keys", keys.len());
        Ok(())
    }

    async fn key_for(&self, kid: &str) -> Result<DecodingKey, VerifyError> {
        if let Some(key) = self.keys.read().await.get(kid) {
            return Ok(key.clone());
        }

        // Unknown kid: the provider may have rotated keys since startup
        self.refresh_keys().await?;

        self.keys
            .read()
            .await
            .get(kid)
            .cloned()
            .ok_or_else(|| VerifyError::KeyNotFound(kid.to_string()))
    }
}

#[async_trait]
impl TokenVerifier for JwksVerifier {
    async fn verify(&self, token: &str) -> Result<IdentityClaim, VerifyError> {
        let header =
            decode_header(token).map_err(|e| VerifyError::InvalidToken(e.to_string()))?;

        let kid = header
            .kid
            .ok_or_else(|| VerifyError::InvalidToken("Missing kid in token header".to_string()))?;

        let key = self.key_for(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);

        let token_data = decode::<Claims>(token, &key, &validation)
            .map_err(|e| VerifyError::InvalidToken(e.to_string()))?;

        Ok(IdentityClaim {
            subject_id: token_data.claims.sub,
            email: token_data.claims.email,
            display_name: token_data.claims.name,
            picture_url: token_data.claims.picture,
        })
    }
}
