//! Hub authentication: validates the JWT presented on upgrade.

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use gatehouse_core::config::AuthConfig;
use gatehouse_core::types::{UserId, UserRole};

use super::handle::AuthenticatedClient;
use crate::error::HubError;

/// Claims the platform's login service puts into access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user ID.
    pub sub: UserId,
    /// Username.
    pub username: String,
    /// Role; tokens without one are treated as plain users.
    #[serde(default)]
    pub role: UserRole,
    /// Expiration (Unix timestamp).
    pub exp: i64,
    /// Issued at (Unix timestamp).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

/// Authenticates hub connections using HS256 JWTs.
#[derive(Clone)]
pub struct WsAuthenticator {
    /// HMAC secret key for verification.
    decoding_key: DecodingKey,
    /// Validation configuration.
    validation: Validation,
}

impl std::fmt::Debug for WsAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsAuthenticator")
            .field("validation", &self.validation)
            .finish()
    }
}

impl WsAuthenticator {
    /// Creates an authenticator from auth configuration.
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = config.leeway_seconds;

        Self {
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
        }
    }

    /// Verifies a token and returns the client identity it carries.
    pub fn authenticate(&self, token: &str) -> Result<AuthenticatedClient, HubError> {
        if token.is_empty() {
            return Err(HubError::AuthFailed("missing token".to_string()));
        }

        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| HubError::AuthFailed(e.to_string()))?;

        Ok(AuthenticatedClient {
            user_id: data.claims.sub,
            username: data.claims.username,
            role: data.claims.role,
        })
    }
}
