use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};

use matchme_types::api::Claims;
use matchme_types::models::UserId;

use crate::error::GatewayError;

/// Resolves a bearer credential to the user it was issued for.
pub trait Identity: Send + Sync + 'static {
    fn resolve_user(&self, credential: &str) -> Result<UserId, GatewayError>;
}

/// HS256 JWTs signed with a shared secret.
pub struct JwtIdentity {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl JwtIdentity {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Sign a token for `user_id`. Login lives in the identity service; this
    /// is for tooling and tests that need a valid credential.
    pub fn issue(&self, user_id: UserId, ttl: chrono::Duration) -> anyhow::Result<String> {
        let claims = Claims {
            user_id,
            exp: (chrono::Utc::now() + ttl).timestamp() as usize,
        };
        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }
}

impl Identity for JwtIdentity {
    fn resolve_user(&self, credential: &str) -> Result<UserId, GatewayError> {
        let token = strip_bearer(credential);
        if token.is_empty() {
            return Err(GatewayError::Unauthenticated("empty token".into()));
        }

        let data = decode::<Claims>(token, &self.decoding, &Validation::default())
            .map_err(|e| GatewayError::Unauthenticated(e.to_string()))?;

        Ok(data.claims.user_id)
    }
}

fn strip_bearer(raw: &str) -> &str {
    raw.trim().strip_prefix("Bearer ").unwrap_or(raw.trim()).trim()
}

/// Pick the credential for a connection attempt: the `token` query
/// parameter wins, then the `Authorization` header.
pub fn extract_credential(query_token: Option<&str>, bearer_header: Option<&str>) -> Option<String> {
    query_token
        .map(strip_bearer)
        .filter(|t| !t.is_empty())
        .or_else(|| bearer_header.map(strip_bearer).filter(|t| !t.is_empty()))
        .map(str::to_string)
}
