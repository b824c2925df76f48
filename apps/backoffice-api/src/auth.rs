//! JWT authentication.
//!
//! Operators sign in elsewhere; this server only verifies their access
//! tokens. REST calls carry the token in `Authorization: Bearer <jwt>`,
//! live connections in `Sec-WebSocket-Protocol: bearer, <jwt>` because
//! browsers cannot set headers on a WebSocket handshake.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use boxoffice_core::{Operator, OperatorRole};

use crate::error::{ApiError, ApiResult, ErrorCode};
use crate::AppState;

/// Sub-protocol name that precedes the token on live connections.
pub const BEARER_PROTOCOL: &str = "bearer";

/// JWT claims structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (operator id)
    pub sub: String,

    pub role: OperatorRole,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration (Unix timestamp)
    pub exp: i64,

    /// JWT ID
    pub jti: String,
}

/// JWT token manager.
pub struct JwtManager {
    secret: String,
    lifetime_secs: i64,
}

impl JwtManager {
    pub fn new(secret: String, lifetime_secs: i64) -> Self {
        JwtManager {
            secret,
            lifetime_secs,
        }
    }

    /// Issues an access token for `operator`.
    pub fn generate_token(&self, operator: &Operator) -> ApiResult<String> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.lifetime_secs);

        let claims = Claims {
            sub: operator.id.to_string(),
            role: operator.role,
            iat: now.timestamp(),
            exp: exp.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| ApiError::new(ErrorCode::Internal, "INTERNAL", format!("Failed to generate token: {}", e)))
    }

    /// Validates a token and returns the operator it was issued to.
    pub fn validate_token(&self, token: &str) -> ApiResult<Operator> {
        let validation = Validation::default();

        let token_data: TokenData<Claims> = decode(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map_err(|e| {
            debug!(error = %e, "Token rejected");
            ApiError::unauthenticated("invalid or expired token")
        })?;

        let id = Uuid::parse_str(&token_data.claims.sub)
            .map_err(|_| ApiError::unauthenticated("invalid token subject"))?;
        Ok(Operator::new(id, token_data.claims.role))
    }
}

/// Extract bearer token from authorization header.
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Extracts the token from a `Sec-WebSocket-Protocol` value of the form
/// `bearer, <jwt>`.
pub fn token_from_protocols(header: &str) -> Option<&str> {
    let mut parts = header.split(',').map(str::trim);
    let scheme = parts.next()?;
    if !scheme.eq_ignore_ascii_case(BEARER_PROTOCOL) {
        return None;
    }
    parts.next().filter(|t| !t.is_empty())
}

/// The authenticated operator of a REST request.
#[derive(Debug, Clone, Copy)]
pub struct AuthOperator(pub Operator);

impl FromRequestParts<AppState> for AuthOperator {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(extract_bearer_token)
            .ok_or_else(|| ApiError::unauthenticated("missing bearer token"))?;

        state.jwt.validate_token(token).map(AuthOperator)
    }
}
