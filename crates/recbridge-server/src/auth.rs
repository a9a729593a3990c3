//! Bearer-token authentication
//!
//! The token is opaque to the core; the only contract is that it carries a
//! `tenant_id` claim and the user id in `sub`, signed with the configured
//! HS256 key. The extractor rejects with 401 before any handler runs.

use std::str::FromStr;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use recbridge_core::domain::errors::GatewayError;
use recbridge_core::domain::newtypes::{TenantId, UserId};

use crate::error::ApiError;
use crate::state::AppState;

/// Claims recbridge requires in a bearer token
#[derive(Debug, Deserialize)]
pub struct Claims {
    /// User id within the upstream
    pub sub: String,
    pub tenant_id: String,
}

/// The authenticated identity of a request
#[derive(Debug, Clone, Copy)]
pub struct AuthContext {
    pub tenant_id: TenantId,
    pub user_id: UserId,
}

/// Decode and validate a bearer token into an [`AuthContext`]
pub fn decode_token(token: &str, secret: &str) -> Result<AuthContext, GatewayError> {
    let mut validation = Validation::new(Algorithm::HS256);
    // Expiry is the issuer's concern; tokens without `exp` stay usable.
    validation.validate_exp = false;
    validation.required_spec_claims.clear();

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| GatewayError::AuthInvalid(e.to_string()))?;

    let tenant_id = TenantId::from_str(&data.claims.tenant_id)
        .map_err(|_| GatewayError::AuthInvalid("malformed tenant_id claim".into()))?;
    let user_id = data
        .claims
        .sub
        .parse::<i64>()
        .map(UserId::new)
        .map_err(|_| GatewayError::AuthInvalid("malformed sub claim".into()))?;

    Ok(AuthContext { tenant_id, user_id })
}

/// Pull the bearer token out of an `Authorization` header value
pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    header?.strip_prefix("Bearer ")
}

impl FromRequestParts<AppState> for AuthContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        let token = bearer_token(header).ok_or(ApiError(GatewayError::AuthMissing))?;
        decode_token(token, &state.jwt_secret).map_err(ApiError)
    }
}
