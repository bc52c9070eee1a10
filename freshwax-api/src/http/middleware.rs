// HTTP middleware: bearer-token authentication extractors.

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderValue},
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use freshwax_core::models::UserId;

use super::{AppError, AppState};

/// Bearer-token claims. Authentication itself is external; tokens arrive
/// already minted and are only verified here.
#[derive(Debug, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub admin: bool,
    pub exp: i64,
}

/// Authenticated caller.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: UserId,
    pub name: String,
    pub is_admin: bool,
}

/// Authenticated caller holding the admin role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

/// `Some(AuthUser)` when a valid bearer token is present, `None` when the
/// header is absent. An invalid token is still a 401.
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<AuthUser>);

fn bearer_token(header: &HeaderValue) -> Result<&str, AppError> {
    let value = header
        .to_str()
        .map_err(|_| AppError::unauthorized("Invalid Authorization header"))?;
    value
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::unauthorized("Authorization header must be a Bearer token"))
}

fn verify(token: &str, secret: &str) -> Result<AuthUser, AppError> {
    let claims = jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| AppError::unauthorized(format!("Invalid token: {e}")))?
    .claims;

    Ok(AuthUser {
        user_id: UserId::from_string(claims.sub),
        name: claims.name,
        is_admin: claims.admin,
    })
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .ok_or_else(|| AppError::unauthorized("Missing Authorization header"))?;
        verify(bearer_token(header)?, &state.config.auth.jwt_secret)
    }
}

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin {
            return Err(AppError::forbidden("Admin access required"));
        }
        Ok(Self(user))
    }
}

impl FromRequestParts<AppState> for MaybeAuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .is_none()
        {
            return Ok(Self(None));
        }
        Ok(Self(Some(AuthUser::from_request_parts(parts, state).await?)))
    }
}

/// Issue a token; test and operational tooling only.
pub fn issue_token(
    secret: &str,
    user_id: &str,
    name: &str,
    admin: bool,
    expires_at: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    use jsonwebtoken::{encode, EncodingKey, Header};
    let claims = serde_json::json!({
        "sub": user_id,
        "name": name,
        "admin": admin,
        "exp": expires_at,
    });
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_token() {
        let exp = chrono::Utc::now().timestamp() + 3600;
        let token = issue_token("secret", "u1", "Lena", true, exp).unwrap();
        let user = verify(&token, "secret").unwrap();
        assert_eq!(user.user_id.as_str(), "u1");
        assert_eq!(user.name, "Lena");
        assert!(user.is_admin);

        // Wrong secret fails closed.
        assert!(verify(&token, "other").is_err());
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let exp = chrono::Utc::now().timestamp() - 10;
        let token = issue_token("secret", "u1", "Lena", false, exp).unwrap();
        assert!(verify(&token, "secret").is_err());
    }
}
