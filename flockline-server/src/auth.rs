//! Bearer tokens and the route guards built on them.
//!
//! Tokens are HS256 JWTs carrying the user id and role. A guard re-reads the
//! user on every request, so deactivating an account or changing its role
//! takes effect before the token expires.

use crate::config::{JwtSecret, TokenTtlDays};
use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use flockline::user::get_user;
use flockline::{Actor, CommandError, Role, UserId};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

const NO_TOKEN: &str = "Not authorized, no token";
const TOKEN_FAILED: &str = "Not authorized, token failed";

/// Claims carried by a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: UserId,
    /// Role at issue time
    pub role: Role,
    /// Issued at, seconds since the epoch
    pub iat: i64,
    /// Expiry, seconds since the epoch
    pub exp: i64,
}

/// Signs and checks tokens with one shared secret.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer").field("ttl", &self.ttl).finish_non_exhaustive()
    }
}

impl TokenIssuer {
    /// Creates an issuer for the given secret and token lifetime.
    pub fn new(secret: &JwtSecret, ttl: TokenTtlDays) -> Self {
        let secret = secret.as_ref().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
            ttl: Duration::days(i64::from(u32::from(ttl))),
        }
    }

    /// Signs a token for the user.
    pub fn issue(&self, user_id: UserId, role: Role) -> Result<String, CommandError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id,
            role,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|error| CommandError::Internal(format!("token signing failed: {error}")))
    }

    /// Checks a token's signature and expiry.
    pub fn verify(&self, token: &str) -> Result<Claims, CommandError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|error| {
                debug!(%error, "[auth.verify] token rejected");
                CommandError::Unauthorized(TOKEN_FAILED.to_string())
            })
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Any signed-in user.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Actor);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| CommandError::Unauthorized(NO_TOKEN.to_string()))?;
        let claims = state.tokens().verify(token)?;

        let user = match get_user(state.store(), claims.sub).await {
            Ok(user) => user,
            Err(CommandError::NotFound { .. }) => {
                return Err(CommandError::Unauthorized(TOKEN_FAILED.to_string()).into())
            }
            Err(error) => return Err(error.into()),
        };
        if !user.is_active || user.role() != claims.role {
            debug!(user_id = %user.id, "[auth.guard] token no longer matches the account");
            return Err(CommandError::Unauthorized(TOKEN_FAILED.to_string()).into());
        }

        Ok(Self(Actor::new(user.id, user.role())))
    }
}

/// A signed-in administrator.
#[derive(Debug, Clone, Copy)]
pub struct AdminUser(pub Actor);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthUser(actor) = AuthUser::from_request_parts(parts, state).await?;
        if actor.role != Role::Admin {
            return Err(CommandError::Forbidden("Not authorized as an admin".to_string()).into());
        }
        Ok(Self(actor))
    }
}

/// A signed-in sales agent.
#[derive(Debug, Clone, Copy)]
pub struct AgentUser(pub Actor);

impl FromRequestParts<AppState> for AgentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthUser(actor) = AuthUser::from_request_parts(parts, state).await?;
        if actor.role != Role::Agent {
            return Err(CommandError::Forbidden("Not authorized as an agent".to_string()).into());
        }
        Ok(Self(actor))
    }
}
