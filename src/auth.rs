use crate::application::state::AppState;
use crate::domain::entities::account::AccountId;
use crate::domain::errors::ApiError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Session token claims. `sub` is the account id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub iat: i64,
    pub exp: i64,
}

/// Identity attached to a request once its bearer token is verified
#[derive(Debug, Clone, PartialEq)]
pub struct AuthenticatedAccount {
    pub id: AccountId,
    pub username: String,
}

/// Issues and verifies HS256 session tokens
pub struct JwtHandler {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_hours: i64,
}

impl JwtHandler {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_hours,
        }
    }

    pub fn issue(&self, id: AccountId, username: &str) -> Result<String, ApiError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: id.to_string(),
            username: username.to_string(),
            iat: now,
            exp: now + self.ttl_hours * 3600,
        };

        debug!("Issuing token for account {}, expires in {}h", id, self.ttl_hours);

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| ApiError::InternalServerError(format!("Failed to issue token: {}", e)))
    }

    pub fn validate(&self, token: &str) -> Result<AuthenticatedAccount, ApiError> {
        let data = decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map_err(|e| ApiError::Unauthorized(format!("Invalid or expired token: {}", e)))?;

        let id = data
            .claims
            .sub
            .parse::<i64>()
            .map_err(|_| ApiError::Unauthorized("Malformed token subject".to_string()))?;

        Ok(AuthenticatedAccount {
            id: AccountId(id),
            username: data.claims.username,
        })
    }
}

fn bearer_token(request: &Request) -> Result<&str, ApiError> {
    let header = request
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok());

    match header {
        Some(auth) if auth.starts_with("Bearer ") => Ok(&auth[7..]),
        Some(_) => {
            warn!("Invalid Authorization header format (expected Bearer token)");
            Err(ApiError::Unauthorized(
                "Expected a Bearer token".to_string(),
            ))
        }
        None => {
            warn!("Missing Authorization header");
            Err(ApiError::Unauthorized(
                "Missing Authorization header".to_string(),
            ))
        }
    }
}

/// Middleware to require a valid session token on protected endpoints
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let account = bearer_token(&request).and_then(|token| state.jwt.validate(token));

    match account {
        Ok(account) => {
            request.extensions_mut().insert(account);
            Ok(next.run(request).await)
        }
        Err(e) => {
            warn!("Rejected request to {}: {}", request.uri().path(), e);
            Err(e)
        }
    }
}
