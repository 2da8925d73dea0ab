//! Bearer token authentication.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use common::UserId;
use tokio::sync::RwLock;

use crate::config::ConfigError;
use crate::error::ApiError;
use crate::state::AppState;

/// What a verifier knows about a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenClaims {
    pub user_id: UserId,
    pub expired: bool,
}

/// Resolves bearer tokens to users.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Returns the claims of a known token, or `None` for an unknown one.
    async fn verify(&self, token: &str) -> Option<TokenClaims>;
}

/// Verifier backed by a fixed token table.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenVerifier {
    tokens: Arc<RwLock<HashMap<String, TokenClaims>>>,
}

impl StaticTokenVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `token:userId` pairs separated by commas.
    pub fn parse(list: &str) -> Result<Self, ConfigError> {
        let mut tokens = HashMap::new();
        for pair in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let invalid = |reason: &str| ConfigError {
                key: "AUTH_TOKENS",
                value: pair.to_string(),
                reason: reason.to_string(),
            };
            let (token, user) = pair
                .split_once(':')
                .ok_or_else(|| invalid("expected token:userId"))?;
            let user: u64 = user
                .trim()
                .parse()
                .map_err(|_| invalid("user id must be an unsigned integer"))?;
            tokens.insert(
                token.trim().to_string(),
                TokenClaims {
                    user_id: UserId::new(user),
                    expired: false,
                },
            );
        }
        Ok(Self {
            tokens: Arc::new(RwLock::new(tokens)),
        })
    }

    /// Adds or replaces a token.
    pub async fn insert(&self, token: impl Into<String>, user_id: UserId) {
        self.tokens.write().await.insert(
            token.into(),
            TokenClaims {
                user_id,
                expired: false,
            },
        );
    }

    /// Marks a token as expired.
    pub async fn expire(&self, token: &str) {
        if let Some(claims) = self.tokens.write().await.get_mut(token) {
            claims.expired = true;
        }
    }

    /// Returns the number of known tokens.
    pub async fn len(&self) -> usize {
        self.tokens.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl TokenVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> Option<TokenClaims> {
        self.tokens.read().await.get(token).copied()
    }
}

/// The user behind a valid bearer token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUser(pub UserId);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
    Arc<AppState>: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ApiError::Unauthorized("missing bearer token".into()))?;

        let state = Arc::<AppState>::from_ref(state);
        match state.tokens.verify(token).await {
            Some(claims) if !claims.expired => Ok(AuthenticatedUser(claims.user_id)),
            Some(_) => Err(ApiError::Unauthorized("token expired".into())),
            None => Err(ApiError::Unauthorized("invalid token".into())),
        }
    }
}
