use std::sync::Arc;

use axum::extract::FromRef;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use thiserror::Error;
use time::Duration;
use tracing::debug;
use uuid::Uuid;

use super::claims::{Claims, TokenKind};
use crate::{clock::Clock, config::JwtConfig, state::AppState};

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("invalid token")]
    Invalid,
    #[error("failed to sign token: {0}")]
    Sign(#[from] jsonwebtoken::errors::Error),
}

#[derive(Clone)]
struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Token issuer: one key pair per token kind, so a leaked refresh secret
/// cannot mint access tokens and vice versa.
#[derive(Clone)]
pub struct JwtKeys {
    access: KeyPair,
    refresh: KeyPair,
    pub issuer: String,
    pub audience: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        state.jwt.clone()
    }
}

impl JwtKeys {
    pub fn new(cfg: &JwtConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            access: KeyPair::from_secret(&cfg.access_secret),
            refresh: KeyPair::from_secret(&cfg.refresh_secret),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            access_ttl: Duration::minutes(cfg.access_ttl_minutes),
            refresh_ttl: Duration::minutes(cfg.refresh_ttl_minutes),
            clock,
        }
    }

    fn keys(&self, kind: TokenKind) -> &KeyPair {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    fn sign_with_kind(&self, user_id: Uuid, kind: TokenKind) -> Result<String, TokenError> {
        let now = self.clock.now();
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp(),
            exp: (now + ttl).unix_timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            jti: Uuid::new_v4(),
            kind,
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.keys(kind).encoding)?;
        debug!(user_id = %user_id, kind = kind.as_str(), "jwt signed");
        Ok(token)
    }

    pub fn sign_access(&self, user_id: Uuid) -> Result<String, TokenError> {
        self.sign_with_kind(user_id, TokenKind::Access)
    }

    pub fn sign_refresh(&self, user_id: Uuid) -> Result<String, TokenError> {
        self.sign_with_kind(user_id, TokenKind::Refresh)
    }

    /// Expiry is checked against our own clock rather than the library's
    /// wall-clock check, so tests can move time.
    fn verify_kind(&self, token: &str, kind: TokenKind) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        validation.validate_exp = false;
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.keys(kind).decoding, &validation).map_err(
            |e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            },
        )?;
        let claims = data.claims;
        if claims.kind != kind {
            return Err(TokenError::Invalid);
        }
        if self.clock.now().unix_timestamp() >= claims.exp {
            return Err(TokenError::Expired);
        }
        debug!(user_id = %claims.sub, kind = kind.as_str(), "jwt verified");
        Ok(claims)
    }

    pub fn verify_access(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_kind(token, TokenKind::Access)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_kind(token, TokenKind::Refresh)
    }
}
