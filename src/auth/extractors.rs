use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use axum_extra::extract::cookie::CookieJar;
use tracing::warn;

use super::cookies::ACCESS_COOKIE;
use super::credentials::CredentialStore;
use super::jwt::{JwtKeys, TokenError};
use super::repo_types::PublicUser;
use crate::error::AppError;
use crate::state::AppState;

/// Auth gate: the resolved, sanitized user behind a valid access token.
#[derive(Debug, Clone)]
pub struct AuthUser(pub PublicUser);

impl FromRef<AppState> for CredentialStore {
    fn from_ref(state: &AppState) -> Self {
        state.users.clone()
    }
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Cookie wins over the Authorization header.
pub fn access_token_from(jar: &CookieJar, headers: &HeaderMap) -> Option<String> {
    jar.get(ACCESS_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| bearer(headers).map(str::to_string))
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
    CredentialStore: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = access_token_from(&jar, &parts.headers)
            .ok_or_else(|| AppError::unauthorized("Unauthorized request"))?;

        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify_access(&token).map_err(|e| match e {
            TokenError::Expired => AppError::TokenExpired("Access token expired"),
            other => {
                warn!(error = %other, "access token rejected");
                AppError::TokenInvalid("Invalid access token")
            }
        })?;

        let users = CredentialStore::from_ref(state);
        let user = users
            .find_by_id(claims.sub)
            .await?
            .ok_or_else(|| {
                warn!(user_id = %claims.sub, "access token for missing user");
                AppError::unauthorized("Invalid Access Token")
            })?;

        Ok(AuthUser(PublicUser::from(user)))
    }
}
