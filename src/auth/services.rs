//! Session controller: account and token lifecycle.
//!
//! `Anonymous -> Authenticated` (login), `Authenticated -> Authenticated`
//! (refresh, profile update), `Authenticated -> Anonymous` (logout) and
//! `Authenticated -> Deleted` (account deletion).

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::credentials::{NewUser, ProfileChanges};
use super::dto::{DeleteAccountRequest, LoginRequest, SignupRequest, UpdateProfileRequest};
use super::jwt::TokenError;
use super::password::MIN_PASSWORD_LEN;
use super::repo_types::PublicUser;
use super::store::StoreError;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

const INVALID_LOGIN: &str = "Invalid username or password";
const REFRESH_REUSED: &str = "Refresh token is expired or used";

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Trimmed value, or `None` when absent or blank.
fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Passwords are taken verbatim; only emptiness counts as missing.
fn secret(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|v| !v.is_empty())
}

fn check_password_strength(password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// Fresh access + refresh pair for one user.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: PublicUser,
    pub tokens: TokenPair,
}

fn issue_pair(st: &AppState, user_id: Uuid) -> AppResult<TokenPair> {
    Ok(TokenPair {
        access_token: st.jwt.sign_access(user_id)?,
        refresh_token: st.jwt.sign_refresh(user_id)?,
    })
}

#[instrument(skip(st, req))]
pub async fn signup(st: &AppState, req: SignupRequest) -> AppResult<PublicUser> {
    let (Some(fullname), Some(username), Some(email), Some(password)) = (
        present(&req.fullname),
        present(&req.username),
        present(&req.email),
        secret(&req.password),
    ) else {
        return Err(AppError::validation(
            "Fullname, username, email and password are required",
        ));
    };
    let username = username.to_lowercase();
    let email = email.to_lowercase();

    if !is_valid_email(&email) {
        warn!(%email, "invalid email");
        return Err(AppError::validation("Invalid email format"));
    }
    check_password_strength(password)?;

    if st
        .users
        .find_by_username_or_email(&username, &email)
        .await?
        .is_some()
    {
        warn!(%username, %email, "signup collides with existing user");
        return Err(AppError::Conflict(
            "User already exists with this email or username".into(),
        ));
    }

    let user = st
        .users
        .create(NewUser {
            username,
            email,
            fullname: fullname.to_string(),
            password: password.to_string(),
        })
        .await
        .map_err(|e| match e {
            // Lost a race with a concurrent signup for the same name.
            StoreError::Conflict(_) => {
                AppError::Conflict("User already exists with this email or username".into())
            }
            other => other.into(),
        })?;

    info!(user_id = %user.id, username = %user.username, "user signed up");
    Ok(PublicUser::from(user))
}

#[instrument(skip(st, req))]
pub async fn login(st: &AppState, req: LoginRequest) -> AppResult<LoginOutcome> {
    let (Some(username), Some(password)) = (present(&req.username), secret(&req.password)) else {
        return Err(AppError::validation("Username and password are required"));
    };
    let username = username.to_lowercase();
    let distinct = st.config.login_distinct_errors;

    let Some(user) = st.users.find_by_username(&username).await? else {
        warn!(%username, "login for unknown username");
        return Err(if distinct {
            AppError::NotFound("User doesn't exist with this username".into())
        } else {
            AppError::unauthorized(INVALID_LOGIN)
        });
    };

    if !st.users.verify_password(&user, password).await? {
        warn!(user_id = %user.id, "login with wrong password");
        return Err(if distinct {
            AppError::bad_credentials("Incorrect password")
        } else {
            AppError::unauthorized(INVALID_LOGIN)
        });
    }

    let tokens = issue_pair(st, user.id)?;
    st.users
        .set_refresh_token(user.id, Some(&tokens.refresh_token))
        .await?;

    info!(user_id = %user.id, username = %user.username, "user logged in");
    Ok(LoginOutcome {
        user: PublicUser::from(user),
        tokens,
    })
}

/// Exchanges a refresh token for a new pair. The stored token moves with a
/// compare-and-swap, so each refresh token is accepted at most once.
#[instrument(skip_all)]
pub async fn refresh(st: &AppState, presented: Option<String>) -> AppResult<TokenPair> {
    let Some(presented) = presented.filter(|t| !t.is_empty()) else {
        return Err(AppError::unauthorized("Refresh token is missing"));
    };

    let claims = st.jwt.verify_refresh(&presented).map_err(|e| match e {
        TokenError::Expired => AppError::TokenExpired("Refresh token expired"),
        other => {
            warn!(error = %other, "refresh token rejected");
            AppError::TokenInvalid("Invalid refresh token")
        }
    })?;

    let Some(user) = st.users.find_by_id(claims.sub).await? else {
        warn!(user_id = %claims.sub, "refresh for missing user");
        return Err(AppError::unauthorized("Invalid refresh token"));
    };

    if user.refresh_token.as_deref() != Some(presented.as_str()) {
        warn!(user_id = %user.id, "stale or replayed refresh token");
        return Err(AppError::unauthorized(REFRESH_REUSED));
    }

    let tokens = issue_pair(st, user.id)?;
    if !st
        .users
        .swap_refresh_token(user.id, &presented, &tokens.refresh_token)
        .await?
    {
        warn!(user_id = %user.id, "refresh token rotated concurrently");
        return Err(AppError::unauthorized(REFRESH_REUSED));
    }

    info!(user_id = %user.id, "refresh token rotated");
    Ok(tokens)
}

#[instrument(skip(st))]
pub async fn logout(st: &AppState, user_id: Uuid) -> AppResult<()> {
    st.users.set_refresh_token(user_id, None).await?;
    info!(%user_id, "user logged out");
    Ok(())
}

#[instrument(skip(st, req), fields(user_id = %current.id))]
pub async fn update_profile(
    st: &AppState,
    current: &PublicUser,
    req: UpdateProfileRequest,
) -> AppResult<PublicUser> {
    let new_fullname = present(&req.new_fullname);
    let new_username = present(&req.new_username).map(str::to_lowercase);
    let new_password = secret(&req.new_password);

    if new_fullname.is_none() && new_username.is_none() && new_password.is_none() {
        return Err(AppError::validation("At least one field is required to update"));
    }

    if let Some(new_password) = new_password {
        let Some(current_password) = secret(&req.current_password) else {
            return Err(AppError::validation(
                "Current password is required to set a new password",
            ));
        };
        check_password_strength(new_password)?;
        let user = st
            .users
            .find_by_id(current.id)
            .await?
            .ok_or_else(|| AppError::unauthorized("Invalid Access Token"))?;
        if !st.users.verify_password(&user, current_password).await? {
            warn!("profile update with wrong current password");
            return Err(AppError::unauthorized("Current password is incorrect"));
        }
    }

    if let Some(username) = new_username.as_deref() {
        if let Some(other) = st.users.find_by_username(username).await? {
            if other.id != current.id {
                return Err(AppError::Conflict("Username is already taken".into()));
            }
        }
    }

    let updated = st
        .users
        .update_profile(
            current.id,
            ProfileChanges {
                fullname: new_fullname.map(str::to_string),
                username: new_username,
                password: new_password.map(str::to_string),
            },
        )
        .await?
        .ok_or_else(|| AppError::unauthorized("Invalid Access Token"))?;

    info!("profile updated");
    Ok(PublicUser::from(updated))
}

#[instrument(skip(st, req), fields(user_id = %current.id))]
pub async fn delete_account(
    st: &AppState,
    current: &PublicUser,
    req: DeleteAccountRequest,
) -> AppResult<PublicUser> {
    let Some(password) = secret(&req.current_password) else {
        return Err(AppError::validation("Current password is required"));
    };
    let user = st
        .users
        .find_by_id(current.id)
        .await?
        .ok_or_else(|| AppError::unauthorized("Invalid Access Token"))?;
    if !st.users.verify_password(&user, password).await? {
        warn!("account deletion with wrong password");
        return Err(AppError::unauthorized("Current password is incorrect"));
    }

    st.users.delete(user.id).await?;
    info!(username = %user.username, "account deleted");
    Ok(PublicUser::from(user))
}
