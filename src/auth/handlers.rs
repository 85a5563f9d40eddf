use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{delete, get, post, put},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::instrument;

use crate::{
    auth::{
        cookies::{clear_refresh_cookie, refresh_cookie, REFRESH_COOKIE},
        dto::{
            DeleteAccountRequest, DeletedAccount, LoginRequest, LoginResponse, LogoutResponse,
            RefreshRequest, RefreshResponse, SignupRequest, UpdateProfileRequest,
        },
        extractors::AuthUser,
        repo_types::PublicUser,
        services,
    },
    error::{ApiResponse, AppResult},
    state::AppState,
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users/signup", post(signup))
        .route("/users/login", post(login))
        .route("/users/refresh-token", post(refresh_token))
        .route("/users/logout", post(logout))
        .route("/users/current-user", get(current_user))
        .route("/users/update-profile", put(update_profile))
        .route("/users/delete-account", delete(delete_account))
}

#[instrument(skip_all)]
pub async fn signup(
    State(st): State<AppState>,
    payload: Result<Json<SignupRequest>, JsonRejection>,
) -> AppResult<ApiResponse<PublicUser>> {
    let Json(req) = payload?;
    let user = services::signup(&st, req).await?;
    Ok(ApiResponse::created("User registered successfully", user))
}

#[instrument(skip_all)]
pub async fn login(
    State(st): State<AppState>,
    jar: CookieJar,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<(CookieJar, ApiResponse<LoginResponse>)> {
    let Json(req) = payload?;
    let out = services::login(&st, req).await?;
    let jar = jar.add(refresh_cookie(
        &out.tokens.refresh_token,
        st.jwt.refresh_ttl,
        st.config.env,
    ));
    Ok((
        jar,
        ApiResponse::ok(
            "User logged in successfully",
            LoginResponse {
                user: out.user,
                access_token: out.tokens.access_token,
            },
        ),
    ))
}

/// Cookie first, then `{refreshToken}` in the body.
#[instrument(skip_all)]
pub async fn refresh_token(
    State(st): State<AppState>,
    jar: CookieJar,
    body: Option<Json<RefreshRequest>>,
) -> AppResult<(CookieJar, ApiResponse<RefreshResponse>)> {
    let presented = jar
        .get(REFRESH_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| body.and_then(|Json(b)| b.refresh_token));

    let tokens = services::refresh(&st, presented).await?;
    let jar = jar.add(refresh_cookie(
        &tokens.refresh_token,
        st.jwt.refresh_ttl,
        st.config.env,
    ));
    Ok((
        jar,
        ApiResponse::ok(
            "Access token refreshed",
            RefreshResponse {
                access_token: tokens.access_token,
            },
        ),
    ))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn logout(
    State(st): State<AppState>,
    jar: CookieJar,
    AuthUser(user): AuthUser,
) -> AppResult<(CookieJar, ApiResponse<LogoutResponse>)> {
    services::logout(&st, user.id).await?;
    Ok((
        jar.add(clear_refresh_cookie(st.config.env)),
        ApiResponse::ok("User logged out", LogoutResponse {}),
    ))
}

pub async fn current_user(AuthUser(user): AuthUser) -> ApiResponse<PublicUser> {
    ApiResponse::ok("Current user fetched successfully", user)
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn update_profile(
    State(st): State<AppState>,
    AuthUser(user): AuthUser,
    payload: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> AppResult<ApiResponse<PublicUser>> {
    let Json(req) = payload?;
    let updated = services::update_profile(&st, &user, req).await?;
    Ok(ApiResponse::ok("Profile updated successfully", updated))
}

#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn delete_account(
    State(st): State<AppState>,
    jar: CookieJar,
    AuthUser(user): AuthUser,
    payload: Result<Json<DeleteAccountRequest>, JsonRejection>,
) -> AppResult<(CookieJar, ApiResponse<DeletedAccount>)> {
    let Json(req) = payload?;
    let deleted = services::delete_account(&st, &user, req).await?;
    Ok((
        jar.add(clear_refresh_cookie(st.config.env)),
        ApiResponse::ok(
            "Account deleted successfully",
            DeletedAccount {
                id: deleted.id,
                username: deleted.username,
            },
        ),
    ))
}
