//! Response envelope and the closed set of API error kinds.

use axum::{
    extract::{rejection::JsonRejection, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::auth::jwt::TokenError;
use crate::auth::store::StoreError;
use crate::config::AppEnv;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{message}")]
    Auth { status: StatusCode, message: String },

    #[error("{0}")]
    TokenExpired(&'static str),

    #[error("{0}")]
    TokenInvalid(&'static str),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("malformed request body: {0}")]
    BadJson(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    /// Credential or token failure answered with 401.
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        AppError::Auth {
            status: StatusCode::UNAUTHORIZED,
            message: msg.into(),
        }
    }

    /// Credential failure answered with 400.
    pub fn bad_credentials(msg: impl Into<String>) -> Self {
        AppError::Auth {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::BadJson(_) => StatusCode::BAD_REQUEST,
            AppError::Auth { status, .. } => *status,
            AppError::TokenExpired(_) | AppError::TokenInvalid(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code for client branching.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) | AppError::BadJson(_) => "VALIDATION_ERROR",
            AppError::Auth { .. } => "AUTH_ERROR",
            AppError::TokenExpired(_) => "TOKEN_EXPIRED",
            AppError::TokenInvalid(_) => "INVALID_TOKEN",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Internal(_) => INTERNAL_CODE,
        }
    }
}

/// `{success, message, data?, code?, errors?}`, shared by success and error replies.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    #[serde(skip)]
    pub status: StatusCode,
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<serde_json::Value>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self::with_status(StatusCode::OK, message, data)
    }

    pub fn created(message: impl Into<String>, data: T) -> Self {
        Self::with_status(StatusCode::CREATED, message, data)
    }

    pub fn with_status(status: StatusCode, message: impl Into<String>, data: T) -> Self {
        Self {
            status,
            success: true,
            message: message.into(),
            data: Some(data),
            code: None,
            errors: None,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

/// Internal error text riding on a response. Only [`expose_internal_detail`]
/// puts it in a body.
#[derive(Debug, Clone)]
pub struct InternalErrorDetail(pub String);

const INTERNAL_MESSAGE: &str = "Internal Server Error";
const INTERNAL_CODE: &str = "INTERNAL_ERROR";

fn error_envelope(
    status: StatusCode,
    code: &'static str,
    message: String,
    errors: Option<serde_json::Value>,
) -> Response {
    let body: ApiResponse<()> = ApiResponse {
        status,
        success: false,
        message,
        data: None,
        code: Some(code),
        errors,
    };
    body.into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let (message, errors) = match &self {
            AppError::Internal(e) => {
                error!(error = ?e, "internal error");
                let mut resp = error_envelope(status, code, INTERNAL_MESSAGE.to_string(), None);
                resp.extensions_mut()
                    .insert(InternalErrorDetail(format!("{e:#}")));
                return resp;
            }
            AppError::BadJson(detail) => (
                "Malformed request body".to_string(),
                Some(serde_json::Value::String(detail.clone())),
            ),
            other => (other.to_string(), None),
        };
        error_envelope(status, code, message, errors)
    }
}

/// Outside production, rewrites internal error replies so `errors` carries
/// the detail.
pub async fn expose_internal_detail(State(env): State<AppEnv>, req: Request, next: Next) -> Response {
    let mut resp = next.run(req).await;
    let Some(InternalErrorDetail(detail)) = resp.extensions_mut().remove::<InternalErrorDetail>()
    else {
        return resp;
    };
    if env.is_production() {
        return resp;
    }
    error_envelope(
        resp.status(),
        INTERNAL_CODE,
        INTERNAL_MESSAGE.to_string(),
        Some(serde_json::Value::String(detail)),
    )
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadJson(rejection.body_text())
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(msg) => AppError::Conflict(msg),
            StoreError::Backend(e) => AppError::Internal(e),
        }
    }
}

impl From<TokenError> for AppError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Expired => AppError::TokenExpired("Token expired"),
            TokenError::Invalid => AppError::TokenInvalid("Invalid token"),
            TokenError::Sign(e) => AppError::Internal(anyhow::Error::new(e).context("jwt sign")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .expect("read body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn token_errors_carry_distinct_codes() {
        let expired = AppError::TokenExpired("Access token expired").into_response();
        assert_eq!(expired.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(expired).await;
        assert_eq!(json["success"], false);
        assert_eq!(json["code"], "TOKEN_EXPIRED");
        assert_eq!(json["message"], "Access token expired");

        let invalid = AppError::TokenInvalid("Invalid access token").into_response();
        let json = body_json(invalid).await;
        assert_eq!(json["code"], "INVALID_TOKEN");
    }

    #[tokio::test]
    async fn status_mapping_follows_kind() {
        assert_eq!(AppError::validation("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::unauthorized("x").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::bad_credentials("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Conflict("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::Internal(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn internal_error_body_never_carries_detail() {
        let resp = AppError::Internal(anyhow::anyhow!("db password is hunter2")).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let detail = resp.extensions().get::<InternalErrorDetail>().cloned();
        assert!(detail.unwrap().0.contains("hunter2"));
        let json = body_json(resp).await;
        assert_eq!(json["message"], "Internal Server Error");
        assert_eq!(json["code"], "INTERNAL_ERROR");
        assert!(!json.to_string().contains("hunter2"));
    }

    async fn through_layer(env: AppEnv) -> serde_json::Value {
        use tower::ServiceExt;

        let app = axum::Router::new()
            .route(
                "/boom",
                axum::routing::get(|| async {
                    Err::<(), _>(AppError::Internal(anyhow::anyhow!("disk on fire")))
                }),
            )
            .layer(axum::middleware::from_fn_with_state(env, expose_internal_detail));
        let resp = app
            .oneshot(axum::http::Request::get("/boom").body(axum::body::Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(resp.extensions().get::<InternalErrorDetail>().is_none());
        body_json(resp).await
    }

    #[tokio::test]
    async fn detail_layer_follows_environment() {
        let dev = through_layer(AppEnv::Development).await;
        assert_eq!(dev["message"], "Internal Server Error");
        assert_eq!(dev["code"], "INTERNAL_ERROR");
        assert_eq!(dev["errors"], "disk on fire");

        let prod = through_layer(AppEnv::Production).await;
        assert!(prod.get("errors").is_none());
        assert!(!prod.to_string().contains("disk on fire"));
    }

    #[tokio::test]
    async fn success_envelope_omits_error_fields() {
        let resp = ApiResponse::created("made", serde_json::json!({"id": 1})).into_response();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let json = body_json(resp).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["id"], 1);
        assert!(json.get("code").is_none());
        assert!(json.get("errors").is_none());
    }
}
