//! Typed HTTP client for the backend's session and audio endpoints.

use std::sync::Arc;

use reqwest::cookie::{CookieStore, Jar};
use reqwest::{multipart, Client, RequestBuilder, StatusCode, Url};
use serde::{de::DeserializeOwned, Deserialize};
use thiserror::Error;

use crate::app::API_PREFIX;
use crate::audio::dto::{AudioList, DeletedAudio, UploadedAudio};
use crate::auth::dto::{
    DeleteAccountRequest, DeletedAccount, LoginRequest, LoginResponse, LogoutResponse,
    RefreshRequest, RefreshResponse, SignupRequest, UpdateProfileRequest,
};
use crate::auth::PublicUser;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{message} ({status})")]
    Api {
        status: StatusCode,
        code: Option<String>,
        message: String,
    },

    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("user is required to log in")]
    MissingUser,

    #[error("access token is required to log in")]
    MissingToken,

    #[error("not authenticated")]
    NotAuthenticated,

    #[error("session expired, please log in again")]
    SessionExpired,

    #[error("session storage: {0}")]
    Persist(#[from] std::io::Error),
}

impl ClientError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ClientError::Api { status, .. } if *status == StatusCode::UNAUTHORIZED)
    }

    /// The access token itself was refused (expired or unverifiable), as
    /// opposed to a 401 for a wrong password.
    pub fn is_token_rejection(&self) -> bool {
        self.is_unauthorized() && matches!(self.code(), Some("TOKEN_EXPIRED" | "INVALID_TOKEN"))
    }

    /// Machine-readable code from the error envelope, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            ClientError::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    message: String,
    data: Option<T>,
    code: Option<String>,
}

/// Cookie-aware client: the refresh cookie set by login lives in its jar,
/// the access token is passed explicitly as a bearer token.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base: String,
    jar: Arc<Jar>,
    /// Parsed `base`; the jar is keyed by it.
    root: Url,
}

impl ApiClient {
    /// `base_url` is the server root, e.g. `http://localhost:8080`.
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let jar = Arc::new(Jar::default());
        let http = Client::builder().cookie_provider(jar.clone()).build()?;
        let base = format!("{}{}", base_url.trim_end_matches('/'), API_PREFIX);
        let root = http.get(&base).build()?.url().clone();
        Ok(Self {
            http,
            base,
            jar,
            root,
        })
    }

    /// Cookies the server has set for the API, in `Cookie` header form.
    /// `None` when the jar holds nothing for it.
    pub fn export_cookies(&self) -> Option<String> {
        self.jar
            .cookies(&self.root)
            .and_then(|v| v.to_str().ok().map(str::to_string))
    }

    /// Seeds the jar from a header produced by [`ApiClient::export_cookies`].
    pub fn import_cookies(&self, header: &str) {
        for pair in header.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            self.jar.add_cookie_str(&format!("{pair}; Path=/"), &self.root);
        }
    }

    pub fn from_env() -> Result<Self, ClientError> {
        let base = std::env::var("VOICEAUTH_API_URL")
            .unwrap_or_else(|_| "http://localhost:8080".into());
        Self::new(&base)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ClientError> {
        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.bytes().await?;

        if !status.is_success() {
            let (code, message) = match serde_json::from_slice::<Envelope<serde_json::Value>>(&body) {
                Ok(env) => (env.code, env.message),
                Err(_) => (None, String::from_utf8_lossy(&body).into_owned()),
            };
            return Err(ClientError::Api {
                status,
                code,
                message,
            });
        }

        let env: Envelope<T> = serde_json::from_slice(&body)?;
        env.data.ok_or_else(|| ClientError::Api {
            status,
            code: None,
            message: format!("response carried no data: {}", env.message),
        })
    }

    pub async fn signup(&self, req: &SignupRequest) -> Result<PublicUser, ClientError> {
        self.send(self.http.post(self.url("/users/signup")).json(req))
            .await
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, ClientError> {
        let req = LoginRequest {
            username: Some(username.to_string()),
            password: Some(password.to_string()),
        };
        self.send(self.http.post(self.url("/users/login")).json(&req))
            .await
    }

    /// Rotates the refresh cookie held in the jar.
    pub async fn refresh(&self) -> Result<RefreshResponse, ClientError> {
        self.send(
            self.http
                .post(self.url("/users/refresh-token"))
                .json(&RefreshRequest::default()),
        )
        .await
    }

    pub async fn logout(&self, token: &str) -> Result<LogoutResponse, ClientError> {
        self.send(self.http.post(self.url("/users/logout")).bearer_auth(token))
            .await
    }

    pub async fn current_user(&self, token: &str) -> Result<PublicUser, ClientError> {
        self.send(self.http.get(self.url("/users/current-user")).bearer_auth(token))
            .await
    }

    pub async fn update_profile(
        &self,
        token: &str,
        req: &UpdateProfileRequest,
    ) -> Result<PublicUser, ClientError> {
        self.send(
            self.http
                .put(self.url("/users/update-profile"))
                .bearer_auth(token)
                .json(req),
        )
        .await
    }

    pub async fn delete_account(
        &self,
        token: &str,
        req: &DeleteAccountRequest,
    ) -> Result<DeletedAccount, ClientError> {
        self.send(
            self.http
                .delete(self.url("/users/delete-account"))
                .bearer_auth(token)
                .json(req),
        )
        .await
    }

    pub async fn upload_audio(
        &self,
        token: &str,
        clip: Vec<u8>,
        content_type: &str,
        file_name: &str,
        owner: &str,
    ) -> Result<UploadedAudio, ClientError> {
        let part = multipart::Part::bytes(clip)
            .file_name(file_name.to_string())
            .mime_str(content_type)?;
        let form = multipart::Form::new()
            .part("audio", part)
            .text("ownerName", owner.to_string());
        self.send(
            self.http
                .post(self.url("/audio/upload-audio"))
                .bearer_auth(token)
                .multipart(form),
        )
        .await
    }

    pub async fn list_audio(&self, token: &str) -> Result<AudioList, ClientError> {
        self.send(self.http.get(self.url("/audio/list-audio")).bearer_auth(token))
            .await
    }

    pub async fn delete_audio(&self, token: &str, public_id: &str) -> Result<DeletedAudio, ClientError> {
        self.send(
            self.http
                .delete(self.url(&format!("/audio/delete-audio/{public_id}")))
                .bearer_auth(token),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_gets_api_prefix() {
        let api = ApiClient::new("http://localhost:8080/").unwrap();
        assert_eq!(
            api.url("/users/login"),
            "http://localhost:8080/voice-web-app/api/users/login"
        );
    }

    #[test]
    fn cookies_move_between_clients() {
        let api = ApiClient::new("http://localhost:8080").unwrap();
        assert_eq!(api.export_cookies(), None);

        api.import_cookies("refreshToken=abc; other=1");
        let exported = api.export_cookies().unwrap();
        assert!(exported.contains("refreshToken=abc"));
        assert!(exported.contains("other=1"));

        let restarted = ApiClient::new("http://localhost:8080").unwrap();
        restarted.import_cookies(&exported);
        assert!(restarted.export_cookies().unwrap().contains("refreshToken=abc"));
    }

    #[test]
    fn malformed_base_url_is_rejected() {
        assert!(matches!(
            ApiClient::new("not a url"),
            Err(ClientError::Network(_))
        ));
    }

    #[test]
    fn unauthorized_detection() {
        let err = ClientError::Api {
            status: StatusCode::UNAUTHORIZED,
            code: Some("TOKEN_EXPIRED".into()),
            message: "Access token expired".into(),
        };
        assert!(err.is_unauthorized());
        assert_eq!(err.code(), Some("TOKEN_EXPIRED"));
        assert!(!ClientError::MissingUser.is_unauthorized());
    }

    #[test]
    fn error_envelope_decodes_without_data() {
        let env: Envelope<serde_json::Value> = serde_json::from_str(
            r#"{"success":false,"message":"Refresh token is expired or used","code":"AUTH_ERROR"}"#,
        )
        .unwrap();
        assert!(env.data.is_none());
        assert_eq!(env.code.as_deref(), Some("AUTH_ERROR"));
    }
}
