use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::repo_types::PublicUser;

// Request bodies keep every field optional so that a missing field is a
// validation error with our envelope, not a deserializer rejection.

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    #[serde(default)]
    pub fullname: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub new_fullname: Option<String>,
    #[serde(default)]
    pub new_username: Option<String>,
    #[serde(default)]
    pub current_password: Option<String>,
    #[serde(default)]
    pub new_password: Option<String>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteAccountRequest {
    #[serde(default)]
    pub current_password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user: PublicUser,
    pub access_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub access_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogoutResponse {}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedAccount {
    pub id: Uuid,
    pub username: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camel_case_field_names_on_the_wire() {
        let req: UpdateProfileRequest = serde_json::from_str(
            r#"{"newFullname":"A","newUsername":"b","currentPassword":"c","newPassword":"d"}"#,
        )
        .unwrap();
        assert_eq!(req.new_fullname.as_deref(), Some("A"));
        assert_eq!(req.new_username.as_deref(), Some("b"));
        assert_eq!(req.current_password.as_deref(), Some("c"));
        assert_eq!(req.new_password.as_deref(), Some("d"));
    }

    #[test]
    fn missing_fields_deserialize_as_none() {
        let req: SignupRequest = serde_json::from_str(r#"{"username":"alice"}"#).unwrap();
        assert_eq!(req.username.as_deref(), Some("alice"));
        assert!(req.email.is_none());
        assert!(req.password.is_none());
    }

    #[test]
    fn refresh_response_uses_access_token_key() {
        let json = serde_json::to_value(RefreshResponse {
            access_token: "abc".into(),
        })
        .unwrap();
        assert_eq!(json["accessToken"], "abc");
    }
}
