use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Access tokens gate requests; refresh tokens only buy new access tokens.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

/// JWT payload shared by both token kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,      // user ID
    pub iat: i64,       // issued at (unix seconds)
    pub exp: i64,       // expires at (unix seconds)
    pub iss: String,
    pub aud: String,
    pub jti: Uuid,      // makes same-second tokens distinct
    pub kind: TokenKind,
}
