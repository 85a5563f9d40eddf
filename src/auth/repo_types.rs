use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record as persisted.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,             // lowercase, unique
    pub email: String,                // lowercase, unique
    pub fullname: String,
    pub password_hash: String,        // argon2 PHC string
    pub refresh_token: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// What leaves the server: no password hash, no refresh token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub fullname: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<User> for PublicUser {
    fn from(u: User) -> Self {
        Self {
            id: u.id,
            username: u.username,
            email: u.email,
            fullname: u.fullname,
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}

/// Row to insert; the hash is computed before it reaches a store.
#[derive(Debug, Clone)]
pub struct NewUserRow {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub fullname: String,
    pub password_hash: String,
}

/// Column changes for a profile update. `None` leaves the column alone.
#[derive(Debug, Clone, Default)]
pub struct ProfileChangesRow {
    pub fullname: Option<String>,
    pub username: Option<String>,
    pub password_hash: Option<String>,
}
