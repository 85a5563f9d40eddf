use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::repo_types::{NewUserRow, ProfileChangesRow, User};

#[derive(Debug, Error)]
pub enum StoreError {
    /// A unique column (username or email) already holds this value.
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence for user records. Implementations store what they are
/// given; password hashing happens in `CredentialStore` above them.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;
    async fn find_by_username(&self, username: &str) -> StoreResult<Option<User>>;
    /// Any user holding either the username or the email.
    async fn find_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> StoreResult<Option<User>>;
    async fn insert(&self, row: NewUserRow) -> StoreResult<User>;
    /// Applies the set fields; `None` when the user does not exist.
    async fn update_profile(&self, id: Uuid, changes: ProfileChangesRow)
        -> StoreResult<Option<User>>;
    /// Unconditional single-column write; returns false for unknown users.
    async fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> StoreResult<bool>;
    /// Replaces the stored refresh token only if it still equals `expected`.
    async fn swap_refresh_token(&self, id: Uuid, expected: &str, new: &str) -> StoreResult<bool>;
    async fn delete(&self, id: Uuid) -> StoreResult<bool>;
}

/// Process-local store used when no database is configured and in tests.
#[derive(Default)]
pub struct MemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn username_taken(users: &HashMap<Uuid, User>, username: &str, except: Option<Uuid>) -> bool {
    users
        .values()
        .any(|u| u.username == username && Some(u.id) != except)
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn find_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> StoreResult<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.username == username || u.email == email)
            .cloned())
    }

    async fn insert(&self, row: NewUserRow) -> StoreResult<User> {
        let mut users = self.users.write().await;
        if username_taken(&users, &row.username, None) {
            return Err(StoreError::Conflict("Username is already taken".into()));
        }
        if users.values().any(|u| u.email == row.email) {
            return Err(StoreError::Conflict("Email is already registered".into()));
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: row.id,
            username: row.username,
            email: row.email,
            fullname: row.fullname,
            password_hash: row.password_hash,
            refresh_token: None,
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_profile(
        &self,
        id: Uuid,
        changes: ProfileChangesRow,
    ) -> StoreResult<Option<User>> {
        let mut users = self.users.write().await;
        if let Some(username) = &changes.username {
            if username_taken(&users, username, Some(id)) {
                return Err(StoreError::Conflict("Username is already taken".into()));
            }
        }
        let Some(user) = users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(fullname) = changes.fullname {
            user.fullname = fullname;
        }
        if let Some(username) = changes.username {
            user.username = username;
        }
        if let Some(hash) = changes.password_hash {
            user.password_hash = hash;
        }
        user.updated_at = OffsetDateTime::now_utc();
        Ok(Some(user.clone()))
    }

    async fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> StoreResult<bool> {
        let mut users = self.users.write().await;
        match users.get_mut(&id) {
            Some(user) => {
                user.refresh_token = token.map(str::to_owned);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn swap_refresh_token(&self, id: Uuid, expected: &str, new: &str) -> StoreResult<bool> {
        let mut users = self.users.write().await;
        match users.get_mut(&id) {
            Some(user) if user.refresh_token.as_deref() == Some(expected) => {
                user.refresh_token = Some(new.to_owned());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.users.write().await.remove(&id).is_some())
    }
}
