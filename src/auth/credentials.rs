use std::sync::Arc;

use uuid::Uuid;

use super::password::{hash_password_blocking, verify_password_blocking};
use super::repo_types::{NewUserRow, ProfileChangesRow, User};
use super::store::{StoreResult, UserStore};

/// Account creation input; the password is still plaintext here.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub fullname: String,
    pub password: String,
}

#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub fullname: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Credential store: wraps a `UserStore` and hashes passwords on every
/// path that writes one, and on no other path.
#[derive(Clone)]
pub struct CredentialStore {
    inner: Arc<dyn UserStore>,
}

impl CredentialStore {
    pub fn new(inner: Arc<dyn UserStore>) -> Self {
        Self { inner }
    }

    pub async fn create(&self, new: NewUser) -> StoreResult<User> {
        let password_hash = hash_password_blocking(new.password).await?;
        self.inner
            .insert(NewUserRow {
                id: Uuid::new_v4(),
                username: new.username,
                email: new.email,
                fullname: new.fullname,
                password_hash,
            })
            .await
    }

    pub async fn update_profile(&self, id: Uuid, changes: ProfileChanges) -> StoreResult<Option<User>> {
        let password_hash = match changes.password {
            Some(plain) => Some(hash_password_blocking(plain).await?),
            None => None,
        };
        self.inner
            .update_profile(
                id,
                ProfileChangesRow {
                    fullname: changes.fullname,
                    username: changes.username,
                    password_hash,
                },
            )
            .await
    }

    pub async fn verify_password(&self, user: &User, candidate: &str) -> anyhow::Result<bool> {
        verify_password_blocking(candidate.to_owned(), user.password_hash.clone()).await
    }

    pub async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        self.inner.find_by_id(id).await
    }

    pub async fn find_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        self.inner.find_by_username(username).await
    }

    pub async fn find_by_username_or_email(
        &self,
        username: &str,
        email: &str,
    ) -> StoreResult<Option<User>> {
        self.inner.find_by_username_or_email(username, email).await
    }

    pub async fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> StoreResult<bool> {
        self.inner.set_refresh_token(id, token).await
    }

    pub async fn swap_refresh_token(&self, id: Uuid, expected: &str, new: &str) -> StoreResult<bool> {
        self.inner.swap_refresh_token(id, expected, new).await
    }

    pub async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        self.inner.delete(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::store::MemoryUserStore;

    fn store() -> CredentialStore {
        CredentialStore::new(Arc::new(MemoryUserStore::new()))
    }

    fn alice() -> NewUser {
        NewUser {
            username: "alice".into(),
            email: "alice@x.com".into(),
            fullname: "Alice".into(),
            password: "pw123456".into(),
        }
    }

    #[tokio::test]
    async fn create_stores_hash_not_plaintext() {
        let creds = store();
        let user = creds.create(alice()).await.unwrap();
        assert_ne!(user.password_hash, "pw123456");
        assert!(creds.verify_password(&user, "pw123456").await.unwrap());
    }

    #[tokio::test]
    async fn refresh_writes_leave_hash_untouched() {
        let creds = store();
        let user = creds.create(alice()).await.unwrap();
        creds.set_refresh_token(user.id, Some("r1")).await.unwrap();
        creds.swap_refresh_token(user.id, "r1", "r2").await.unwrap();
        let after = creds.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(after.password_hash, user.password_hash);
    }

    #[tokio::test]
    async fn fullname_change_does_not_rehash() {
        let creds = store();
        let user = creds.create(alice()).await.unwrap();
        let updated = creds
            .update_profile(
                user.id,
                ProfileChanges {
                    fullname: Some("Alice Liddell".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.fullname, "Alice Liddell");
        assert_eq!(updated.password_hash, user.password_hash);
    }

    #[tokio::test]
    async fn password_change_rehashes() {
        let creds = store();
        let user = creds.create(alice()).await.unwrap();
        let updated = creds
            .update_profile(
                user.id,
                ProfileChanges {
                    password: Some("n3w-passw0rd".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_ne!(updated.password_hash, user.password_hash);
        assert!(creds.verify_password(&updated, "n3w-passw0rd").await.unwrap());
        assert!(!creds.verify_password(&updated, "pw123456").await.unwrap());
    }
}
