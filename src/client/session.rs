//! Client-side session: one authoritative copy of "who is logged in".
//!
//! Every view reads the same [`SessionSnapshot`] through a `watch` channel.
//! Mutations go through [`SessionManager`], which keeps memory and the
//! persisted copy in step.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use super::api::{ApiClient, ClientError};
use super::persist::{PersistedAuth, SessionStore};
use crate::auth::dto::{DeleteAccountRequest, DeletedAccount, UpdateProfileRequest};
use crate::auth::PublicUser;

/// Where the UI lands after logging out.
pub const LANDING_ROUTE: &str = "/";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub user: Option<PublicUser>,
    pub access_token: Option<String>,
    /// True until `boot` has settled the initial state.
    pub loading: bool,
}

impl SessionSnapshot {
    pub fn is_authenticated(&self) -> bool {
        self.user.is_some() && self.access_token.is_some()
    }

    fn anonymous() -> Self {
        Self::default()
    }
}

struct Inner {
    api: ApiClient,
    store: Arc<dyn SessionStore>,
    state: watch::Sender<SessionSnapshot>,
    refresh_lock: Mutex<()>,
}

#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(api: ApiClient, store: Arc<dyn SessionStore>) -> Self {
        let (state, _) = watch::channel(SessionSnapshot {
            loading: true,
            ..SessionSnapshot::anonymous()
        });
        Self {
            inner: Arc::new(Inner {
                api,
                store,
                state,
                refresh_lock: Mutex::new(()),
            }),
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.state.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.state.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_authenticated()
    }

    fn persist(&self) {
        let snap = self.snapshot();
        let result = if snap.is_authenticated() {
            self.inner.store.save(&PersistedAuth {
                is_authenticated: true,
                access_token: snap.access_token,
                user: snap.user,
                cookies: self.inner.api.export_cookies(),
            })
        } else {
            self.inner.store.clear()
        };
        if let Err(e) = result {
            warn!(error = %e, "could not persist session");
        }
    }

    fn adopt(&self, user: PublicUser, access_token: String) {
        self.inner.state.send_replace(SessionSnapshot {
            user: Some(user),
            access_token: Some(access_token),
            loading: false,
        });
        self.persist();
    }

    fn clear_local(&self) {
        self.inner.state.send_replace(SessionSnapshot::anonymous());
        self.persist();
    }

    /// Restores a persisted session, cookies included. A stored token the
    /// server refuses gets one refresh attempt; anything else ends anonymous
    /// with storage wiped.
    pub async fn boot(&self) -> SessionSnapshot {
        let persisted = match self.inner.store.load() {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "could not read persisted session");
                None
            }
        };
        let Some(PersistedAuth {
            access_token: Some(token),
            cookies,
            ..
        }) = persisted.filter(|p| p.is_authenticated)
        else {
            self.clear_local();
            return self.snapshot();
        };
        if let Some(cookies) = cookies.as_deref() {
            self.inner.api.import_cookies(cookies);
        }

        match self.inner.api.current_user(&token).await {
            Ok(user) => self.adopt(user, token),
            Err(e) => {
                debug!(error = %e, "stored access token refused; trying refresh");
                match self.refresh_access_token(&token).await {
                    Ok(fresh) => match self.inner.api.current_user(&fresh).await {
                        Ok(user) => self.adopt(user, fresh),
                        Err(e) => {
                            warn!(error = %e, "current user unavailable after refresh");
                            self.clear_local();
                        }
                    },
                    Err(e) => {
                        info!(error = %e, "session could not be restored");
                        self.clear_local();
                    }
                }
            }
        }
        self.snapshot()
    }

    /// Adopts a login result. Either argument missing leaves state untouched.
    pub fn login(
        &self,
        user: Option<PublicUser>,
        access_token: Option<String>,
    ) -> Result<(), ClientError> {
        let mut user = user.ok_or(ClientError::MissingUser)?;
        let access_token = access_token
            .filter(|t| !t.is_empty())
            .ok_or(ClientError::MissingToken)?;
        if user.fullname.trim().is_empty() {
            user.fullname = user.username.clone();
        }
        info!(username = %user.username, "session started");
        self.adopt(user, access_token);
        Ok(())
    }

    pub async fn sign_in(&self, username: &str, password: &str) -> Result<PublicUser, ClientError> {
        let resp = self.inner.api.login(username, password).await?;
        self.login(Some(resp.user), Some(resp.access_token))?;
        self.snapshot().user.ok_or(ClientError::NotAuthenticated)
    }

    /// Server logout is best effort; local state is always cleared.
    pub async fn logout(&self) -> &'static str {
        if let Some(token) = self.snapshot().access_token {
            if let Err(e) = self.inner.api.logout(&token).await {
                debug!(error = %e, "server logout failed; clearing locally anyway");
            }
        }
        self.clear_local();
        LANDING_ROUTE
    }

    /// Replaces the cached profile without asking the server.
    pub fn update_user(&self, user: PublicUser) {
        self.inner.state.send_modify(|s| s.user = Some(user));
        self.persist();
    }

    /// Single-flight: callers that queued behind a refresh reuse its token.
    async fn refresh_access_token(&self, stale: &str) -> Result<String, ClientError> {
        let _guard = self.inner.refresh_lock.lock().await;
        if let Some(current) = self.snapshot().access_token {
            if current != stale {
                return Ok(current);
            }
        }
        let fresh = self.inner.api.refresh().await?.access_token;
        self.inner
            .state
            .send_modify(|s| s.access_token = Some(fresh.clone()));
        self.persist();
        Ok(fresh)
    }

    /// Runs `op` with the current access token. A refused token triggers one
    /// refresh and one retry. A failed refresh, or a retry whose fresh token
    /// is refused too, ends the session.
    pub async fn authorized<T, F, Fut>(&self, op: F) -> Result<T, ClientError>
    where
        F: Fn(ApiClient, String) -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let token = self
            .snapshot()
            .access_token
            .ok_or(ClientError::NotAuthenticated)?;

        match op(self.inner.api.clone(), token.clone()).await {
            Err(e) if e.is_token_rejection() => {
                let fresh = match self.refresh_access_token(&token).await {
                    Ok(fresh) => fresh,
                    Err(refresh_err) => {
                        warn!(error = %refresh_err, "refresh failed; ending session");
                        self.clear_local();
                        return Err(ClientError::SessionExpired);
                    }
                };
                match op(self.inner.api.clone(), fresh).await {
                    Err(e) if e.is_token_rejection() => {
                        warn!(error = %e, "fresh access token refused; ending session");
                        self.clear_local();
                        Err(ClientError::SessionExpired)
                    }
                    other => other,
                }
            }
            other => other,
        }
    }

    pub async fn update_profile(&self, req: UpdateProfileRequest) -> Result<PublicUser, ClientError> {
        let user = self
            .authorized(|api, token| {
                let req = req.clone();
                async move { api.update_profile(&token, &req).await }
            })
            .await?;
        self.update_user(user.clone());
        Ok(user)
    }

    pub async fn delete_account(&self, current_password: &str) -> Result<DeletedAccount, ClientError> {
        let req = DeleteAccountRequest {
            current_password: Some(current_password.to_string()),
        };
        let deleted = self
            .authorized(|api, token| {
                let req = req.clone();
                async move { api.delete_account(&token, &req).await }
            })
            .await?;
        self.clear_local();
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;
    use uuid::Uuid;

    use super::*;
    use crate::client::persist::MemorySessionStore;

    fn user(fullname: &str) -> PublicUser {
        PublicUser {
            id: Uuid::new_v4(),
            username: "alice".into(),
            email: "alice@x.com".into(),
            fullname: fullname.into(),
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    fn manager() -> (SessionManager, Arc<MemorySessionStore>) {
        let store = Arc::new(MemorySessionStore::new());
        // Nothing listens here; tests below never reach the network.
        let api = ApiClient::new("http://127.0.0.1:9").unwrap();
        (SessionManager::new(api, store.clone()), store)
    }

    #[test]
    fn starts_loading_and_anonymous() {
        let (mgr, _) = manager();
        let snap = mgr.snapshot();
        assert!(snap.loading);
        assert!(!snap.is_authenticated());
    }

    #[test]
    fn login_with_missing_parts_leaves_state_alone() {
        let (mgr, store) = manager();
        assert!(matches!(
            mgr.login(None, Some("tok".into())),
            Err(ClientError::MissingUser)
        ));
        assert!(matches!(
            mgr.login(Some(user("Alice")), None),
            Err(ClientError::MissingToken)
        ));
        assert!(!mgr.is_authenticated());
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn login_persists_and_notifies_subscribers() {
        let (mgr, store) = manager();
        let mut rx = mgr.subscribe();
        mgr.login(Some(user("")), Some("tok".into())).unwrap();

        assert!(rx.has_changed().unwrap());
        let snap = rx.borrow_and_update().clone();
        assert!(snap.is_authenticated());
        assert!(!snap.loading);
        // Blank fullname falls back to the username.
        assert_eq!(snap.user.unwrap().fullname, "alice");

        let saved = store.load().unwrap().unwrap();
        assert!(saved.is_authenticated);
        assert_eq!(saved.access_token.as_deref(), Some("tok"));
    }

    #[test]
    fn update_user_replaces_cached_profile() {
        let (mgr, store) = manager();
        mgr.login(Some(user("Alice")), Some("tok".into())).unwrap();
        let mut renamed = user("Alice Two");
        renamed.username = "alice2".into();
        mgr.update_user(renamed);
        assert_eq!(mgr.snapshot().user.unwrap().username, "alice2");
        assert_eq!(store.load().unwrap().unwrap().user.unwrap().fullname, "Alice Two");
    }

    #[tokio::test]
    async fn logout_clears_even_when_server_is_unreachable() {
        let (mgr, store) = manager();
        mgr.login(Some(user("Alice")), Some("tok".into())).unwrap();
        assert_eq!(mgr.logout().await, LANDING_ROUTE);
        assert!(!mgr.is_authenticated());
        assert_eq!(store.load().unwrap(), None);
    }

    #[tokio::test]
    async fn boot_without_persisted_session_is_anonymous() {
        let (mgr, _) = manager();
        let snap = mgr.boot().await;
        assert!(!snap.loading);
        assert!(!snap.is_authenticated());
    }

    #[tokio::test]
    async fn authorized_requires_a_session() {
        let (mgr, _) = manager();
        let res: Result<(), _> = mgr
            .authorized(|_api, _token| async { Ok(()) })
            .await;
        assert!(matches!(res, Err(ClientError::NotAuthenticated)));
    }
}
