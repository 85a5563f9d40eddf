use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use reqwest::StatusCode;
use time::Duration;
use voiceauth::{
    app::build_app,
    auth::dto::{SignupRequest, UpdateProfileRequest},
    client::{
        ApiClient, ClientError, FileSessionStore, MemorySessionStore, PersistedAuth,
        SessionManager, SessionStore,
    },
    clock::ManualClock,
    config::AppConfig,
    state::AppState,
};

async fn spawn_server() -> (String, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::starting_now());
    let app = build_app(AppState::in_memory(AppConfig::for_tests(), clock.clone())).unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), clock)
}

async fn signed_in_manager(base: &str, store: Arc<dyn SessionStore>) -> SessionManager {
    let api = ApiClient::new(base).unwrap();
    api.signup(&SignupRequest {
        fullname: Some("Alice".into()),
        username: Some("alice".into()),
        email: Some("alice@x.com".into()),
        password: Some("pw123456".into()),
    })
    .await
    .unwrap();
    let mgr = SessionManager::new(api, store);
    mgr.sign_in("alice", "pw123456").await.unwrap();
    mgr
}

#[tokio::test]
async fn sign_in_then_protected_call() {
    let (base, _) = spawn_server().await;
    let store = Arc::new(MemorySessionStore::new());
    let mgr = signed_in_manager(&base, store.clone()).await;

    assert!(mgr.is_authenticated());
    assert!(store.load().unwrap().unwrap().is_authenticated);

    let list = mgr
        .authorized(|api, token| async move { api.list_audio(&token).await })
        .await
        .unwrap();
    assert_eq!(list.count, 0);
}

#[tokio::test]
async fn expired_access_token_is_refreshed_transparently() {
    let (base, clock) = spawn_server().await;
    let mgr = signed_in_manager(&base, Arc::new(MemorySessionStore::new())).await;
    let before = mgr.snapshot().access_token.unwrap();

    clock.advance(Duration::minutes(16));
    let updated = mgr
        .update_profile(UpdateProfileRequest {
            new_fullname: Some("Alice L.".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(updated.fullname, "Alice L.");

    let snap = mgr.snapshot();
    assert_ne!(snap.access_token.unwrap(), before);
    assert_eq!(snap.user.unwrap().fullname, "Alice L.");
}

#[tokio::test]
async fn concurrent_callers_share_one_refresh() {
    let (base, clock) = spawn_server().await;
    let mgr = signed_in_manager(&base, Arc::new(MemorySessionStore::new())).await;
    clock.advance(Duration::minutes(16));

    let calls = (0..4).map(|_| {
        let mgr = mgr.clone();
        tokio::spawn(async move {
            mgr.authorized(|api, token| async move { api.current_user(&token).await })
                .await
        })
    });
    for call in calls.collect::<Vec<_>>() {
        assert_eq!(call.await.unwrap().unwrap().username, "alice");
    }
    assert!(mgr.is_authenticated());
}

#[tokio::test]
async fn boot_recovers_with_refresh_cookie() {
    let (base, clock) = spawn_server().await;
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FileSessionStore::new(dir.path().join("session.json")));
    let mgr = signed_in_manager(&base, store.clone()).await;

    // Same cookie jar, fresh in-memory state: a restarted UI.
    clock.advance(Duration::minutes(16));
    let restarted = SessionManager::new(mgr.api().clone(), store.clone());
    let snap = restarted.boot().await;
    assert!(!snap.loading);
    assert!(snap.is_authenticated());
    assert_eq!(snap.user.unwrap().username, "alice");
}

#[tokio::test]
async fn restarted_process_refreshes_from_the_session_file() {
    let (base, clock) = spawn_server().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    let mgr = signed_in_manager(&base, Arc::new(FileSessionStore::new(&path))).await;
    let stale = mgr.snapshot().access_token.unwrap();
    drop(mgr);

    // New client, new jar, new store: only the file carries over.
    clock.advance(Duration::minutes(16));
    let store = Arc::new(FileSessionStore::new(&path));
    let restarted = SessionManager::new(ApiClient::new(&base).unwrap(), store.clone());
    let snap = restarted.boot().await;
    assert!(snap.is_authenticated());
    assert_ne!(snap.access_token.as_deref(), Some(stale.as_str()));
    assert_eq!(snap.user.unwrap().username, "alice");

    // The rotated cookie was written back, so a second restart works too.
    let saved = store.load().unwrap().unwrap();
    assert!(saved.cookies.unwrap().contains("refreshToken="));
    clock.advance(Duration::minutes(16));
    let again = SessionManager::new(ApiClient::new(&base).unwrap(), store);
    assert!(again.boot().await.is_authenticated());
}

#[tokio::test]
async fn boot_falls_back_to_anonymous_when_refresh_fails() {
    let (base, clock) = spawn_server().await;
    let store = Arc::new(MemorySessionStore::new());
    let mgr = signed_in_manager(&base, store.clone()).await;

    clock.advance(Duration::days(11));
    let restarted = SessionManager::new(mgr.api().clone(), store.clone());
    let snap = restarted.boot().await;
    assert!(!snap.is_authenticated());
    assert_eq!(store.load().unwrap(), None);
}

#[tokio::test]
async fn boot_with_unknown_token_and_no_cookie_clears_storage() {
    let (base, _) = spawn_server().await;
    let store = Arc::new(MemorySessionStore::with(PersistedAuth {
        is_authenticated: true,
        access_token: Some("stale".into()),
        user: None,
        cookies: None,
    }));
    let mgr = SessionManager::new(ApiClient::new(&base).unwrap(), store.clone());
    assert!(!mgr.boot().await.is_authenticated());
    assert_eq!(store.load().unwrap(), None);
}

#[tokio::test]
async fn failed_refresh_ends_the_session() {
    let (base, clock) = spawn_server().await;
    let store = Arc::new(MemorySessionStore::new());
    let mgr = signed_in_manager(&base, store.clone()).await;

    clock.advance(Duration::days(11));
    let res = mgr
        .authorized(|api, token| async move { api.current_user(&token).await })
        .await;
    assert!(matches!(res, Err(ClientError::SessionExpired)));
    assert!(!mgr.is_authenticated());
    assert_eq!(store.load().unwrap(), None);
}

#[tokio::test]
async fn refused_retry_after_refresh_ends_the_session() {
    let (base, _) = spawn_server().await;
    let store = Arc::new(MemorySessionStore::new());
    let mgr = signed_in_manager(&base, store.clone()).await;

    let calls = AtomicUsize::new(0);
    let res: Result<(), _> = mgr
        .authorized(|_api, _token| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(ClientError::Api {
                    status: StatusCode::UNAUTHORIZED,
                    code: Some("TOKEN_EXPIRED".into()),
                    message: "Access token expired".into(),
                })
            }
        })
        .await;

    assert!(matches!(res, Err(ClientError::SessionExpired)));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(!mgr.is_authenticated());
    assert_eq!(store.load().unwrap(), None);
}

#[tokio::test]
async fn wrong_password_is_not_a_session_failure() {
    let (base, _) = spawn_server().await;
    let mgr = signed_in_manager(&base, Arc::new(MemorySessionStore::new())).await;
    let err = mgr.delete_account("not-my-password").await.unwrap_err();
    assert!(err.is_unauthorized());
    assert!(mgr.is_authenticated());

    mgr.delete_account("pw123456").await.unwrap();
    assert!(!mgr.is_authenticated());
}

#[tokio::test]
async fn logout_returns_landing_and_revokes_server_side() {
    let (base, _) = spawn_server().await;
    let mgr = signed_in_manager(&base, Arc::new(MemorySessionStore::new())).await;
    assert_eq!(mgr.logout().await, "/");
    assert!(!mgr.is_authenticated());
    assert!(mgr.api().refresh().await.is_err());
}
