use std::sync::Arc;

use tracing::warn;

use crate::auth::credentials::CredentialStore;
use crate::auth::jwt::JwtKeys;
use crate::auth::repo::PgUserStore;
use crate::auth::store::{MemoryUserStore, UserStore};
use crate::clock::{Clock, SystemClock};
use crate::config::AppConfig;
use crate::db;
use crate::storage::{MemoryStorage, Storage, StorageClient};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub users: CredentialStore,
    pub jwt: JwtKeys,
    pub storage: Arc<dyn StorageClient>,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let config = Arc::new(config);

        let users: Arc<dyn UserStore> = match &config.database_url {
            Some(url) => Arc::new(PgUserStore::new(db::connect(url).await?)),
            None => {
                warn!("DATABASE_URL not set; users live in memory and vanish on restart");
                Arc::new(MemoryUserStore::new())
            }
        };

        let storage: Arc<dyn StorageClient> = match &config.storage {
            Some(s3) => Arc::new(
                Storage::new(&s3.endpoint, &s3.bucket, &s3.access_key, &s3.secret_key, &s3.region)
                    .await?,
            ),
            None => {
                warn!("S3_ENDPOINT/S3_BUCKET not set; audio samples are kept in memory");
                Arc::new(MemoryStorage::new("http://localhost/audio"))
            }
        };

        Ok(Self::from_parts(config, users, storage, Arc::new(SystemClock)))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        users: Arc<dyn UserStore>,
        storage: Arc<dyn StorageClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let jwt = JwtKeys::new(&config.jwt, clock);
        Self {
            config,
            users: CredentialStore::new(users),
            jwt,
            storage,
        }
    }

    /// Everything in memory; the clock is injectable so tests can expire tokens.
    pub fn in_memory(config: AppConfig, clock: Arc<dyn Clock>) -> Self {
        Self::from_parts(
            Arc::new(config),
            Arc::new(MemoryUserStore::new()),
            Arc::new(MemoryStorage::new("https://fake.local")),
            clock,
        )
    }
}
