use std::collections::{BTreeMap, HashMap};

use anyhow::Context;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    presigning::PresigningConfig,
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use axum::async_trait;
use bytes::Bytes;
use time::OffsetDateTime;
use tokio::sync::RwLock;

/// Listing entry for a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
    pub last_modified: OffsetDateTime,
    /// User metadata written with the object. Keys are lowercase.
    pub metadata: HashMap<String, String>,
}

#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Metadata keys must be lowercase and values ASCII; S3 sends them as headers.
    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
        metadata: &[(&str, &str)],
    ) -> anyhow::Result<()>;
    async fn delete_object(&self, key: &str) -> anyhow::Result<()>;
    async fn object_exists(&self, key: &str) -> anyhow::Result<bool>;
    /// Objects under `prefix`, newest first, at most `limit`.
    async fn list_objects(&self, prefix: &str, limit: usize) -> anyhow::Result<Vec<ObjectSummary>>;
    async fn presign_get(&self, key: &str, seconds: u64) -> anyhow::Result<String>;
}

/// S3-compatible bucket (AWS or MinIO, path-style addressing).
#[derive(Clone)]
pub struct Storage {
    client: Client,
    bucket: String,
}

impl Storage {
    pub async fn new(
        endpoint: &str,
        bucket: &str,
        access_key: &str,
        secret_key: &str,
        region: &str,
    ) -> anyhow::Result<Self> {
        let shared = defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .credentials_provider(Credentials::new(
                access_key, secret_key, None, None, "static",
            ))
            .endpoint_url(endpoint)
            .load()
            .await;

        let conf = S3ConfigBuilder::from(&shared)
            .endpoint_url(endpoint)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(conf),
            bucket: bucket.to_string(),
        })
    }
}

impl Storage {
    /// `None` when the object vanished between listing and this call.
    async fn head_metadata(&self, key: &str) -> anyhow::Result<Option<HashMap<String, String>>> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(head) => Ok(Some(head.metadata().cloned().unwrap_or_default())),
            Err(e) => {
                let err = e.into_service_error();
                if err.is_not_found() {
                    Ok(None)
                } else {
                    Err(anyhow::Error::new(err).context(format!("s3 head_object {key}")))
                }
            }
        }
    }
}

#[async_trait]
impl StorageClient for Storage {
    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
        metadata: &[(&str, &str)],
    ) -> anyhow::Result<()> {
        let mut req = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type);
        for (name, value) in metadata {
            req = req.metadata(*name, *value);
        }
        req.send().await.context("s3 put_object")?;
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("s3 delete_object")?;
        Ok(())
    }

    async fn object_exists(&self, key: &str) -> anyhow::Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let err = e.into_service_error();
                if err.is_not_found() {
                    Ok(false)
                } else {
                    Err(anyhow::Error::new(err).context("s3 head_object"))
                }
            }
        }
    }

    async fn list_objects(&self, prefix: &str, limit: usize) -> anyhow::Result<Vec<ObjectSummary>> {
        let mut out = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let page = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .context("s3 list_objects_v2")?;

            for obj in page.contents() {
                let Some(key) = obj.key() else { continue };
                let last_modified = obj
                    .last_modified()
                    .and_then(|t| OffsetDateTime::from_unix_timestamp(t.secs()).ok())
                    .unwrap_or(OffsetDateTime::UNIX_EPOCH);
                out.push(ObjectSummary {
                    key: key.to_string(),
                    size: obj.size().unwrap_or(0).max(0) as u64,
                    last_modified,
                    metadata: HashMap::new(),
                });
            }

            match page.next_continuation_token() {
                Some(token) if page.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }
        // S3 lists in key order; callers want newest first.
        out.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
        out.truncate(limit);

        // Listings carry no user metadata; fetch it for the survivors only.
        let mut listed = Vec::with_capacity(out.len());
        for mut obj in out {
            if let Some(metadata) = self.head_metadata(&obj.key).await? {
                obj.metadata = metadata;
                listed.push(obj);
            }
        }
        Ok(listed)
    }

    async fn presign_get(&self, key: &str, seconds: u64) -> anyhow::Result<String> {
        let req = self.client.get_object().bucket(&self.bucket).key(key);
        let presigned = req
            .presigned(PresigningConfig::expires_in(
                std::time::Duration::from_secs(seconds),
            )?)
            .await
            .context("s3 presign_get")?;
        Ok(presigned.uri().to_string())
    }
}

struct MemoryObject {
    body: Bytes,
    last_modified: OffsetDateTime,
    metadata: HashMap<String, String>,
}

/// In-process bucket for local runs and tests.
pub struct MemoryStorage {
    base_url: String,
    objects: RwLock<BTreeMap<String, MemoryObject>>,
}

impl MemoryStorage {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            objects: RwLock::new(BTreeMap::new()),
        }
    }
}

#[async_trait]
impl StorageClient for MemoryStorage {
    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        _content_type: &str,
        metadata: &[(&str, &str)],
    ) -> anyhow::Result<()> {
        self.objects.write().await.insert(
            key.to_string(),
            MemoryObject {
                body,
                last_modified: OffsetDateTime::now_utc(),
                metadata: metadata
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            },
        );
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        self.objects.write().await.remove(key);
        Ok(())
    }

    async fn object_exists(&self, key: &str) -> anyhow::Result<bool> {
        Ok(self.objects.read().await.contains_key(key))
    }

    async fn list_objects(&self, prefix: &str, limit: usize) -> anyhow::Result<Vec<ObjectSummary>> {
        let objects = self.objects.read().await;
        let mut out: Vec<ObjectSummary> = objects
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, o)| ObjectSummary {
                key: k.clone(),
                size: o.body.len() as u64,
                last_modified: o.last_modified,
                metadata: o.metadata.clone(),
            })
            .collect();
        // Keys embed a millisecond timestamp, so key order breaks ties.
        out.sort_by(|a, b| {
            b.last_modified
                .cmp(&a.last_modified)
                .then_with(|| b.key.cmp(&a.key))
        });
        out.truncate(limit);
        Ok(out)
    }

    async fn presign_get(&self, key: &str, seconds: u64) -> anyhow::Result<String> {
        Ok(format!("{}/{}?expires={}", self.base_url, key, seconds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_storage_lists_by_prefix_newest_first() {
        let st = MemoryStorage::new("https://fake.local");
        st.put_object("a/alice/1_x.webm", Bytes::from_static(b"12"), "audio/webm", &[])
            .await
            .unwrap();
        st.put_object("a/bob/2_y.ogg", Bytes::from_static(b"123"), "audio/ogg", &[("owner", "bob")])
            .await
            .unwrap();
        st.put_object("b/other.wav", Bytes::from_static(b"1"), "audio/wav", &[])
            .await
            .unwrap();

        let listed = st.list_objects("a/", 50).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|o| o.key.starts_with("a/")));
        assert_eq!(listed[0].key, "a/bob/2_y.ogg");
        assert_eq!(listed[0].size, 3);
        assert_eq!(listed[0].metadata.get("owner").map(String::as_str), Some("bob"));
        assert!(listed[1].metadata.is_empty());

        let limited = st.list_objects("a/", 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn memory_storage_exists_and_delete() {
        let st = MemoryStorage::new("https://fake.local");
        st.put_object("k", Bytes::from_static(b"x"), "audio/wav", &[])
            .await
            .unwrap();
        assert!(st.object_exists("k").await.unwrap());
        st.delete_object("k").await.unwrap();
        assert!(!st.object_exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn memory_presign_embeds_key() {
        let st = MemoryStorage::new("https://fake.local");
        let url = st.presign_get("q/w/e.webm", 600).await.unwrap();
        assert!(url.contains("q/w/e.webm"));
    }
}
