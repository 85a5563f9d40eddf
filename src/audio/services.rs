use anyhow::Context;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use bytes::Bytes;
use time::OffsetDateTime;
use tracing::info;

use super::dto::{AudioFile, AudioList, DeletedAudio, UploadedAudio};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Bucket prefix for voice training clips.
pub const TRAINING_FOLDER: &str = "voice-web-app/training-audio";
pub const MAX_AUDIO_BYTES: usize = 10 * 1024 * 1024;
pub const MAX_LISTED: usize = 50;
const URL_TTL_SECS: u64 = 60 * 60;

pub const ALLOWED_AUDIO_TYPES: [&str; 5] = [
    "audio/webm",
    "audio/wav",
    "audio/mp3",
    "audio/mpeg",
    "audio/ogg",
];

/// Object metadata key holding the uploader-supplied owner name.
const OWNER_META: &str = "owner";

pub struct UploadItem {
    pub body: Bytes,
    pub content_type: String,
    pub file_name: Option<String>,
    pub owner: String,
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "audio/webm" => Some("webm"),
        "audio/wav" => Some("wav"),
        "audio/mp3" | "audio/mpeg" => Some("mp3"),
        "audio/ogg" => Some("ogg"),
        _ => None,
    }
}

/// Keeps key segments to `[a-z0-9_-]`.
fn key_segment(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '-' })
        .collect();
    let cleaned = cleaned.trim_matches('-').to_string();
    if cleaned.is_empty() {
        "clip".to_string()
    } else {
        cleaned
    }
}

fn object_key(owner: &str, file_name: Option<&str>, ext: &str, at: OffsetDateTime) -> String {
    let stem = file_name
        .map(|n| n.rsplit_once('.').map_or(n, |(stem, _)| stem))
        .unwrap_or("clip");
    let millis = at.unix_timestamp_nanos() / 1_000_000;
    format!(
        "{}/{}/{}_{}.{}",
        TRAINING_FOLDER,
        key_segment(owner),
        millis,
        key_segment(stem),
        ext
    )
}

/// Owner and format recovered from `<folder>/<owner>/<millis>_<stem>.<ext>`.
fn describe_key(key: &str) -> (String, String) {
    let rest = key
        .strip_prefix(TRAINING_FOLDER)
        .map(|r| r.trim_start_matches('/'))
        .unwrap_or(key);
    let owner = match rest.split_once('/') {
        Some((owner, _)) => owner.to_string(),
        None => "unknown".to_string(),
    };
    let format = key
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_string())
        .unwrap_or_default();
    (owner, format)
}

// Metadata travels as HTTP headers, so the name is base64 to survive non-ASCII.
fn encode_owner(owner: &str) -> String {
    URL_SAFE_NO_PAD.encode(owner.as_bytes())
}

fn decode_owner(raw: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(raw).ok()?;
    String::from_utf8(bytes).ok()
}

pub async fn upload_sample(st: &AppState, item: UploadItem) -> AppResult<UploadedAudio> {
    let Some(ext) = ext_from_mime(&item.content_type) else {
        return Err(AppError::validation(format!(
            "Invalid file type. Allowed types: {}",
            ALLOWED_AUDIO_TYPES.join(", ")
        )));
    };
    if item.body.is_empty() {
        return Err(AppError::validation("No file uploaded"));
    }
    if item.body.len() > MAX_AUDIO_BYTES {
        return Err(AppError::validation("File exceeds the 10 MB limit"));
    }
    if item.owner.trim().is_empty() {
        return Err(AppError::validation("Owner name is required"));
    }

    let now = OffsetDateTime::now_utc();
    let key = object_key(&item.owner, item.file_name.as_deref(), ext, now);
    let size = item.body.len() as u64;
    let owner_meta = encode_owner(&item.owner);
    st.storage
        .put_object(
            &key,
            item.body,
            &item.content_type,
            &[(OWNER_META, owner_meta.as_str())],
        )
        .await
        .with_context(|| format!("put_object {}", key))?;
    let url = st
        .storage
        .presign_get(&key, URL_TTL_SECS)
        .await
        .with_context(|| format!("presign url for {}", key))?;

    let (_, format) = describe_key(&key);
    info!(public_id = %key, owner = %item.owner, size, "audio sample stored");
    Ok(UploadedAudio {
        url,
        public_id: key,
        owner: item.owner,
        uploaded_at: now,
        format,
        size,
    })
}

pub async fn list_samples(st: &AppState) -> AppResult<AudioList> {
    let prefix = format!("{}/", TRAINING_FOLDER);
    let objects = st
        .storage
        .list_objects(&prefix, MAX_LISTED)
        .await
        .context("list training audio")?;

    let mut files = Vec::with_capacity(objects.len());
    for obj in objects {
        let url = st.storage.presign_get(&obj.key, URL_TTL_SECS).await?;
        let (segment, format) = describe_key(&obj.key);
        // Objects stored without owner metadata fall back to the key segment.
        let owner = obj
            .metadata
            .get(OWNER_META)
            .and_then(|raw| decode_owner(raw))
            .unwrap_or(segment);
        files.push(AudioFile {
            url,
            public_id: obj.key,
            owner,
            created_at: obj.last_modified,
            format,
            size: obj.size,
        });
    }
    Ok(AudioList {
        count: files.len(),
        files,
    })
}

pub async fn delete_sample(st: &AppState, public_id: &str) -> AppResult<DeletedAudio> {
    if public_id.is_empty() {
        return Err(AppError::validation("Public ID is required"));
    }
    // Only keys inside the training folder are addressable through this API.
    if !public_id.starts_with(&format!("{}/", TRAINING_FOLDER)) || !st.storage.object_exists(public_id).await? {
        return Err(AppError::NotFound("Audio file not found".into()));
    }
    st.storage
        .delete_object(public_id)
        .await
        .with_context(|| format!("delete_object {}", public_id))?;
    info!(%public_id, "audio sample deleted");
    Ok(DeletedAudio {
        public_id: public_id.to_string(),
    })
}
