use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    routing::{delete, get, post},
    Router,
};
use tracing::{instrument, warn};

use super::dto::{AudioList, DeletedAudio, UploadedAudio};
use super::services::{self, UploadItem, MAX_AUDIO_BYTES};
use crate::{
    auth::AuthUser,
    error::{ApiResponse, AppError, AppResult},
    state::AppState,
};

pub fn audio_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/audio/upload-audio",
            // Room for the multipart framing around a maximum-size clip.
            post(upload_audio).layer(DefaultBodyLimit::max(MAX_AUDIO_BYTES + 1024 * 1024)),
        )
        .route("/audio/list-audio", get(list_audio))
        .route("/audio/delete-audio/*public_id", delete(delete_audio))
}

fn multipart_err(e: axum::extract::multipart::MultipartError) -> AppError {
    warn!(error = %e, "unreadable multipart body");
    AppError::validation(e.body_text())
}

/// Fields: `audio` (file) and `ownerName` (text).
#[instrument(skip_all, fields(user_id = %user.id))]
pub async fn upload_audio(
    State(st): State<AppState>,
    AuthUser(user): AuthUser,
    mut mp: Multipart,
) -> AppResult<ApiResponse<UploadedAudio>> {
    let mut file = None;
    let mut owner = None;
    while let Some(field) = mp.next_field().await.map_err(multipart_err)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("audio") => {
                let content_type = field
                    .content_type()
                    .map(str::to_string)
                    .unwrap_or_else(|| "application/octet-stream".into());
                let file_name = field.file_name().map(str::to_string);
                let body = field.bytes().await.map_err(multipart_err)?;
                file = Some((body, content_type, file_name));
            }
            Some("ownerName") => {
                owner = Some(field.text().await.map_err(multipart_err)?);
            }
            _ => {}
        }
    }

    let Some((body, content_type, file_name)) = file else {
        return Err(AppError::validation("No file uploaded"));
    };
    let uploaded = services::upload_sample(
        &st,
        UploadItem {
            body,
            content_type,
            file_name,
            owner: owner.unwrap_or_default(),
        },
    )
    .await?;
    Ok(ApiResponse::ok("File uploaded successfully", uploaded))
}

#[instrument(skip_all)]
pub async fn list_audio(
    State(st): State<AppState>,
    _user: AuthUser,
) -> AppResult<ApiResponse<AudioList>> {
    let list = services::list_samples(&st).await?;
    Ok(ApiResponse::ok("Audio files retrieved successfully", list))
}

#[instrument(skip(st, _user))]
pub async fn delete_audio(
    State(st): State<AppState>,
    _user: AuthUser,
    Path(public_id): Path<String>,
) -> AppResult<ApiResponse<DeletedAudio>> {
    let public_id = public_id.trim_start_matches('/');
    let deleted = services::delete_sample(&st, public_id).await?;
    Ok(ApiResponse::ok("Audio file deleted successfully", deleted))
}
