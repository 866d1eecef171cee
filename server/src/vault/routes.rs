//! REST endpoints for encrypted files.
//!
//! POST   /api/files/upload - Store client-encrypted content
//! GET    /api/files/list - The caller's files, newest first
//! GET    /api/files/download/{id} - Encrypted content + original name
//! DELETE /api/files/delete/{id} - Remove a file
//!
//! Every route requires a bearer token. `encryptedContent` is opaque to the
//! server; its UTF-8 bytes are what gets stored.

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::auth::middleware::Identity;
use crate::db::models::BlobProjection;
use crate::error::ApiError;
use crate::state::AppState;
use crate::vault::NewBlob;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    #[serde(default)]
    pub file_name: String,
    pub file_size: u64,
    #[serde(default)]
    pub encrypted_content: String,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: &'static str,
    pub file: BlobProjection,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResponse {
    pub file_name: String,
    pub encrypted_content: String,
}

/// POST /api/files/upload
pub async fn upload(
    State(state): State<AppState>,
    identity: Identity,
    payload: Result<Json<UploadRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let Json(req) = payload?;

    let file = state
        .vault
        .upload(
            &identity,
            NewBlob {
                logical_name: req.file_name,
                declared_size: req.file_size,
                ciphertext: Bytes::from(req.encrypted_content),
            },
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            message: "File uploaded successfully",
            file,
        }),
    ))
}

/// GET /api/files/list
pub async fn list(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<Vec<BlobProjection>>, ApiError> {
    Ok(Json(state.vault.list(&identity).await?))
}

/// GET /api/files/download/{id}
pub async fn download(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<DownloadResponse>, ApiError> {
    let download = state.vault.download(&identity, &id).await?;

    // Uploads only ever store UTF-8 text, so anything else is damaged content.
    let encrypted_content = String::from_utf8(download.ciphertext.to_vec()).map_err(|_| {
        tracing::error!(blob_id = %id, "stored ciphertext is not valid UTF-8");
        ApiError::new(
            StatusCode::NOT_FOUND,
            "content_missing",
            "File content is no longer available",
        )
    })?;

    Ok(Json(DownloadResponse {
        file_name: download.logical_name,
        encrypted_content,
    }))
}

/// DELETE /api/files/delete/{id}
pub async fn delete(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.vault.delete(&identity, &id).await?;
    Ok(Json(serde_json::json!({ "message": "File deleted successfully" })))
}
