//! Upload endpoint: accepts raw image bytes and starts the image-hash
//! workflow over every supported algorithm.

use axum::Json;
use axum::extract::{Multipart, State};
use serde::Serialize;
use uuid::Uuid;

use workloom_infra::workflow::image_hash::{IMAGE_HASH_WORKFLOW, ImageHashInput};
use workloom_types::hash::{ByteSource, HashAlgorithm};

use crate::http::error::ApiError;
use crate::state::AppState;

/// Upload size ceiling (10 MB), applied as the request body limit.
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub workflow_id: Uuid,
    pub message: String,
    pub file_name: String,
}

/// POST /api/upload
///
/// Reads the first file field of the multipart body, validates it is an
/// image, and starts one workflow instance hashing it with all five
/// algorithms.
pub async fn upload_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("invalid multipart body: {e}")))?
    else {
        return Err(ApiError::Validation("No file uploaded".to_string()));
    };

    let file_name = field
        .file_name()
        .map(str::to_string)
        .unwrap_or_else(|| "upload.bin".to_string());
    let content_type = field.content_type().map(str::to_string);
    let bytes = field
        .bytes()
        .await
        .map_err(|e| ApiError::Validation(format!("failed to read upload: {e}")))?;

    if !content_type
        .as_deref()
        .is_some_and(|mime| mime.starts_with("image/"))
    {
        return Err(ApiError::Validation("File must be an image".to_string()));
    }

    let input = ImageHashInput {
        file_name: file_name.clone(),
        image: ByteSource::from_bytes(&bytes),
        algorithms: HashAlgorithm::ALL.to_vec(),
    };
    let input = serde_json::to_value(input)
        .map_err(|e| ApiError::Internal(format!("serialize workflow input: {e}")))?;

    let handle = state
        .client
        .make(IMAGE_HASH_WORKFLOW)
        .map_err(ApiError::from)?
        .start(input)
        .await
        .map_err(ApiError::from)?;

    tracing::info!(
        workflow_id = %handle.id(),
        file_name = file_name.as_str(),
        size = bytes.len(),
        "upload accepted, hash workflow started"
    );

    Ok(Json(UploadResponse {
        workflow_id: handle.id(),
        message: "Image uploaded and hash computation started".to_string(),
        file_name,
    }))
}
