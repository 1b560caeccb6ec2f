use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::response::Json;
use serde_json::{json, Value};

use crate::pipeline::pipeline::FaceLandmarkPipeline;
use crate::server::error::ApiError;
use crate::utils::coordinate::DetectionResponse;

const UPLOAD_FIELD: &str = "file";

pub async fn root() -> Json<Value> {
    Json(json!({ "message": "Face Detection API is running" }))
}

pub async fn detect_face(
    State(pipeline): State<Arc<FaceLandmarkPipeline>>,
    mut multipart: Multipart,
) -> Result<Json<DetectionResponse>, ApiError> {
    let (filename, content) = read_upload(&mut multipart).await?;
    tracing::debug!(filename = %filename, bytes = content.len(), "received upload");

    let response = pipeline.detect_faces_in_image(&filename, &content).await?;
    Ok(Json(response))
}

async fn read_upload(multipart: &mut Multipart) -> Result<(String, Vec<u8>), ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Upload(e.status(), e.body_text()))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::Upload(e.status(), e.body_text()))?;
        return Ok((filename, data.to_vec()));
    }
    Err(ApiError::MissingFile)
}
