//! Image edit endpoint: POST /api/image
//!
//! Multipart form with an `image` file and a `prompt` text field. The edited
//! image is written under the configured output directory and served back
//! from `/edited_images/`.

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use threadline_agent::image::{ImageEditOutcome, ImageEditRequest};
use tracing::{info, warn};

use crate::app::AppState;
use crate::http::error::{api_error, ApiError};

const MISSING_INPUT: &str = "Image file and prompt are required";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageReply {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

struct Upload {
    bytes: Vec<u8>,
    mime_type: String,
}

/// POST /api/image: send the upload and prompt to the image model.
pub async fn image_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<ImageReply>, ApiError> {
    let mut prompt = String::new();
    let mut upload: Option<Upload> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("prompt") => {
                prompt = field
                    .text()
                    .await
                    .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;
            }
            Some("image") => {
                let mime_type = field
                    .content_type()
                    .map(str::to_string)
                    .unwrap_or_else(|| "image/png".to_string());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;
                upload = Some(Upload {
                    bytes: bytes.to_vec(),
                    mime_type,
                });
            }
            _ => {}
        }
    }

    let Some(upload) = upload.filter(|u| !u.bytes.is_empty()) else {
        return Err(api_error(StatusCode::BAD_REQUEST, MISSING_INPUT));
    };
    if prompt.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, MISSING_INPUT));
    }

    info!(
        editor = state.images.name(),
        bytes = upload.bytes.len(),
        mime = %upload.mime_type,
        "image edit request"
    );
    let req = ImageEditRequest {
        bytes: upload.bytes,
        mime_type: upload.mime_type,
        prompt,
    };

    match state.images.edit(&req).await {
        Ok(ImageEditOutcome::Image { bytes, .. }) => {
            let file_name = format!("edited_{}.png", uuid::Uuid::new_v4());
            write_output(Path::new(&state.config.image.output_dir), &file_name, &bytes)
                .await
                .map_err(|e| {
                    warn!(error = %e, "failed to write edited image");
                    api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
                })?;
            info!(file = %file_name, "edited image saved");
            Ok(Json(ImageReply {
                message: "Image edited successfully".to_string(),
                image_url: Some(format!("/edited_images/{file_name}")),
            }))
        }
        Ok(ImageEditOutcome::Text(text)) => Ok(Json(ImageReply {
            message: text,
            image_url: None,
        })),
        Err(e) => {
            warn!(error = %e, "image edit failed");
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

async fn write_output(dir: &Path, file_name: &str, bytes: &[u8]) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(dir.join(file_name), bytes).await
}
