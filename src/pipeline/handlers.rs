use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    routing::post,
    Json, Router,
};
use bytes::Bytes;
use tracing::{info, instrument};

use super::dto::{PipelineRequest, PipelineResponse, RestoreResponse, UploadResponse};
use super::services::run_pipeline;
use crate::auth::services::AuthUser;
use crate::config::AppConfig;
use crate::error::ApiError;
use crate::relay::{self, RelayError, Stage};
use crate::state::AppState;

/// Multipart framing overhead allowed on top of the image ceiling.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

fn multipart_body_limit(max_image_bytes: u64) -> usize {
    max_image_bytes as usize + MULTIPART_OVERHEAD
}

pub fn write_routes(config: &AppConfig) -> Router<AppState> {
    Router::new()
        .route("/upload", post(upload))
        .route("/restore", post(restore))
        .route("/pipeline", post(pipeline))
        .layer(DefaultBodyLimit::max(multipart_body_limit(
            config.storage.max_image_bytes,
        )))
}

/// Pull the `file` field out of the multipart body. Decode failures are
/// reported as such, not as a missing field.
async fn read_file_field(mut mp: Multipart) -> Result<(Bytes, String), ApiError> {
    let mut file = None;
    loop {
        match mp.next_field().await {
            Ok(Some(field)) => {
                if field.name() == Some("file") {
                    let content_type = field
                        .content_type()
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "application/octet-stream".into());
                    let data = field.bytes().await.map_err(|e| {
                        ApiError::InvalidRequest(format!("unreadable file field: {e}"))
                    })?;
                    file = Some((data, content_type));
                }
            }
            Ok(None) => break,
            Err(e) => {
                return Err(ApiError::InvalidRequest(format!(
                    "invalid multipart body: {e}"
                )))
            }
        }
    }
    file.ok_or_else(|| ApiError::InvalidRequest("No file provided".into()))
}

/// POST /upload (multipart, `file` field) — stage the original image in
/// our own storage so the providers get a stable input URL.
#[instrument(skip(state, mp))]
pub async fn upload(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    mp: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let (data, content_type) = read_file_field(mp).await?;

    let limit = state.config.storage.max_image_bytes;
    if data.len() as u64 > limit {
        return Err(RelayError::PayloadTooLarge {
            size: data.len() as u64,
            limit,
        }
        .into());
    }

    let input_url = relay::store_bytes(&state, data, &content_type, user_id, Stage::Upload).await?;
    info!(user_id = %user_id, "original uploaded");
    Ok(Json(UploadResponse { input_url }))
}

/// POST /restore — single-stage pipeline.
#[instrument(skip(state, body))]
pub async fn restore(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<PipelineRequest>,
) -> Result<Json<RestoreResponse>, ApiError> {
    let outcome = run_pipeline(&state, user_id, &body.image_url, false).await?;
    Ok(Json(RestoreResponse {
        ok: true,
        id: outcome.record_id,
        input_url: outcome.input_url,
        restored_url: outcome.restored_url,
    }))
}

/// POST /pipeline — restore then colorize.
#[instrument(skip(state, body))]
pub async fn pipeline(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(body): Json<PipelineRequest>,
) -> Result<Json<PipelineResponse>, ApiError> {
    let outcome = run_pipeline(&state, user_id, &body.image_url, true).await?;
    Ok(Json(PipelineResponse {
        ok: true,
        id: outcome.record_id,
        input_url: outcome.input_url,
        restored_url: outcome.restored_url,
        colorized_url: outcome.colorized_url,
        warning: outcome.warning,
    }))
}


#[cfg(test)]
mod upload_tests {
    use super::*;
    use axum::extract::FromRequest;
    use axum::http::Request;

    async fn multipart_from(body: &'static str) -> Multipart {
        let req = Request::builder()
            .header(
                "content-type",
                "multipart/form-data; boundary=XBOUND",
            )
            .body(axum::body::Body::from(body))
            .unwrap();
        Multipart::from_request(req, &()).await.unwrap()
    }

    #[tokio::test]
    async fn reads_the_file_field() {
        let body = "--XBOUND\r\n\
            content-disposition: form-data; name=\"file\"; filename=\"a.jpg\"\r\n\
            content-type: image/jpeg\r\n\r\n\
            fake bytes\r\n\
            --XBOUND--\r\n";
        let (data, ct) = read_file_field(multipart_from(body).await).await.unwrap();
        assert_eq!(&data[..], b"fake bytes");
        assert_eq!(ct, "image/jpeg");
    }

    #[tokio::test]
    async fn missing_file_field_is_reported_as_missing() {
        let body = "--XBOUND\r\n\
            content-disposition: form-data; name=\"other\"\r\n\r\n\
            x\r\n\
            --XBOUND--\r\n";
        let err = read_file_field(multipart_from(body).await)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidRequest(m) if m.contains("No file provided")));
    }

    #[tokio::test]
    async fn malformed_body_surfaces_the_decode_error() {
        // truncated mid-headers, never reaches a field
        let body = "--XBOUND\r\ncontent-disposition: form-data; name=\"file\"\r\n";
        let err = read_file_field(multipart_from(body).await)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidRequest(m) if m.contains("invalid multipart body")));
    }
}
