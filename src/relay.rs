use bytes::Bytes;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::state::AppState;

/// Errors from copying a model output into durable storage.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to download image: {0}")]
    DownloadFailed(String),
    #[error("image is {size} bytes, exceeds the {limit} byte limit")]
    PayloadTooLarge { size: u64, limit: u64 },
    #[error("failed to upload image: {0}")]
    UploadFailed(#[source] anyhow::Error),
    #[error("storage misconfigured: {0}")]
    Misconfigured(String),
}

/// Pipeline stage a stored object belongs to; part of the object key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Upload,
    Restore,
    Colorize,
}

impl Stage {
    pub fn label(self) -> &'static str {
        match self {
            Stage::Upload => "upload",
            Stage::Restore => "restore",
            Stage::Colorize => "colorize",
        }
    }
}

/// `{user}/{date}/{uuid}-{stage}.{ext}` — namespaced per owner, browsable
/// by day, random component so repeated runs never collide.
fn object_key(user_id: Uuid, stage: Stage, content_type: &str) -> String {
    let date = OffsetDateTime::now_utc().date();
    format!(
        "{}/{}/{}-{}.{}",
        user_id,
        date,
        Uuid::new_v4(),
        stage.label(),
        ext_from_mime(content_type)
    )
}

fn ext_from_mime(ct: &str) -> &'static str {
    match ct {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/heic" => "heic",
        _ => "jpg",
    }
}

fn check_declared_size(declared: Option<u64>, limit: u64) -> Result<(), RelayError> {
    match declared {
        Some(size) if size > limit => Err(RelayError::PayloadTooLarge { size, limit }),
        _ => Ok(()),
    }
}

/// Download a provider's (often ephemeral) output URL and re-upload it
/// under the owner's namespace. Returns a stable, fetchable URL.
#[instrument(skip(state), fields(user_id = %user_id, stage = stage.label()))]
pub async fn save_remote(
    state: &AppState,
    remote_url: &str,
    user_id: Uuid,
    stage: Stage,
) -> Result<String, RelayError> {
    let limit = state.config.storage.max_image_bytes;

    let resp = state
        .http
        .get(remote_url)
        .send()
        .await
        .map_err(|e| RelayError::DownloadFailed(e.to_string()))?;
    if !resp.status().is_success() {
        return Err(RelayError::DownloadFailed(format!(
            "status {}",
            resp.status()
        )));
    }

    let content_type = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("image/jpeg")
        .to_string();

    // Reject on the declared length before buffering the body.
    check_declared_size(resp.content_length(), limit)?;

    let body = resp
        .bytes()
        .await
        .map_err(|e| RelayError::DownloadFailed(e.to_string()))?;
    // Providers are not obliged to declare a length; re-check what arrived.
    check_declared_size(Some(body.len() as u64), limit)?;

    store_bytes(state, body, &content_type, user_id, stage).await
}

/// Upload raw bytes under the owner's namespace and return the URL they
/// will be served from.
pub async fn store_bytes(
    state: &AppState,
    body: Bytes,
    content_type: &str,
    user_id: Uuid,
    stage: Stage,
) -> Result<String, RelayError> {
    let key = object_key(user_id, stage, content_type);

    state
        .storage
        .put_object(&key, body, content_type)
        .await
        .map_err(RelayError::UploadFailed)?;
    debug!(key = %key, "object stored");

    object_url(state, &key).await
}

async fn object_url(state: &AppState, key: &str) -> Result<String, RelayError> {
    let cfg = &state.config.storage;
    if let Some(base) = &cfg.public_base_url {
        return Ok(format!("{}/{}", base.trim_end_matches('/'), key));
    }
    state
        .storage
        .presign_get(key, cfg.signed_url_ttl_secs)
        .await
        .map_err(|e| RelayError::Misconfigured(e.to_string()))
}
