use std::path::{Path, PathBuf};

use axum::{
    extract::{Path as UrlPath, State, rejection::PathRejection},
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
};
use directories::BaseDirs;
use tracing::{debug, warn};

use crate::error::ApiError;
use crate::state::AppState;

const FALLBACK_MIME: &str = "application/octet-stream";

/// `GET /attachments/{attachment_id}`: the file exactly as Messages.app
/// stored it. No format conversion.
pub async fn get_attachment(
    State(state): State<AppState>,
    attachment_id: Result<UrlPath<i64>, PathRejection>,
) -> Result<Response, ApiError> {
    let UrlPath(attachment_id) = attachment_id.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let attachment = state
        .read(move |store| store.attachment(attachment_id))
        .await?
        .ok_or_else(|| ApiError::NotFound("Attachment not found".into()))?;
    let stored = attachment
        .filename
        .as_deref()
        .ok_or_else(|| ApiError::NotFound("Attachment has no file".into()))?;
    let path = expand_home(stored);

    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::NotFound("Attachment file not found on disk".into()));
        }
        Err(e) => {
            warn!("Cannot read attachment {} at {}: {}", attachment_id, path.display(), e);
            return Err(ApiError::Internal(e.to_string()));
        }
    };
    debug!("Serving attachment {} ({} bytes)", attachment_id, bytes.len());

    let mime = attachment
        .resolved_mime_type()
        .unwrap_or_else(|| FALLBACK_MIME.to_string());
    let name = attachment
        .transfer_name
        .clone()
        .or_else(|| file_name(&path))
        .unwrap_or_else(|| format!("attachment-{}", attachment_id));

    let mut response = bytes.into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&mime).unwrap_or(HeaderValue::from_static(FALLBACK_MIME)),
    );
    // Names that cannot be a header value are served without one.
    if let Ok(value) = HeaderValue::from_str(&content_disposition(&name)) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

/// Attachment paths are usually stored as `~/Library/Messages/...`.
pub fn expand_home(stored: &str) -> PathBuf {
    let Some(rest) = stored.strip_prefix("~/") else {
        return PathBuf::from(stored);
    };
    match BaseDirs::new() {
        Some(dirs) => dirs.home_dir().join(rest),
        None => PathBuf::from(stored),
    }
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

fn content_disposition(name: &str) -> String {
    let safe: String = name
        .chars()
        .map(|c| if c == '"' || c == '\\' { '_' } else { c })
        .collect();
    format!("inline; filename=\"{}\"", safe)
}
