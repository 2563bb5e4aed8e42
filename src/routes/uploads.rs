use crate::{intake::sanitize_filename, server::SharedState};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::instrument;

/// Serves a stored upload back to the upload page. Lookups go through the
/// same sanitizer as stores, so a crafted path can never escape the
/// uploads directory.
#[instrument(skip(state))]
pub async fn serve_upload(
    State(state): State<SharedState>,
    Path(filename): Path<String>,
) -> Response {
    let safe_name = sanitize_filename(&filename);
    if safe_name.is_empty() {
        return StatusCode::NOT_FOUND.into_response();
    }

    let path = state.upload_config.dir.join(&safe_name);
    let data = match tokio::fs::read(&path).await {
        Ok(data) => data,
        Err(_) => return StatusCode::NOT_FOUND.into_response(),
    };

    match Response::builder()
        .header(header::CONTENT_TYPE, content_type_for(&safe_name))
        .body(Body::from(data))
    {
        Ok(response) => response,
        Err(e) => {
            tracing::error!("failed to build upload response: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn content_type_for(filename: &str) -> &'static str {
    if filename.to_ascii_lowercase().ends_with(".png") {
        "image/png"
    } else {
        "image/jpeg"
    }
}
