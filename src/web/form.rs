//! Form server: upload page and multipart predict.

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};

use crate::error::{Error, Result};
use crate::pipeline::Prediction;

use super::template::PageContext;
use super::{status_for, AppState};

const IMAGE_FIELD: &str = "image";

/// `GET /`
pub async fn index(State(state): State<Arc<AppState>>) -> Response {
    render(&state, StatusCode::OK, &PageContext::default())
}

/// `POST /predict`
pub async fn predict(
    State(state): State<Arc<AppState>>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Response {
    match handle_upload(&state, multipart).await {
        Ok((prediction, image_name)) => {
            tracing::info!("Prediction for {image_name}: {prediction}");
            let ctx = PageContext {
                prediction_text: Some(prediction.to_string()),
                image_name: Some(image_name),
                percentage: Some(prediction.percentage),
            };
            render(&state, StatusCode::OK, &ctx)
        }
        Err(err) => {
            let status = status_for(&err);
            let text = match err {
                Error::InvalidInput { reason } => reason,
                err => format!("Error: {err}"),
            };
            if status.is_server_error() {
                tracing::error!("Upload failed: {text}");
            } else {
                tracing::warn!("Upload rejected: {text}");
            }
            render(&state, status, &PageContext::message(text))
        }
    }
}

async fn handle_upload(
    state: &AppState,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<(Prediction, String)> {
    let multipart = multipart.map_err(|err| {
        tracing::debug!("Not a multipart request: {err}");
        Error::invalid_input("No file uploaded.")
    })?;

    let (file_name, data) = read_image_field(multipart).await?;
    let path = save_upload(state, &file_name, &data).await?;

    let pipeline = Arc::clone(&state.pipeline);
    let prediction =
        tokio::task::spawn_blocking(move || pipeline.classify_file(&path)).await??;

    Ok((prediction, file_name))
}

/// Find the `image` file part. Returns its sanitized file name and contents.
async fn read_image_field(mut multipart: Multipart) -> Result<(String, Vec<u8>)> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| Error::invalid_input(format!("Invalid multipart body: {err}")))?
    {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        // A part without a filename is a plain form value, not a file.
        let file_name = match field.file_name() {
            None => continue,
            Some("") => return Err(Error::invalid_input("No file selected.")),
            Some(name) => {
                secure_filename(name).ok_or_else(|| Error::invalid_input("Invalid file name."))?
            }
        };

        let data = field
            .bytes()
            .await
            .map_err(|err| Error::invalid_input(format!("Failed to read upload: {err}")))?;

        return Ok((file_name, data.to_vec()));
    }

    Err(Error::invalid_input("No file uploaded."))
}

async fn save_upload(state: &AppState, file_name: &str, data: &[u8]) -> Result<PathBuf> {
    let upload_dir = &state.config.upload_dir;
    tokio::fs::create_dir_all(upload_dir).await?;

    let path = upload_dir.join(file_name);
    tokio::fs::write(&path, data).await?;
    tracing::debug!("Saved upload to {}", path.display());

    Ok(path)
}

/// Reduce a client-supplied file name to a safe single path component.
///
/// Path separators and whitespace become `_`, anything outside
/// `[A-Za-z0-9._-]` is dropped, and leading/trailing `.` and `_` are
/// stripped. Returns `None` if nothing is left.
#[must_use]
pub fn secure_filename(name: &str) -> Option<String> {
    let flattened: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = flattened.split_whitespace().collect::<Vec<_>>().join("_");

    let cleaned: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();

    let trimmed = cleaned.trim_matches(|c| c == '.' || c == '_');
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn render(state: &AppState, status: StatusCode, ctx: &PageContext) -> Response {
    match state.templates.render_index(ctx) {
        Ok(html) => (status, Html(html)).into_response(),
        Err(err) => {
            tracing::error!("Failed to render page: {err}");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {err}")).into_response()
        }
    }
}
