//! Stateless function pair: a static index page and a JSON predict endpoint.
//!
//! Each function maps a [`FunctionRequest`] to a [`FunctionResponse`] and
//! sets its own CORS headers, including answering `OPTIONS` preflight.

use std::path::Path;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::{HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::image::decode_inline;
use crate::pipeline::{Label, Pipeline};

use super::{classify, AppState};

const ALLOW_ORIGIN: &str = "Access-Control-Allow-Origin";
const CONTENT_TYPE: &str = "Content-Type";

const NO_IMAGE: &str = "No image data found in request. Expected JSON with \"image\" field.";

/// An invocation of a function.
#[derive(Debug, Clone, Default)]
pub struct FunctionRequest {
    pub method: String,
    pub body: Option<String>,
}

impl FunctionRequest {
    pub fn new(method: impl Into<String>, body: Option<String>) -> Self {
        Self {
            method: method.into(),
            body,
        }
    }

    fn is(&self, method: &Method) -> bool {
        self.method.eq_ignore_ascii_case(method.as_str())
    }
}

/// The result of a function invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionResponse {
    pub status_code: u16,
    pub headers: Vec<(&'static str, String)>,
    pub body: String,
}

impl FunctionResponse {
    fn new(status_code: u16, body: impl Into<String>) -> Self {
        Self {
            status_code,
            headers: vec![(ALLOW_ORIGIN, "*".to_string())],
            body: body.into(),
        }
    }

    fn with_header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    fn json(status_code: u16, value: &impl Serialize) -> Self {
        // Serializing our own response types cannot fail.
        let body = serde_json::to_string(value).unwrap_or_default();
        Self::new(status_code, body).with_header(CONTENT_TYPE, "application/json")
    }

    fn error(status_code: u16, message: impl Into<String>) -> Self {
        Self::json(status_code, &json!({ "error": message.into() }))
    }

    /// Case-insensitive header lookup.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

impl IntoResponse for FunctionResponse {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, self.body).into_response();

        let headers = response.headers_mut();
        for (name, value) in self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(&value),
            ) {
                headers.insert(name, value);
            }
        }

        response
    }
}

#[derive(Debug, Serialize)]
struct PredictBody {
    prediction: Label,
    percentage: f64,
    confidence: f64,
}

/// Serve the static index page.
pub async fn index(_request: &FunctionRequest, page: &Path) -> FunctionResponse {
    match tokio::fs::read_to_string(page).await {
        Ok(html) => FunctionResponse::new(200, html).with_header(CONTENT_TYPE, "text/html"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::error!("Index page not found at {}", page.display());
            FunctionResponse::new(500, "<h1>Template not found</h1>")
                .with_header(CONTENT_TYPE, "text/html")
        }
        Err(err) => {
            tracing::error!("Failed to read index page {}: {err}", page.display());
            FunctionResponse::new(500, format!("<h1>Error: {err}</h1>"))
                .with_header(CONTENT_TYPE, "text/html")
        }
    }
}

/// Classify a base64 image sent as `{"image": "<base64 or data URL>"}`.
pub async fn predict(request: &FunctionRequest, pipeline: Arc<Pipeline>) -> FunctionResponse {
    tracing::debug!("Request method: {}", request.method);

    if request.is(&Method::OPTIONS) {
        return FunctionResponse::new(200, "")
            .with_header("Access-Control-Allow-Methods", "POST, OPTIONS")
            .with_header("Access-Control-Allow-Headers", "Content-Type");
    }

    if !request.is(&Method::POST) {
        return FunctionResponse::error(405, "Method not allowed. Use POST.");
    }

    let body = match request.body.as_deref() {
        Some(body) if !body.is_empty() => body,
        _ => return FunctionResponse::error(400, "No request body provided"),
    };
    tracing::debug!("Request body length: {}", body.len());

    let payload: Value = match serde_json::from_str(body) {
        Ok(payload) => payload,
        Err(err) => {
            return FunctionResponse::error(400, format!("Invalid JSON in request body: {err}"));
        }
    };

    let result = async {
        let bytes = decode_inline(image_field(&payload)?)?;
        tracing::debug!("Decoded image bytes: {}", bytes.len());
        classify(pipeline, bytes).await
    }
    .await;

    match result {
        Ok(prediction) => {
            tracing::info!("Prediction result: {prediction}");
            FunctionResponse::json(
                200,
                &PredictBody {
                    prediction: prediction.label,
                    percentage: prediction.percentage,
                    confidence: prediction.percentage,
                },
            )
        }
        Err(err @ Error::InvalidImage { .. }) => {
            tracing::warn!("Rejected image: {err}");
            FunctionResponse::error(400, format!("Error processing image: {err}"))
        }
        Err(err) if err.is_client_error() => {
            tracing::warn!("Rejected request: {err}");
            FunctionResponse::error(400, err.to_string())
        }
        Err(err) => {
            tracing::error!("Server error: {err}");
            FunctionResponse::error(500, format!("Server error: {err}"))
        }
    }
}

/// Pull the `image` string out of the payload. Missing, null, and empty
/// values are all treated as absent.
fn image_field(payload: &Value) -> Result<&str> {
    let object = payload.as_object().ok_or_else(|| {
        Error::invalid_input("Expected a JSON object with an \"image\" field.")
    })?;

    match object.get("image") {
        None | Some(Value::Null | Value::Bool(false)) => Err(Error::invalid_input(NO_IMAGE)),
        Some(Value::String(s)) if s.is_empty() => Err(Error::invalid_input(NO_IMAGE)),
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(_) => Err(Error::invalid_input(
            "The \"image\" field must be a base64 string.",
        )),
    }
}

fn to_request(method: &Method, body: &Bytes) -> FunctionRequest {
    let body = (!body.is_empty()).then(|| String::from_utf8_lossy(body).into_owned());
    FunctionRequest::new(method.as_str(), body)
}

/// Body extraction failures (e.g. over the size limit) still answer with a
/// JSON error carrying CORS headers.
fn rejected(rejection: &BytesRejection) -> FunctionResponse {
    tracing::warn!("Rejected request body: {}", rejection.body_text());
    FunctionResponse::error(rejection.status().as_u16(), rejection.body_text())
}

/// `ANY /api`, `ANY /api/index`
pub async fn index_route(
    State(state): State<Arc<AppState>>,
    method: Method,
    body: std::result::Result<Bytes, BytesRejection>,
) -> FunctionResponse {
    match body {
        Ok(body) => index(&to_request(&method, &body), &state.config.index_page).await,
        Err(rejection) => rejected(&rejection),
    }
}

/// `ANY /api/predict`
pub async fn predict_route(
    State(state): State<Arc<AppState>>,
    method: Method,
    body: std::result::Result<Bytes, BytesRejection>,
) -> FunctionResponse {
    match body {
        Ok(body) => predict(&to_request(&method, &body), Arc::clone(&state.pipeline)).await,
        Err(rejection) => rejected(&rejection),
    }
}
