//! HTTP surfaces: the form server and the function pair, served by one router.

pub mod form;
pub mod function;
mod template;

pub use function::{FunctionRequest, FunctionResponse};
pub use template::{PageContext, Templates};

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    routing::{any, get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::error::{Error, Result};
use crate::pipeline::{Pipeline, Prediction};

/// Configuration for the HTTP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,

    /// Where form uploads are saved and served from.
    pub upload_dir: PathBuf,

    /// Static page served by the index function.
    pub index_page: PathBuf,

    /// Maximum accepted request body in bytes.
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            upload_dir: PathBuf::from("static").join("uploads"),
            index_page: PathBuf::from("public").join("index.html"),
            max_body_size: 10 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any parameter is out of valid range.
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() || self.host.chars().any(char::is_whitespace) {
            return Err(Error::InvalidParameter {
                name: "host".to_string(),
                reason: format!("invalid host {:?}", self.host),
            });
        }

        if self.max_body_size == 0 {
            return Err(Error::InvalidParameter {
                name: "max_body_size".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// Resolve the address the server binds to. The host may be an IP
    /// literal or a name such as `localhost`.
    ///
    /// # Errors
    ///
    /// Returns an error if the host does not resolve to any address.
    pub async fn socket_addr(&self) -> Result<SocketAddr> {
        let invalid = |reason: String| Error::InvalidParameter {
            name: "host".to_string(),
            reason,
        };

        tokio::net::lookup_host((self.host.as_str(), self.port))
            .await
            .map_err(|err| invalid(format!("cannot resolve {}: {err}", self.host)))?
            .next()
            .ok_or_else(|| invalid(format!("{} resolved to no addresses", self.host)))
    }
}

/// State shared by every handler.
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub config: ServerConfig,
    templates: Templates,
}

impl AppState {
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the page
    /// templates fail to compile.
    pub fn new(pipeline: Arc<Pipeline>, config: ServerConfig) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            pipeline,
            config,
            templates: Templates::new()?,
        })
    }
}

/// Build the router for both surfaces.
pub fn build_app(state: Arc<AppState>) -> Router {
    let uploads = ServeDir::new(&state.config.upload_dir);
    let max_body_size = state.config.max_body_size;

    Router::new()
        .route("/", get(form::index))
        .route("/predict", post(form::predict))
        .route("/api", any(function::index_route))
        .route("/api/index", any(function::index_route))
        .route("/api/predict", any(function::predict_route))
        .route("/health", get(health))
        .nest_service("/static/uploads", uploads)
        .layer(DefaultBodyLimit::max(max_body_size))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the address is invalid or the listener fails.
pub async fn serve(state: Arc<AppState>) -> Result<()> {
    let addr = state.config.socket_addr().await?;
    tokio::fs::create_dir_all(&state.config.upload_dir).await?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{addr}");
    tracing::info!("  - GET  /             upload form");
    tracing::info!("  - POST /predict      multipart upload");
    tracing::info!("  - ANY  /api/index    static page");
    tracing::info!("  - ANY  /api/predict  base64 JSON predict");

    axum::serve(listener, build_app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// `GET /health`
async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "model_loaded": state.pipeline.model().is_loaded(),
    }))
}

/// Decode and classify on the blocking pool.
pub(crate) async fn classify(pipeline: Arc<Pipeline>, bytes: Vec<u8>) -> Result<Prediction> {
    tokio::task::spawn_blocking(move || pipeline.classify_bytes(&bytes)).await?
}

pub(crate) const fn status_for(err: &Error) -> StatusCode {
    if err.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}
