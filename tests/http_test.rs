//! Router integration tests for the form server and the function pair.

use std::io::Cursor;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::Request,
    http::{header::CONTENT_TYPE, Method, StatusCode},
    response::Response,
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use http_body_util::BodyExt;
use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use pneumonia_detect::image::ImageTensor;
use pneumonia_detect::model::{Classifier, LoadClassifier, ModelHandle};
use pneumonia_detect::web::{build_app, AppState, ServerConfig};
use pneumonia_detect::{Config, Error, Pipeline, Result};

const BOUNDARY: &str = "X-PNEUMONIA-TEST-BOUNDARY";

struct Fixed(f32);

impl Classifier for Fixed {
    fn predict(&self, input: &ImageTensor) -> Result<f32> {
        assert_eq!(input.shape(), &[1, 256, 256, 1]);
        Ok(self.0)
    }
}

struct Missing;

impl LoadClassifier for Missing {
    fn load(&self) -> Result<Arc<dyn Classifier>> {
        Err(Error::ModelNotFound {
            searched: "model.onnx".to_string(),
        })
    }
}

struct TestApp {
    router: Router,
    dir: TempDir,
}

impl TestApp {
    fn with_handle(handle: ModelHandle) -> Self {
        Self::build(handle, ServerConfig::default().max_body_size)
    }

    fn build(handle: ModelHandle, max_body_size: usize) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let index_page = dir.path().join("index.html");
        std::fs::write(&index_page, "<!DOCTYPE html><title>Pneumonia Detection</title>").unwrap();

        let config = ServerConfig {
            upload_dir: dir.path().join("uploads"),
            index_page,
            max_body_size,
            ..ServerConfig::default()
        };
        let pipeline = Arc::new(Pipeline::new(Config::default(), Arc::new(handle)).unwrap());
        let state = Arc::new(AppState::new(pipeline, config).unwrap());

        Self {
            router: build_app(state),
            dir,
        }
    }

    fn new(probability: f32) -> Self {
        Self::with_handle(ModelHandle::preloaded(Arc::new(Fixed(probability))))
    }

    fn uploads(&self) -> std::path::PathBuf {
        self.dir.path().join("uploads")
    }

    async fn send(&self, req: Request) -> Response {
        self.router.clone().oneshot(req).await.unwrap()
    }
}

fn encoded_image(format: ImageFormat) -> Vec<u8> {
    let img = DynamicImage::ImageLuma8(GrayImage::from_fn(120, 90, |x, y| {
        Luma([u8::try_from((x + y) % 256).unwrap()])
    }));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, format).unwrap();
    buf.into_inner()
}

fn multipart_part(name: &str, filename: Option<&str>, data: &[u8]) -> Vec<u8> {
    let mut part = format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"");
    if let Some(filename) = filename {
        part.push_str(&format!("; filename=\"{filename}\"\r\nContent-Type: application/octet-stream"));
    }
    part.push_str("\r\n\r\n");

    let mut bytes = part.into_bytes();
    bytes.extend_from_slice(data);
    bytes.extend_from_slice(b"\r\n");
    bytes
}

fn multipart_request(parts: &[Vec<u8>]) -> Request {
    let mut body: Vec<u8> = parts.concat();
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri("/predict")
        .header(CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap()
}

fn json_request(method: Method, body: Option<&Value>) -> Request {
    let body = body.map_or_else(Body::empty, |b| Body::from(b.to_string()));
    Request::builder()
        .method(method)
        .uri("/api/predict")
        .header(CONTENT_TYPE, "application/json")
        .body(body)
        .unwrap()
}

async fn body_string(resp: Response) -> String {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(resp: Response) -> Value {
    serde_json::from_str(&body_string(resp).await).unwrap()
}

fn header<'a>(resp: &'a Response, name: &str) -> Option<&'a str> {
    resp.headers().get(name).and_then(|v| v.to_str().ok())
}

#[cfg(test)]
mod form_tests {
    use super::*;

    #[tokio::test]
    async fn test_index_renders_form() {
        let app = TestApp::new(0.5);
        let req = Request::builder().uri("/").body(Body::empty()).unwrap();

        let resp = app.send(req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let html = body_string(resp).await;
        assert!(html.contains("enctype=\"multipart/form-data\""));
        assert!(html.contains("name=\"image\""));
    }

    #[tokio::test]
    async fn test_upload_is_classified_and_saved() {
        let app = TestApp::new(0.97);
        let png = encoded_image(ImageFormat::Png);

        let resp = app
            .send(multipart_request(&[multipart_part("image", Some("scan.png"), &png)]))
            .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let html = body_string(resp).await;
        assert!(html.contains("Pneumonia (97.0%)"), "{html}");
        assert!(html.contains("/static/uploads/scan.png"));
        assert_eq!(std::fs::read(app.uploads().join("scan.png")).unwrap(), png);

        let req = Request::builder()
            .uri("/static/uploads/scan.png")
            .body(Body::empty())
            .unwrap();
        assert_eq!(app.send(req).await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_upload_name_is_sanitized() {
        let app = TestApp::new(0.1);
        let jpeg = encoded_image(ImageFormat::Jpeg);

        let resp = app
            .send(multipart_request(&[multipart_part(
                "image",
                Some("../../chest x-ray.jpeg"),
                &jpeg,
            )]))
            .await;
        assert_eq!(resp.status(), StatusCode::OK);

        assert!(body_string(resp).await.contains("Normal (10.0%)"));
        assert!(app.uploads().join("chest_x-ray.jpeg").is_file());
        assert!(!app.dir.path().join("chest x-ray.jpeg").exists());
    }

    #[tokio::test]
    async fn test_missing_file_field() {
        let app = TestApp::new(0.5);

        let resp = app
            .send(multipart_request(&[multipart_part("comment", None, b"hello")]))
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(body_string(resp).await.contains("No file uploaded."));
    }

    #[tokio::test]
    async fn test_empty_filename() {
        let app = TestApp::new(0.5);

        let resp = app
            .send(multipart_request(&[multipart_part("image", Some(""), b"")]))
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(body_string(resp).await.contains("No file selected."));
    }

    #[tokio::test]
    async fn test_not_multipart() {
        let app = TestApp::new(0.5);
        let req = Request::builder()
            .method(Method::POST)
            .uri("/predict")
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();

        let resp = app.send(req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(body_string(resp).await.contains("No file uploaded."));
    }

    #[tokio::test]
    async fn test_undecodable_upload() {
        let app = TestApp::new(0.5);

        let resp = app
            .send(multipart_request(&[multipart_part(
                "image",
                Some("notes.txt"),
                b"not an x-ray",
            )]))
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(body_string(resp).await.contains("Error: image could not be decoded"));
    }

    #[tokio::test]
    async fn test_model_failure_renders_server_error() {
        let app = TestApp::with_handle(ModelHandle::new(Missing));
        let png = encoded_image(ImageFormat::Png);

        let resp = app
            .send(multipart_request(&[multipart_part("image", Some("scan.png"), &png)]))
            .await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_string(resp).await.contains("no model file found"));
    }
}

#[cfg(test)]
mod function_tests {
    use super::*;

    #[tokio::test]
    async fn test_predict_json() {
        let app = TestApp::new(0.99);
        let payload = json!({ "image": STANDARD.encode(encoded_image(ImageFormat::Jpeg)) });

        let resp = app.send(json_request(Method::POST, Some(&payload))).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(header(&resp, "access-control-allow-origin"), Some("*"));
        assert_eq!(header(&resp, "content-type"), Some("application/json"));

        let body = body_json(resp).await;
        assert_eq!(body["prediction"], "Pneumonia");
        assert_eq!(body["percentage"], body["confidence"]);
        assert_eq!(body["percentage"].as_f64(), Some(99.0));
    }

    #[tokio::test]
    async fn test_predict_data_url() {
        let app = TestApp::new(0.4);
        let image = format!(
            "data:image/png;base64,{}",
            STANDARD.encode(encoded_image(ImageFormat::Png))
        );

        let resp = app
            .send(json_request(Method::POST, Some(&json!({ "image": image }))))
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["prediction"], "Normal");
    }

    #[tokio::test]
    async fn test_preflight() {
        let app = TestApp::with_handle(ModelHandle::new(Missing));

        let resp = app.send(json_request(Method::OPTIONS, None)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(header(&resp, "access-control-allow-origin"), Some("*"));
        assert_eq!(
            header(&resp, "access-control-allow-methods"),
            Some("POST, OPTIONS")
        );
        assert_eq!(
            header(&resp, "access-control-allow-headers"),
            Some("Content-Type")
        );
        assert!(body_string(resp).await.is_empty());
    }

    #[tokio::test]
    async fn test_oversized_body_keeps_cors() {
        let app = TestApp::build(ModelHandle::preloaded(Arc::new(Fixed(0.5))), 1024);
        let payload = json!({ "image": "A".repeat(4096) });

        for uri in ["/api/predict", "/api/index"] {
            let req = Request::builder()
                .method(Method::POST)
                .uri(uri)
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap();

            let resp = app.send(req).await;
            assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE, "{uri}");
            assert_eq!(header(&resp, "access-control-allow-origin"), Some("*"));
            assert_eq!(header(&resp, "content-type"), Some("application/json"));
            assert!(body_json(resp).await["error"].is_string(), "{uri}");
        }
    }

    #[tokio::test]
    async fn test_get_not_allowed() {
        let app = TestApp::new(0.5);

        let resp = app.send(json_request(Method::GET, None)).await;
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert!(body_json(resp).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_no_body() {
        let app = TestApp::new(0.5);

        let resp = app.send(json_request(Method::POST, None)).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error"], "No request body provided");
    }

    #[tokio::test]
    async fn test_model_unavailable() {
        let app = TestApp::with_handle(ModelHandle::new(Missing));
        let payload = json!({ "image": STANDARD.encode(encoded_image(ImageFormat::Png)) });

        let resp = app.send(json_request(Method::POST, Some(&payload))).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body_json(resp).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_index_function() {
        let app = TestApp::new(0.5);

        for uri in ["/api", "/api/index"] {
            let req = Request::builder()
                .method(Method::POST)
                .uri(uri)
                .body(Body::empty())
                .unwrap();

            let resp = app.send(req).await;
            assert_eq!(resp.status(), StatusCode::OK);
            assert_eq!(header(&resp, "content-type"), Some("text/html"));
            assert_eq!(header(&resp, "access-control-allow-origin"), Some("*"));
            assert!(body_string(resp).await.contains("Pneumonia Detection"));
        }
    }

    #[tokio::test]
    async fn test_index_function_missing_page() {
        let app = TestApp::new(0.5);
        std::fs::remove_file(app.dir.path().join("index.html")).unwrap();

        let req = Request::builder().uri("/api").body(Body::empty()).unwrap();
        let resp = app.send(req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_string(resp).await, "<h1>Template not found</h1>");
    }
}

#[cfg(test)]
mod health_tests {
    use super::*;

    async fn model_loaded(app: &TestApp) -> Value {
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = app.send(req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        body_json(resp).await["model_loaded"].clone()
    }

    #[tokio::test]
    async fn test_health_reports_model_state() {
        assert_eq!(model_loaded(&TestApp::new(0.5)).await, json!(true));
        assert_eq!(
            model_loaded(&TestApp::with_handle(ModelHandle::new(Missing))).await,
            json!(false)
        );
    }
}
