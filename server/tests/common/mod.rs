//! Common Test Utilities for Integration Tests
//!
//! Shared helpers used across integration test modules.

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, Response},
};
use image::{Rgb, RgbImage};
use maskpaint_server::mask::BinaryMask;
use maskpaint_server::mask::codec::{ImageFormat, decode_image, encode, encode_image_bytes};
use maskpaint_server::oracle::{
    GenerateParams, GeneratedMask, GeneratedMaskSet, OracleError, RemoteColoredMask,
    RemotePaintResult, SegmentPrompt, SegmentResult, SegmentationOracle,
};
use maskpaint_server::{AppState, build_router};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tower::util::ServiceExt;

/// How the mock oracle's remote compositor behaves
#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemotePaint {
    /// Echo the input image back
    Echo,
    /// Fail as if unreachable
    Unavailable,
}

/// In-process stand-in for the segmentation oracle
///
/// `generate_all` returns three masks over the image: left half (score
/// 0.5), top half (0.9) and the whole image (0.3). `segment` returns a
/// 3x3 square around the first point prompt.
pub struct MockOracle {
    pub remote_paint: RemotePaint,
    pub segment_error: Option<fn() -> OracleError>,
    pub paint_calls: AtomicUsize,
    pub generate_calls: AtomicUsize,
}

#[allow(dead_code)]
impl MockOracle {
    pub fn new() -> Self {
        Self {
            remote_paint: RemotePaint::Unavailable,
            segment_error: None,
            paint_calls: AtomicUsize::new(0),
            generate_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_remote_paint(mut self, remote_paint: RemotePaint) -> Self {
        self.remote_paint = remote_paint;
        self
    }

    pub fn with_segment_error(mut self, error: fn() -> OracleError) -> Self {
        self.segment_error = Some(error);
        self
    }

    fn dimensions(image: &str) -> Result<(u32, u32), OracleError> {
        decode_image(image)
            .map(|i| i.dimensions())
            .map_err(|e| OracleError::Upstream(e.to_string()))
    }
}

fn encoded(mask: &BinaryMask) -> String {
    encode(mask).expect("mask encodes")
}

#[async_trait]
impl SegmentationOracle for MockOracle {
    async fn segment(
        &self,
        image: &str,
        prompt: &SegmentPrompt,
    ) -> Result<SegmentResult, OracleError> {
        if let Some(error) = self.segment_error {
            return Err(error());
        }
        let (width, height) = Self::dimensions(image)?;
        let (px, py) = prompt
            .points
            .first()
            .map(|p| (p.x as u32, p.y as u32))
            .unwrap_or((0, 0));
        let mask = BinaryMask::from_fn(width, height, |x, y| {
            x.abs_diff(px) <= 1 && y.abs_diff(py) <= 1
        });

        Ok(SegmentResult {
            mask: encoded(&mask),
            score: Some(0.95),
            bbox: None,
        })
    }

    async fn generate_all(
        &self,
        image: &str,
        _params: &GenerateParams,
    ) -> Result<GeneratedMaskSet, OracleError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        let (width, height) = Self::dimensions(image)?;

        let shapes: [(Box<dyn Fn(u32, u32) -> bool>, f32); 3] = [
            (Box::new(move |x: u32, _: u32| x < width / 2), 0.5),
            (Box::new(move |_: u32, y: u32| y < height / 2), 0.9),
            (Box::new(|_: u32, _: u32| true), 0.3),
        ];
        let masks = shapes
            .into_iter()
            .enumerate()
            .map(|(i, (shape, score))| {
                let mask = BinaryMask::from_fn(width, height, shape);
                GeneratedMask {
                    id: Some(100 + i as u32),
                    area: Some(mask.count_ones()),
                    mask: encoded(&mask),
                    score: Some(score),
                    bbox: None,
                    stability_score: Some(0.9),
                }
            })
            .collect::<Vec<_>>();

        Ok(GeneratedMaskSet {
            total_masks: Some(masks.len()),
            masks,
            width: Some(width),
            height: Some(height),
        })
    }

    async fn paint_remote(
        &self,
        image: &str,
        _layers: &[RemoteColoredMask],
    ) -> Result<RemotePaintResult, OracleError> {
        self.paint_calls.fetch_add(1, Ordering::SeqCst);
        match self.remote_paint {
            RemotePaint::Echo => {
                let (width, height) = Self::dimensions(image)?;
                Ok(RemotePaintResult {
                    painted_image: image.to_string(),
                    width: Some(width),
                    height: Some(height),
                })
            }
            RemotePaint::Unavailable => Err(OracleError::Transport("connection refused".into())),
        }
    }

    async fn health(&self) -> Result<serde_json::Value, OracleError> {
        Ok(serde_json::json!({ "status": "healthy", "model": "mock" }))
    }

    fn endpoint(&self) -> &str {
        "mock://oracle"
    }
}

/// Create a test application router with state around `oracle`
pub fn create_test_app_with_oracle(oracle: Arc<MockOracle>) -> (Router, AppState) {
    let results_dir =
        std::env::temp_dir().join(format!("maskpaint_it_{}", uuid::Uuid::new_v4()));
    let state = AppState::new(oracle).with_results_dir(results_dir);
    (build_router(state.clone()), state)
}

/// Create a test application router with state
pub fn create_test_app_with_state() -> (Router, AppState) {
    create_test_app_with_oracle(Arc::new(MockOracle::new()))
}

/// Create a test application router with all routes configured
#[allow(dead_code)]
pub fn create_test_app() -> Router {
    create_test_app_with_state().0
}

/// Gray PNG with a brighter left half
pub fn test_png(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, _| {
        if x < width / 2 {
            Rgb([180, 180, 180])
        } else {
            Rgb([90, 90, 90])
        }
    });
    encode_image_bytes(&image, ImageFormat::Png).expect("png encodes")
}

const BOUNDARY: &str = "maskpaint-test-boundary";

/// Multipart upload request with a single `file` field
pub fn upload_request(filename: &str, content: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

/// JSON request
pub fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Body-less request
pub fn empty_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Parse a response body as JSON
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

/// Send one request through a clone of `app`
pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    tokio::time::timeout(Duration::from_secs(30), app.clone().oneshot(request))
        .await
        .expect("request timed out")
        .unwrap()
}

/// Upload a `width`x`height` test PNG and return the session id
pub async fn upload_test_image(app: &Router, width: u32, height: u32) -> String {
    let response = send(app, upload_request("facade.png", &test_png(width, height))).await;
    assert_eq!(response.status(), axum::http::StatusCode::OK);
    body_json(response).await["session_id"]
        .as_str()
        .unwrap()
        .to_string()
}

/// Upload a test image and generate its mask set
pub async fn session_with_masks(app: &Router, width: u32, height: u32) -> String {
    let session_id = upload_test_image(app, width, height).await;
    let response = send(
        app,
        json_request(
            "POST",
            "/generate-masks",
            serde_json::json!({ "session_id": session_id }),
        ),
    )
    .await;
    assert_eq!(response.status(), axum::http::StatusCode::OK);
    session_id
}
