use anyhow::{Context, Result};
use axum::body::Body;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode};
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tracing::info;

use super::extract::{ServerError, extract_request, upload_request};
use super::models::{
    ErrorResponse, ExtractRequest, ExtractResponse, HealthResponse, RelationshipsRequest,
    UploadRequest, UploadResponse,
};
use super::state::ServerState;
use crate::extractor::Extractor;
use crate::pipeline::Relationships;
use crate::settings;

type HandlerError = (StatusCode, Json<ErrorResponse>);

pub async fn run_server(settings: settings::Settings, extractor: Extractor) -> Result<()> {
    let addr = settings.server_addr.clone();
    let app = router(ServerState::new(&settings, extractor));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind server address {}", addr))?;
    info!("listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

pub(crate) fn router(state: ServerState) -> Router {
    // base64 inflates payloads by a third
    let body_limit = state.max_upload_bytes / 3 * 4 + 64 * 1024;
    Router::new()
        .route("/health", get(health))
        .route("/api/upload", post(upload))
        .route("/api/ar/extract", post(extract))
        .route("/api/ar/relationships", post(relationships))
        .with_state(Arc::new(state))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(axum::middleware::from_fn(cors_middleware))
}

async fn health(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            segmentation: state.extractor.has_segmenter(),
            labeling: state.extractor.has_labeler(),
        }),
    )
}

async fn cors_middleware(req: Request<Body>, next: Next) -> Result<Response<Body>, StatusCode> {
    if req.method() == Method::OPTIONS {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        apply_cors_headers(response.headers_mut());
        return Ok(response);
    }
    let mut response = next.run(req).await;
    apply_cors_headers(response.headers_mut());
    Ok(response)
}

fn apply_cors_headers(headers: &mut HeaderMap) {
    headers.insert("access-control-allow-origin", HeaderValue::from_static("*"));
    headers.insert(
        "access-control-allow-methods",
        HeaderValue::from_static("GET,POST,OPTIONS"),
    );
    headers.insert(
        "access-control-allow-headers",
        HeaderValue::from_static("content-type,authorization"),
    );
}

fn reject(err: ServerError) -> HandlerError {
    (err.status, Json(ErrorResponse { error: err.message }))
}

fn task_failed(err: tokio::task::JoinError) -> HandlerError {
    reject(ServerError::internal(format!("server task failed: {}", err)))
}

async fn upload(
    State(state): State<Arc<ServerState>>,
    Json(payload): Json<UploadRequest>,
) -> Result<Json<UploadResponse>, HandlerError> {
    let response = tokio::task::spawn_blocking(move || upload_request(state.as_ref(), payload))
        .await
        .map_err(task_failed)?;
    response.map(Json).map_err(reject)
}

async fn extract(
    State(state): State<Arc<ServerState>>,
    Json(payload): Json<ExtractRequest>,
) -> Result<(StatusCode, Json<ExtractResponse>), HandlerError> {
    let handle = tokio::runtime::Handle::current();
    let result = tokio::task::spawn_blocking(move || {
        handle.block_on(extract_request(state.as_ref(), payload))
    })
    .await
    .map_err(task_failed)?;

    match result {
        Ok((status, response)) => Ok((status, Json(response))),
        Err(err) => Err(reject(err)),
    }
}

async fn relationships(
    State(state): State<Arc<ServerState>>,
    Json(payload): Json<RelationshipsRequest>,
) -> Json<Relationships> {
    Json(state.extractor.analyze_relationships(&payload.components))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::encode_png;
    use crate::oracles::{OracleFuture, SegmentationOracle};
    use crate::pipeline::{OracleBox, PipelineConfig};
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use image::{DynamicImage, Rgb, RgbImage};
    use serde_json::{Value, json};
    use std::path::Path;
    use std::time::Duration;
    use tower::ServiceExt;

    struct OneBox;

    impl SegmentationOracle for OneBox {
        fn name(&self) -> &str {
            "one box"
        }

        fn segment(&self, _image: DynamicImage) -> OracleFuture<Vec<OracleBox>> {
            Box::pin(async {
                Ok(vec![OracleBox {
                    bbox: [100.0, 100.0, 220.0, 180.0].into(),
                    confidence: Some(0.9),
                }])
            })
        }
    }

    fn diagram_png() -> Vec<u8> {
        let mut img = RgbImage::from_pixel(400, 300, Rgb([255, 255, 255]));
        for y in 100..180 {
            for x in 100..220 {
                let edge = x < 102 || x >= 218 || y < 102 || y >= 178;
                let value = if edge { 0 } else { 180 };
                img.put_pixel(x, y, Rgb([value, value, value]));
            }
        }
        encode_png(&DynamicImage::ImageRgb8(img)).unwrap()
    }

    fn app(upload_dir: &Path) -> Router {
        let extractor = Extractor::new(PipelineConfig::default()).with_segmenter(OneBox);
        router(ServerState {
            extractor,
            upload_dir: upload_dir.to_path_buf(),
            extract_timeout: Duration::from_secs(10),
            max_upload_bytes: 1024 * 1024,
        })
    }

    async fn call(
        app: &Router,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn health_reports_configured_oracles() {
        let dir = tempfile::tempdir().unwrap();
        let (status, body) = call(&app(dir.path()), Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "ok", "segmentation": true, "labeling": false}));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn upload_then_extract_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());
        let (status, uploaded) = call(
            &app,
            Method::POST,
            "/api/upload",
            Some(json!({"name": "pump.png", "data_base64": BASE64.encode(diagram_png())})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(uploaded["mime"], "image/png");
        let stored = uploaded["stored_name"].as_str().unwrap().to_string();

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/ar/extract",
            Some(json!({"stored_name": stored, "hints": ["Pump"], "with_relationships": true})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["components"].as_array().unwrap().len(), 1);
        assert_eq!(body["components"][0]["label"], "Pump");
        assert_eq!(body["relationships"], json!({"connections": []}));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stored_name_must_be_a_plain_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());
        let (status, body) = call(
            &app,
            Method::POST,
            "/api/ar/extract",
            Some(json!({"stored_name": "../settings.toml"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("plain file name"));

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/ar/extract",
            Some(json!({"stored_name": "missing.png"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn exactly_one_image_source_is_required() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(dir.path());
        let (status, _) = call(&app, Method::POST, "/api/ar/extract", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, _) = call(
            &app,
            Method::POST,
            "/api/ar/extract",
            Some(json!({"stored_name": "a.png", "image_base64": "AAAA"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn undecodable_image_is_unprocessable() {
        let dir = tempfile::tempdir().unwrap();
        let (status, body) = call(
            &app(dir.path()),
            Method::POST,
            "/api/ar/extract",
            Some(json!({"image_base64": BASE64.encode(b"not an image at all")})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["status"], "error");
        assert_eq!(body["components"], json!([]));
        assert!(body.get("relationships").is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn non_image_upload_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (status, _) = call(
            &app(dir.path()),
            Method::POST,
            "/api/upload",
            Some(json!({"name": "notes.pdf", "data_base64": BASE64.encode(b"%PDF-1.7\n")})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn relationships_endpoint_pairs_close_components() {
        let dir = tempfile::tempdir().unwrap();
        let component = |id: &str, cx: f32| {
            json!({
                "id": id, "x": cx - 0.05, "y": 0.45, "width": 0.1, "height": 0.1,
                "center_x": cx, "center_y": 0.5, "confidence": 0.9, "area": 0.01
            })
        };
        let (status, body) = call(
            &app(dir.path()),
            Method::POST,
            "/api/ar/relationships",
            Some(json!({"components": [
                component("component_0", 0.2),
                component("component_1", 0.3),
                component("component_2", 0.9),
            ]})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let connections = body["connections"].as_array().unwrap();
        assert_eq!(connections.len(), 1);
        assert_eq!(connections[0]["from"], "component_0");
        assert_eq!(connections[0]["to"], "component_1");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn preflight_gets_cors_headers() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(dir.path())
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/api/ar/extract")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            HeaderValue::from_static("*")
        );
    }
}
