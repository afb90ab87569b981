//! Per-worker HTTP surface.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use adlock_common::{constants, time, AdlockError, SharedRecord, WorkerId};

use crate::metrics::MetricsSnapshot;
use crate::worker::Worker;

const AVAILABLE_ENDPOINTS: [&str; 5] = [
    "GET /status",
    "GET /ads",
    "POST /update",
    "GET /health",
    "GET /metrics",
];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    worker_id: WorkerId,
    process_id: u32,
    status: &'static str,
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct AdsResponse {
    success: bool,
    data: Option<SharedRecord>,
}

/// Body of `POST /update`. Both fields are optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    pub operation_name: Option<String>,
    /// Simulated work in milliseconds.
    pub duration: Option<f64>,
}

#[derive(Debug, Serialize)]
struct UpdateResponse {
    success: bool,
    message: &'static str,
    data: SharedRecord,
}

#[derive(Debug, Serialize)]
struct UnavailableResponse {
    success: bool,
    message: &'static str,
}

#[derive(Debug, Serialize)]
struct FailureResponse {
    success: bool,
    error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: &'static str,
    worker_id: WorkerId,
    store: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NotFoundResponse {
    error: &'static str,
    available_endpoints: [&'static str; 5],
}

/// Build the router for one worker.
pub fn router(worker: Arc<Worker>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/status", get(status).fallback(not_found))
        .route("/ads", get(ads).fallback(not_found))
        .route("/update", post(update).fallback(not_found))
        .route("/health", get(health).fallback(not_found))
        .route("/metrics", get(metrics).fallback(not_found))
        .fallback(not_found)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(worker)
}

async fn status(State(worker): State<Arc<Worker>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        worker_id: worker.worker_id(),
        process_id: worker.process_id(),
        status: worker.state().as_str(),
        timestamp: time::format_timestamp(time::now()),
    })
}

async fn ads(State(worker): State<Arc<Worker>>) -> Response {
    match worker.shared_state().read().await {
        Ok(data) => (StatusCode::OK, Json(AdsResponse { success: true, data })).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to read shared record");
            failure(e.to_string())
        }
    }
}

async fn update(State(worker): State<Arc<Worker>>, body: Bytes) -> Response {
    let state = worker.state();
    if !state.accepts_requests() {
        info!(state = %state, "Refusing update");
        return unavailable();
    }

    let request = match parse_update(&body) {
        Ok(request) => request,
        Err(e) => {
            error!(error = %e, "Malformed update request");
            return failure(e.to_string());
        }
    };

    let label = operation_label(request.operation_name, worker.worker_id());
    let work = work_duration(request.duration);

    info!(label = %label, work_ms = work.as_millis() as u64, "Update requested");

    // Detached so a dropped connection cannot cancel the run between acquire and release.
    let runner = worker.runner();
    let outcome = tokio::spawn(async move { runner.run(&label, work).await }).await;

    match outcome {
        Ok(Ok(record)) => (
            StatusCode::OK,
            Json(UpdateResponse {
                success: true,
                message: "Operation completed successfully",
                data: record,
            }),
        )
            .into_response(),
        Ok(Err(AdlockError::LockUnavailable { .. })) => unavailable(),
        Ok(Err(e)) => failure(e.to_string()),
        Err(e) => {
            error!(error = %e, "Update task aborted");
            failure(e.to_string())
        }
    }
}

async fn health(State(worker): State<Arc<Worker>>) -> Response {
    match worker.check_health().await {
        Ok(_) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy",
                worker_id: worker.worker_id(),
                store: "connected",
                error: None,
            }),
        )
            .into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "unhealthy",
                worker_id: worker.worker_id(),
                store: "disconnected",
                error: Some(e.to_string()),
            }),
        )
            .into_response(),
    }
}

async fn metrics(State(worker): State<Arc<Worker>>) -> Json<MetricsSnapshot> {
    Json(worker.metrics().snapshot())
}

async fn not_found() -> (StatusCode, Json<NotFoundResponse>) {
    (
        StatusCode::NOT_FOUND,
        Json(NotFoundResponse {
            error: "Not Found",
            available_endpoints: AVAILABLE_ENDPOINTS,
        }),
    )
}

/// Empty or whitespace-only bodies mean "all defaults".
fn parse_update(body: &[u8]) -> serde_json::Result<UpdateRequest> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(UpdateRequest::default());
    }
    serde_json::from_slice(body)
}

/// Missing or empty names fall back to a per-worker label.
fn operation_label(name: Option<String>, worker_id: WorkerId) -> String {
    name.filter(|name| !name.is_empty())
        .unwrap_or_else(|| format!("HTTP Update Request from Worker {}", worker_id))
}

/// Missing or zero durations use the default. Negative ones mean no work.
fn work_duration(millis: Option<f64>) -> Duration {
    match millis {
        None => constants::DEFAULT_OPERATION_DURATION,
        Some(ms) if ms == 0.0 => constants::DEFAULT_OPERATION_DURATION,
        Some(ms) if ms.is_nan() || ms < 0.0 => Duration::ZERO,
        Some(ms) => Duration::try_from_secs_f64(ms / 1000.0).unwrap_or(Duration::MAX),
    }
}

fn unavailable() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(UnavailableResponse {
            success: false,
            message: "Could not acquire lock. Please try again later.",
        }),
    )
        .into_response()
}

fn failure(error: String) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(FailureResponse {
            success: false,
            error,
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkerConfig;
    use adlock_common::{ResourceKey, RECORD_KEY};
    use adlock_store::{MemoryStore, StoreClient};
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt; // for `oneshot`

    async fn started_worker(stores: &[Arc<MemoryStore>]) -> Arc<Worker> {
        let clients = stores
            .iter()
            .map(|s| s.clone() as Arc<dyn StoreClient>)
            .collect();
        let mut config = WorkerConfig::default();
        config.worker_id = WorkerId::new(2);
        config.quorum.max_retries = 1;
        config.quorum.retry_delay = Duration::from_millis(5);
        config.quorum.retry_jitter = Duration::from_millis(5);
        let worker = Arc::new(Worker::new(config, clients).unwrap());
        worker.start().await.unwrap();
        worker
    }

    async fn send(worker: &Arc<Worker>, request: Request<Body>) -> (StatusCode, Value) {
        let response = router(worker.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_update(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/update")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_status_reports_identity() {
        let worker = started_worker(&[Arc::new(MemoryStore::new("mem-0"))]).await;
        let (status, body) = send(&worker, get_request("/status")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["workerId"], 2);
        assert_eq!(body["status"], "running");
        assert_eq!(body["processId"], std::process::id());
        assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn test_ads_returns_record() {
        let worker = started_worker(&[Arc::new(MemoryStore::new("mem-0"))]).await;
        let (status, body) = send(&worker, get_request("/ads")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["label"], "initial");
        assert_eq!(body["data"]["id"], "worker-2");
    }

    #[tokio::test]
    async fn test_ads_malformed_record_is_server_error() {
        let store = Arc::new(MemoryStore::new("mem-0"));
        let worker = started_worker(&[store.clone()]).await;
        store.set(RECORD_KEY, "garbage").await.unwrap();

        let (status, body) = send(&worker, get_request("/ads")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_update_writes_label() {
        let worker = started_worker(&[Arc::new(MemoryStore::new("mem-0"))]).await;
        let (status, body) = send(
            &worker,
            post_update(r#"{"operationName":"checkout","duration":10}"#),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "Operation completed successfully");
        assert_eq!(body["data"]["label"], "checkout");

        let (_, ads) = send(&worker, get_request("/ads")).await;
        assert_eq!(ads["data"]["label"], "checkout");
    }

    #[tokio::test]
    async fn test_update_defaults_label() {
        let worker = started_worker(&[Arc::new(MemoryStore::new("mem-0"))]).await;
        let (status, body) = send(&worker, post_update(r#"{"duration":1}"#)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["label"], "HTTP Update Request from Worker 2");
    }

    #[tokio::test]
    async fn test_update_empty_name_uses_default_label() {
        let worker = started_worker(&[Arc::new(MemoryStore::new("mem-0"))]).await;
        let (status, body) = send(
            &worker,
            post_update(r#"{"operationName":"","duration":1}"#),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["label"], "HTTP Update Request from Worker 2");
    }

    #[tokio::test]
    async fn test_update_accepts_fractional_durations() {
        let worker = started_worker(&[Arc::new(MemoryStore::new("mem-0"))]).await;

        for body in [r#"{"duration":10.0}"#, r#"{"duration":1.5e1}"#, r#"{"duration":-5}"#] {
            let (status, response) = send(&worker, post_update(body)).await;
            assert_eq!(status, StatusCode::OK, "body {}", body);
            assert_eq!(response["success"], true);
        }
    }

    #[test]
    fn test_work_duration_conversion() {
        assert_eq!(work_duration(None), constants::DEFAULT_OPERATION_DURATION);
        assert_eq!(work_duration(Some(0.0)), constants::DEFAULT_OPERATION_DURATION);
        assert_eq!(work_duration(Some(-20.0)), Duration::ZERO);
        assert_eq!(work_duration(Some(10.0)), Duration::from_millis(10));
        assert_eq!(work_duration(Some(1.5e3)), Duration::from_millis(1500));
        assert_eq!(work_duration(Some(0.5)), Duration::from_micros(500));
    }

    #[tokio::test]
    async fn test_update_refused_during_shutdown() {
        let store = Arc::new(MemoryStore::new("mem-0"));
        let worker = started_worker(&[store.clone()]).await;
        let writes = store.write_count();
        worker.begin_shutdown();

        let (status, body) = send(&worker, post_update(r#"{"duration":1}"#)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["success"], false);
        assert_eq!(store.write_count(), writes);
    }

    #[tokio::test]
    async fn test_update_malformed_body_is_server_error() {
        let worker = started_worker(&[Arc::new(MemoryStore::new("mem-0"))]).await;
        let (status, body) = send(&worker, post_update("{not json")).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_update_unavailable_while_lock_held() {
        let store = Arc::new(MemoryStore::new("mem-0"));
        let worker = started_worker(&[store.clone()]).await;
        store
            .set_if_absent(
                ResourceKey::Cache.store_key(),
                "someone-else",
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        let (status, body) = send(&worker, post_update(r#"{"duration":1}"#)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["success"], false);
        assert_eq!(
            body["message"],
            "Could not acquire lock. Please try again later."
        );
    }

    #[tokio::test]
    async fn test_health_reflects_store_quorum() {
        let stores: Vec<_> = (0..3)
            .map(|i| Arc::new(MemoryStore::new(format!("mem-{}", i))))
            .collect();
        let worker = started_worker(&stores).await;

        let (status, body) = send(&worker, get_request("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["store"], "connected");

        stores[0].set_reachable(false);
        stores[1].set_reachable(false);
        let (status, body) = send(&worker, get_request("/health")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "unhealthy");
        assert_eq!(body["store"], "disconnected");
        assert_eq!(body["workerId"], 2);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_metrics_counts_operations() {
        let worker = started_worker(&[Arc::new(MemoryStore::new("mem-0"))]).await;
        send(&worker, post_update(r#"{"duration":1}"#)).await;

        let (status, body) = send(&worker, get_request("/metrics")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["operationsCompleted"], 1);
        assert_eq!(body["warmupReinitialized"], 1);
        assert_eq!(body["locksActive"], 0);
    }

    #[tokio::test]
    async fn test_unknown_route_lists_endpoints() {
        let worker = started_worker(&[Arc::new(MemoryStore::new("mem-0"))]).await;

        let (status, body) = send(&worker, get_request("/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Not Found");
        assert_eq!(body["availableEndpoints"].as_array().unwrap().len(), 5);

        let (status, _) = send(&worker, get_request("/update")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_cors_allows_any_origin() {
        let worker = started_worker(&[Arc::new(MemoryStore::new("mem-0"))]).await;
        let request = Request::builder()
            .uri("/status")
            .header("origin", "http://example.com")
            .body(Body::empty())
            .unwrap();

        let response = router(worker).oneshot(request).await.unwrap();
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "*"
        );
    }
}
