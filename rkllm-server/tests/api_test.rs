//! Integration tests for the HTTP surface against a fixture registry with
//! no model loaded (no native `.rkllm` file or hardware is available here).

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use rkllm_server::{build_router, AppState, CacheStore, Config, LifecycleManager, ModelRegistry, Scheduler};

fn empty_state() -> Arc<AppState> {
    let config = Config::default();
    let registry = Arc::new(ModelRegistry::new());
    let lifecycle = Arc::new(LifecycleManager::new(config.clone()));
    let cache_dir = tempfile::tempdir().unwrap();
    let cache_store = Arc::new(CacheStore::new(cache_dir.path().to_path_buf()));
    let scheduler = Arc::new(Scheduler::new(1));
    Arc::new(AppState::new(config, registry, lifecycle, cache_store, scheduler))
}

#[tokio::test]
async fn test_health_endpoint_reports_no_model_loaded() {
    let app = build_router(empty_state());

    let response = app
        .oneshot(Request::builder().uri("/v1/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_models_list_is_empty_with_no_registry_entries() {
    let app = build_router(empty_state());

    let response = app
        .oneshot(Request::builder().uri("/v1/models").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_chat_completions_with_no_models_returns_service_unavailable() {
    let app = build_router(empty_state());

    let body = serde_json::json!({
        "messages": [{"role": "user", "content": "Hello"}]
    });
    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_chat_completions_rejects_empty_messages() {
    let app = build_router(empty_state());

    let body = serde_json::json!({ "messages": [] });
    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_embeddings_disabled_by_default() {
    let app = build_router(empty_state());

    let body = serde_json::json!({ "model": "qwen3-0.6b", "input": "hello" });
    let request = Request::builder()
        .method("POST")
        .uri("/v1/embeddings")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_cache_delete_of_protected_name_is_forbidden() {
    let app = build_router(empty_state());

    let request = Request::builder()
        .method("DELETE")
        .uri("/v1/cache/qwen3-0.6b/system")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_ollama_tags_lists_registry_contents() {
    let app = build_router(empty_state());

    let response = app
        .oneshot(Request::builder().uri("/api/tags").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[test]
fn test_chat_request_minimal() {
    use rkllm_common::ChatCompletionRequest;

    let json = r#"{
        "model": "qwen3-0.6b",
        "messages": [
            {"role": "user", "content": "Hello"}
        ]
    }"#;

    let request: ChatCompletionRequest = serde_json::from_str(json).unwrap();
    assert_eq!(request.model, Some("qwen3-0.6b".to_string()));
    assert_eq!(request.messages.len(), 1);
    assert_eq!(request.messages[0].role, "user");
}
