//! Integration test: HTTP endpoint

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use churnlens::{create_router, AnalysisConfig, AnalysisSession, FileSource};
use serde_json::Value;
use tower::ServiceExt;

fn test_app() -> axum::Router {
    let config = AnalysisConfig {
        credentials_present: false,
        synthetic_rows: 600,
        ..AnalysisConfig::default()
    };
    // missing file falls back to the synthetic dataset
    let source = FileSource::new("/nonexistent/cancelamentos.csv");
    create_router(Arc::new(AnalysisSession::new(config, Box::new(source))))
}

fn post(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_preflight() {
    let response = test_app()
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/analisar")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let headers = response.headers();
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "GET, POST, OPTIONS");
    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_HEADERS],
        "Content-Type, Authorization"
    );
    assert_eq!(headers[header::ACCESS_CONTROL_MAX_AGE], "3600");

    let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
    assert!(bytes.is_empty());
}

#[tokio::test]
async fn test_bogus_step_is_bad_request() {
    let response = test_app()
        .oneshot(post("/", r#"{"action":"step_analysis","step":"bogus"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    let body = json_body(response).await;
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("bogus"));
}

#[tokio::test]
async fn test_model_step() {
    let response = test_app()
        .oneshot(post("/analisar", r#"{"action":"step_analysis","step":"modelo"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["success"], true);

    let data = &body["data"];
    for metric in ["acuracia", "precisao", "recall", "f1_score"] {
        let value: f64 = data[metric].as_str().unwrap().parse().unwrap();
        assert!((0.0..=1.0).contains(&value), "{} = {}", metric, value);
    }
    assert!(!data["matriz_confusao_base64"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_full_analysis() {
    let response = test_app()
        .oneshot(post("/", r#"{"action":"full_analysis"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/json"
    );
    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"].as_object().unwrap().len(), 7);
}

#[tokio::test]
async fn test_malformed_body_runs_full_analysis() {
    let response = test_app().oneshot(post("/", "{not json")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert!(body["data"]["insights"].is_object());
}

#[tokio::test]
async fn test_liveness() {
    let response = test_app()
        .oneshot(post("/", r#"{"action":"status"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert!(body["message"].is_string());
    assert!(body["timestamp"].is_number());
    assert!(body.get("data").is_none());
}

#[tokio::test]
async fn test_null_action_is_liveness() {
    let response = test_app()
        .oneshot(post("/", r#"{"action":null}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert!(body["message"].is_string());
    assert!(body.get("data").is_none());
}

#[tokio::test]
async fn test_unsupported_method() {
    let response = test_app()
        .oneshot(
            Request::builder()
                .method(Method::PUT)
                .uri("/")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    let body = json_body(response).await;
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_unknown_path() {
    let response = test_app()
        .oneshot(
            Request::builder()
                .uri("/nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
