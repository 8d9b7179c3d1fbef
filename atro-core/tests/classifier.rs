use std::{net::SocketAddr, time::Duration};

use atro_core::classifier::{
    Analyzer, Classification, Classifier, ClassifierError, OpenAiClassifier,
};
use atro_model::Severity;
use axum::{
    Json, Router,
    http::{HeaderMap, StatusCode},
    routing::post,
};
use serde_json::{Value, json};

async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

fn classifier(addr: SocketAddr) -> OpenAiClassifier {
    OpenAiClassifier::new(
        "test-key".to_string(),
        "gpt-4o".to_string(),
        format!("http://{addr}/v1"),
        Duration::from_secs(5),
    )
    .unwrap()
}

async fn completions(
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let authorized = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        == Some("Bearer test-key");
    if !authorized || body["response_format"]["type"] != "json_object" {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "denied" })));
    }

    let content = json!({
        "severity": "critical",
        "analysis": "Repeated root login failures from one address",
        "recommendation": "Block the source address",
        "confidence": 0.82
    })
    .to_string();
    (
        StatusCode::OK,
        Json(json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }]
        })),
    )
}

#[tokio::test]
async fn classifies_through_chat_completions() {
    let addr = serve(Router::new().route("/v1/chat/completions", post(completions))).await;

    let classification = classifier(addr)
        .classify("Failed password for root from 203.0.113.9")
        .await
        .unwrap();

    assert_eq!(classification.severity, Severity::Critical);
    assert_eq!(classification.recommendation, "Block the source address");
    assert!((classification.confidence - 0.82).abs() < f64::EPSILON);
}

#[tokio::test]
async fn error_status_is_reported_and_analyzer_falls_back() {
    let router = Router::new().route(
        "/v1/chat/completions",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "upstream down") }),
    );
    let addr = serve(router).await;
    let classifier = classifier(addr);

    let err = classifier.classify("anything").await.unwrap_err();
    assert!(matches!(err, ClassifierError::Status { status: 500, .. }));

    let analyzer = Analyzer::new(std::sync::Arc::new(classifier), Duration::from_secs(5));
    assert_eq!(analyzer.analyze("anything").await, Classification::fallback());
}

#[tokio::test]
async fn slow_endpoint_times_out_to_fallback() {
    let router = Router::new().route(
        "/v1/chat/completions",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            StatusCode::OK
        }),
    );
    let addr = serve(router).await;

    let analyzer = Analyzer::new(
        std::sync::Arc::new(classifier(addr)),
        Duration::from_millis(200),
    );
    let classification = analyzer.analyze("port scan").await;
    assert_eq!(classification.severity, Severity::Medium);
    assert_eq!(classification.confidence, 0.0);
}
