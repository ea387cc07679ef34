//! Acceptance flow: register an endpoint through the management API, then
//! call it.

use axum::body::{to_bytes, Body};
use axum::http::{header::CONTENT_TYPE, Request, StatusCode};
use axum::Router;
use echo_mock::config::ServerSettings;
use echo_mock::dispatcher::JSON_API_CONTENT_TYPE;
use echo_mock::{Dispatcher, SqliteRegistry};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

async fn build_app() -> Router {
    let registry = SqliteRegistry::connect("sqlite::memory:")
        .await
        .expect("Failed to create registry");
    Dispatcher::new(Arc::new(registry), &ServerSettings::default()).router()
}

struct Step {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    body: &'static str,
    want_status: StatusCode,
    want_body: Value,
    want_content_type: &'static str,
}

#[tokio::test]
async fn test_acceptance() {
    let app = build_app().await;

    let steps = [
        Step {
            name: "1 - Client requests non-existing path",
            method: "GET",
            path: "/hello",
            body: "",
            want_status: StatusCode::NOT_FOUND,
            want_body: json!({"errors": [{"code": "Not Found", "detail": "Requested page `/hello` does not exist"}]}),
            want_content_type: JSON_API_CONTENT_TYPE,
        },
        Step {
            name: "2 - Client creates an endpoint",
            method: "POST",
            path: "/endpoints",
            body: r#"{"data":{"type":"endpoints","attributes":{"verb":"GET","path":"/hello","response":{"code":200,"headers":{"Content-Type":"application/json"},"body":"\"{ \"message\": \"Hello, world\" }\""}}}}"#,
            want_status: StatusCode::CREATED,
            want_body: json!({"data": {
                "type": "endpoints",
                "id": 1,
                "attributes": {
                    "verb": "GET",
                    "path": "/hello",
                    "response": {
                        "code": 200,
                        "headers": {"Content-Type": "application/json"},
                        "body": "\"{ \"message\": \"Hello, world\" }\""
                    }
                }
            }}),
            want_content_type: JSON_API_CONTENT_TYPE,
        },
        Step {
            name: "3 - Client requests the recently created endpoint",
            method: "GET",
            path: "/hello",
            body: "",
            want_status: StatusCode::OK,
            want_body: json!({"message": "Hello, world"}),
            want_content_type: "application/json",
        },
        Step {
            name: "4 - Client requests the endpoint on the same path, but with different HTTP verb",
            method: "POST",
            path: "/hello",
            body: "",
            want_status: StatusCode::NOT_FOUND,
            want_body: json!({"errors": [{"code": "Not Found", "detail": "Requested page `/hello` does not exist"}]}),
            want_content_type: JSON_API_CONTENT_TYPE,
        },
        Step {
            name: "5 - Client lists the registered endpoints",
            method: "GET",
            path: "/endpoints",
            body: "",
            want_status: StatusCode::OK,
            want_body: json!({"data": [{
                "type": "endpoints",
                "id": 1,
                "attributes": {
                    "verb": "GET",
                    "path": "/hello",
                    "response": {
                        "code": 200,
                        "headers": {"Content-Type": "application/json"},
                        "body": "\"{ \"message\": \"Hello, world\" }\""
                    }
                }
            }]}),
            want_content_type: JSON_API_CONTENT_TYPE,
        },
    ];

    for step in steps {
        let request = Request::builder()
            .method(step.method)
            .uri(step.path)
            .body(Body::from(step.body))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();

        assert_eq!(response.status(), step.want_status, "{}", step.name);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            step.want_content_type,
            "{}",
            step.name
        );
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, step.want_body, "{}", step.name);
    }
}

#[tokio::test]
async fn test_endpoint_lifecycle() {
    let app = build_app().await;

    let create = r#"{"data":{"type":"endpoints","attributes":{"verb":"GET","path":"/status","response":{"code":200,"body":"up"}}}}"#;
    let update = r#"{"data":{"type":"endpoints","attributes":{"verb":"GET","path":"/status","response":{"code":503,"headers":{"Retry-After":"30"},"body":"down"}}}}"#;

    let send = |method: &'static str, path: &'static str, body: &'static str| {
        let app = app.clone();
        async move {
            let request = Request::builder()
                .method(method)
                .uri(path)
                .body(Body::from(body))
                .unwrap();
            let response = app.oneshot(request).await.unwrap();
            let status = response.status();
            let retry_after = response
                .headers()
                .get("retry-after")
                .map(|v| v.to_str().unwrap().to_string());
            let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            (status, retry_after, String::from_utf8(bytes.to_vec()).unwrap())
        }
    };

    let (status, _, _) = send("POST", "/endpoints", create).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _, body) = send("GET", "/status", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "up");

    let (status, _, _) = send("PATCH", "/endpoints/1", update).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, retry_after, body) = send("GET", "/status", "").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(retry_after.as_deref(), Some("30"));
    assert_eq!(body, "down");

    let (status, _, body) = send("DELETE", "/endpoints/1", "").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(body.is_empty());

    let (status, _, _) = send("GET", "/status", "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, body) = send("GET", "/endpoints", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"data":[]}"#);
}
