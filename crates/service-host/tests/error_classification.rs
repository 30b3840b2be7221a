// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Integration tests for failure classification over a live listener

mod fixtures;

use axum::{
    Router,
    http::StatusCode,
    routing::{get, post},
};
use fixtures::TestService;
use serde::Deserialize;
use serde_json::{Value, json};
use service_host::{
    ClassifiedError, JsonBody, RequestError, RequestResult, ServiceState,
    metrics::metrics_handler,
};

#[derive(Debug, Deserialize)]
struct Greeting {
    name: String,
}

fn routes() -> Router<ServiceState> {
    Router::new()
        .route(
            "/greet",
            post(|JsonBody(greeting): JsonBody<Greeting>| async move {
                format!("hello {}", greeting.name)
            }),
        )
        .route(
            "/forbidden",
            get(|| async {
                Err::<(), _>(
                    ClassifiedError::new(StatusCode::FORBIDDEN, "forbidden")
                        .with_client_details(json!({"resource": "ledger"}))
                        .with_server_details("caller lacks ledger:read"),
                )
            }),
        )
        .route(
            "/fails",
            get(|| async {
                let result: RequestResult<()> = Err(RequestError::from(anyhow::anyhow!(
                    "database password rejected at db.internal:5432"
                )));
                result
            }),
        )
        .route("/panics", get(panicking))
        .route("/metrics", get(metrics_handler))
}

#[allow(clippy::panic)]
async fn panicking() -> &'static str {
    panic!("index out of bounds in ledger cache")
}

async fn error_body(response: reqwest::Response) -> Value {
    response.json().await.expect("Failed to parse error body")
}

#[tokio::test]
async fn unmatched_route_is_not_found() {
    let test = TestService::new(routes());
    let base = test.start().await;

    for path in ["/missing", "/_/missing"] {
        let response = reqwest::get(format!("{base}{path}"))
            .await
            .expect("Failed to send request");
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{path}");
        assert_eq!(error_body(response).await, json!({"errorCode": "notFound"}));
    }
    test.service.disconnect().await;
}

#[tokio::test]
async fn unparsable_body_is_invalid_json() {
    let test = TestService::new(routes());
    let base = test.start().await;

    let response = reqwest::Client::new()
        .post(format!("{base}/greet"))
        .header("content-type", "application/json")
        .body(r#"{"name": "#)
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_body(response).await, json!({"errorCode": "invalidJSON"}));
    test.service.disconnect().await;
}

#[tokio::test]
async fn valid_body_reaches_the_handler() {
    let test = TestService::new(routes());
    let base = test.start().await;

    let response = reqwest::Client::new()
        .post(format!("{base}/greet"))
        .json(&json!({"name": "ada"}))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.text().await.expect("text body"), "hello ada");
    test.service.disconnect().await;
}

#[tokio::test]
async fn classified_error_passes_through_without_server_details() {
    let test = TestService::new(routes());
    let base = test.start().await;

    let response = reqwest::get(format!("{base}/forbidden"))
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = error_body(response).await;
    assert_eq!(
        body,
        json!({"errorCode": "forbidden", "clientDetails": {"resource": "ledger"}})
    );
    assert!(!body.to_string().contains("ledger:read"));
    test.service.disconnect().await;
}

#[tokio::test]
async fn unclassified_failures_are_generic() {
    let test = TestService::new(routes());
    let base = test.start().await;
    let client = reqwest::Client::new();

    for path in ["/fails", "/panics"] {
        let response = client
            .get(format!("{base}{path}"))
            .send()
            .await
            .expect("Failed to send request");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR, "{path}");

        let text = response.text().await.expect("text body");
        assert_eq!(
            serde_json::from_str::<Value>(&text).expect("json body"),
            json!({"errorCode": "internalError"})
        );
        assert!(!text.contains("password"));
        assert!(!text.contains("out of bounds"));
    }
    test.service.disconnect().await;
}

#[tokio::test]
async fn every_outcome_is_counted() {
    let test = TestService::new(routes());
    let base = test.start().await;
    let client = reqwest::Client::new();

    for path in ["/missing", "/panics", "/_/ok"] {
        client
            .get(format!("{base}{path}"))
            .send()
            .await
            .expect("Failed to send request");
    }

    let exposition = client
        .get(format!("{base}/metrics"))
        .send()
        .await
        .expect("Failed to send request")
        .text()
        .await
        .expect("text body");

    for status in ["404", "500", "200"] {
        assert!(
            exposition.lines().any(|line| line
                .starts_with("service_host_requests_total")
                && line.contains(&format!("status=\"{status}\""))),
            "no request counted with status {status}"
        );
    }
    assert!(exposition.contains("service_host_open_connections"));
    test.service.disconnect().await;
}
