// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Custom extractors for improved error handling
//!
//! [`JsonBody`] replaces axum's `Json` extractor for business routes. Every
//! parse failure becomes [`RequestError::MalformedInput`], which the client
//! sees as `400 invalidJSON`; the detailed hint only goes to the server log.

use axum::{
    body::Bytes,
    extract::{FromRequest, Request},
    http::{StatusCode, header},
};
use serde::de::DeserializeOwned;

use crate::error::{ClassifiedError, RequestError};

mod error_hints {
    pub const MISSING_COMMA: &str =
        "check for missing or extra commas between object properties or array elements";
    pub const MISSING_BRACE: &str = "check for missing closing brace '}' for JSON object";
    pub const MISSING_BRACKET: &str = "check for missing closing bracket ']' for JSON array";
    pub const MISSING_QUOTES: &str =
        "check for missing or improperly escaped quotes around string values";
    pub const CONTROL_CHARS: &str = "JSON contains invalid control characters that must be escaped";
    pub const EXPECTED_VALUE: &str =
        "expected a valid JSON value (string, number, boolean, null, object, or array)";
    pub const DEFAULT_SYNTAX: &str = "check JSON formatting and structure";
    pub const EMPTY_BODY: &str = "request body is empty, expected valid JSON";
    pub const TRUNCATED_JSON: &str =
        "unexpected end of JSON input, request appears to be truncated";
}

/// Largest JSON body accepted
pub const MAX_JSON_PAYLOAD_SIZE: usize = 1024 * 1024;

/// Code sent for bodies over [`MAX_JSON_PAYLOAD_SIZE`]
pub const PAYLOAD_TOO_LARGE: &str = "payloadTooLarge";

/// JSON request body
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = RequestError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(content_type) = req.headers().get(header::CONTENT_TYPE)
            && let Ok(content_type_str) = content_type.to_str()
            && !content_type_str.starts_with("application/json")
        {
            return Err(malformed(format!(
                "invalid content-type: expected 'application/json', got '{content_type_str}'"
            )));
        }

        let bytes = Bytes::from_request(req, state).await.map_err(|rejection| {
            if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                too_large()
            } else {
                malformed(format!("failed to read request body: {rejection}"))
            }
        })?;

        if bytes.len() > MAX_JSON_PAYLOAD_SIZE {
            return Err(too_large());
        }

        if bytes.is_empty() {
            return Err(malformed(error_hints::EMPTY_BODY.to_string()));
        }

        serde_json::from_slice::<T>(&bytes)
            .map(JsonBody)
            .map_err(|err| malformed(describe_json_error(&err)))
    }
}

fn malformed(message: String) -> RequestError {
    RequestError::MalformedInput { message }
}

fn too_large() -> RequestError {
    ClassifiedError::new(StatusCode::PAYLOAD_TOO_LARGE, PAYLOAD_TOO_LARGE)
        .with_client_details(serde_json::json!({ "maxBytes": MAX_JSON_PAYLOAD_SIZE }))
        .into()
}

fn describe_json_error(err: &serde_json::Error) -> String {
    if err.is_syntax() {
        format!(
            "invalid JSON syntax at line {}, column {}: {}",
            err.line(),
            err.column(),
            get_json_syntax_hint(err)
        )
    } else if err.is_data() {
        format!(
            "JSON data validation failed: {}",
            get_data_validation_hint(err)
        )
    } else if err.is_eof() {
        error_hints::TRUNCATED_JSON.to_string()
    } else {
        format!("JSON parsing error: {err}")
    }
}

/// Provides helpful hints for JSON syntax errors
fn get_json_syntax_hint(err: &serde_json::Error) -> &'static str {
    let err_msg = err.to_string();

    if err_msg.contains("expected ','") || err_msg.contains("trailing comma") {
        error_hints::MISSING_COMMA
    } else if err_msg.contains("expected '}'") {
        error_hints::MISSING_BRACE
    } else if err_msg.contains("expected ']'") {
        error_hints::MISSING_BRACKET
    } else if err_msg.contains("expected '\"'") {
        error_hints::MISSING_QUOTES
    } else if err_msg.contains("control character") {
        error_hints::CONTROL_CHARS
    } else if err_msg.contains("expected value") {
        error_hints::EXPECTED_VALUE
    } else {
        error_hints::DEFAULT_SYNTAX
    }
}

/// Provides helpful hints for data validation errors
fn get_data_validation_hint(err: &serde_json::Error) -> String {
    let err_msg = err.to_string();

    if err_msg.contains("invalid type") {
        if err_msg.contains("expected string") {
            "expected a string value, but received a different data type".to_string()
        } else if expects_number(&err_msg) {
            "expected a numeric value, but received a different data type".to_string()
        } else if err_msg.contains("expected a boolean") {
            "expected a boolean value (true or false), but received a different data type"
                .to_string()
        } else {
            format!("data type mismatch: {err_msg}")
        }
    } else if err_msg.contains("missing field") {
        format!("required field is missing: {err_msg}")
    } else if err_msg.contains("unknown field") {
        format!("unrecognized field found: {err_msg}")
    } else {
        err_msg
    }
}

/// Whether a serde type error names a numeric target such as `u32` or `f64`
fn expects_number(err_msg: &str) -> bool {
    err_msg.contains("expected integer")
        || err_msg.contains("expected number")
        || ["u8", "u16", "u32", "u64", "i8", "i16", "i32", "i64", "f32", "f64"]
            .iter()
            .any(|ty| err_msg.contains(&format!("expected {ty}")))
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{HeaderValue, Method},
    };
    use serde::Deserialize;

    use super::*;
    use crate::classifier::classify;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Signup {
        name: String,
        age: u32,
    }

    fn create_request(body: impl Into<Body>) -> Request {
        let mut req = Request::builder()
            .method(Method::POST)
            .uri("/signup")
            .body(body.into())
            .unwrap();

        req.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        req
    }

    async fn rejection_message(req: Request) -> String {
        match JsonBody::<Signup>::from_request(req, &()).await {
            Err(RequestError::MalformedInput { message }) => message,
            other => panic!("expected MalformedInput, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn valid_json_parsing() {
        let req = create_request(r#"{"name": "Alice", "age": 30}"#);
        let JsonBody(data) = JsonBody::<Signup>::from_request(req, &())
            .await
            .unwrap();

        assert_eq!(
            data,
            Signup {
                name: "Alice".to_string(),
                age: 30
            }
        );
    }

    #[tokio::test]
    async fn empty_body_error() {
        let message = rejection_message(create_request("")).await;
        assert!(message.contains("request body is empty"));
    }

    #[tokio::test]
    async fn truncated_json() {
        let message = rejection_message(create_request(r#"{"name": "Alice", "age": 30"#)).await;
        assert!(
            message.contains("unexpected end of JSON input")
                || message.contains("invalid JSON syntax")
        );
    }

    #[tokio::test]
    async fn syntax_error_with_comma() {
        let message = rejection_message(create_request(r#"{"name": "Alice",, "age": 30}"#)).await;
        assert!(message.contains("invalid JSON syntax at line 1"));
    }

    #[tokio::test]
    async fn data_type_mismatch() {
        let message =
            rejection_message(create_request(r#"{"name": "Alice", "age": "thirty"}"#)).await;
        assert!(message.contains("expected a numeric value"));
    }

    #[tokio::test]
    async fn missing_field() {
        let message = rejection_message(create_request(r#"{"name": "Alice"}"#)).await;
        assert!(message.contains("required field is missing"));
    }

    #[tokio::test]
    async fn wrong_content_type() {
        let mut req = create_request(r#"{"name": "Alice", "age": 30}"#);
        req.headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));

        let message = rejection_message(req).await;
        assert!(message.contains("invalid content-type"));
    }

    #[tokio::test]
    async fn parse_failures_classify_as_invalid_json() {
        let error = JsonBody::<Signup>::from_request(create_request("{"), &())
            .await
            .unwrap_err();

        let response = classify(error);
        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(response.body.error_code, "invalidJSON");
        assert_eq!(response.body.client_details, None);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let body = format!(
            r#"{{"name": "{}", "age": 1}}"#,
            "a".repeat(MAX_JSON_PAYLOAD_SIZE)
        );
        let error = JsonBody::<Signup>::from_request(create_request(body), &())
            .await
            .unwrap_err();

        let response = classify(error);
        assert_eq!(response.status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(response.body.error_code, PAYLOAD_TOO_LARGE);
    }
}
