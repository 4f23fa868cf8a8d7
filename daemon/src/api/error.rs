//! JSON API errors

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value};
use std::fmt::Display;
use tracing::{debug, error};

/// An error response rendered as `{"message": ..., "status"?: ...}`
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    /// Machine readable tag, e.g. `name-exists`
    pub status_tag: Option<&'static str>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            status_tag: None,
        }
    }

    /// Like `new`, logging the underlying cause
    pub fn with_cause(status: StatusCode, message: impl Into<String>, cause: impl Display) -> Self {
        let err = Self::new(status, message);
        if status.is_server_error() {
            error!("{}: {}", err.message, cause);
        } else {
            debug!("{}: {}", err.message, cause);
        }
        err
    }

    pub fn status_tag(mut self, tag: &'static str) -> Self {
        self.status_tag = Some(tag);
        self
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>, cause: impl Display) -> Self {
        Self::with_cause(StatusCode::INTERNAL_SERVER_ERROR, message, cause)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = Map::new();
        body.insert("message".to_string(), Value::String(self.message));
        if let Some(tag) = self.status_tag {
            body.insert("status".to_string(), Value::String(tag.to_string()));
        }
        (self.status, Json(Value::Object(body))).into_response()
    }
}

/// `{"message": ...}` success body
pub fn success(message: &str) -> Json<Value> {
    Json(serde_json::json!({ "message": message }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(resp: Response) -> Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_message_only() {
        let resp = ApiError::not_found("Plugin not found").into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(resp).await, serde_json::json!({"message": "Plugin not found"}));
    }

    #[tokio::test]
    async fn test_status_tag() {
        let resp = ApiError::new(StatusCode::PRECONDITION_FAILED, "exists")
            .status_tag("name-exists")
            .into_response();
        assert_eq!(resp.status(), StatusCode::PRECONDITION_FAILED);
        assert_eq!(
            body_json(resp).await,
            serde_json::json!({"message": "exists", "status": "name-exists"})
        );
    }
}
