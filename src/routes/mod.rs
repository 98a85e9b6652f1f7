//! HTTP route handlers
//!
//! Every response uses the same JSON envelope:
//! `{status, message?, data?, error?, code?}`.

pub mod achievements;
pub mod health;

pub use achievements::handle_api_request;
pub use health::{health_check, readiness_check};

use bytes::Bytes;
use http_body_util::Full;
use hyper::{header, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::achievement::AchievementError;
use crate::types::TrackerError;

pub type FullBody = Full<Bytes>;

/// JSON envelope shared by every endpoint
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            status: "success",
            message: Some(message.into()),
            data: Some(data),
            error: None,
            code: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn failure(error: impl Into<String>, code: &'static str) -> Self {
        Self {
            status: "error",
            message: None,
            data: None,
            error: Some(error.into()),
            code: Some(code),
        }
    }
}

pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<FullBody> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    let mut response = Response::new(Full::new(Bytes::from(json)));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    response
}

pub fn success_response<T: Serialize>(
    status: StatusCode,
    message: &str,
    data: T,
) -> Response<FullBody> {
    json_response(status, &ApiResponse::success(message, data))
}

pub fn error_response(status: StatusCode, error: &str, code: &'static str) -> Response<FullBody> {
    json_response(status, &ApiResponse::failure(error, code))
}

/// Map a lifecycle outcome onto its HTTP response
pub fn achievement_error_response(err: &AchievementError) -> Response<FullBody> {
    error_response(err.status_code(), &err.to_string(), err.code())
}

pub fn tracker_error_response(err: &TrackerError) -> Response<FullBody> {
    error_response(err.status_code(), &err.to_string(), err.code())
}

pub fn not_found_response(path: &str) -> Response<FullBody> {
    error_response(
        StatusCode::NOT_FOUND,
        &format!("No route for {}", path),
        "not_found",
    )
}

/// Decode a JSON request body. An empty body reads as `{}`.
pub fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, AchievementError> {
    let body = if body.iter().all(u8::is_ascii_whitespace) {
        b"{}".as_slice()
    } else {
        body
    };
    serde_json::from_slice(body)
        .map_err(|e| AchievementError::validation(format!("invalid request body: {}", e)))
}
