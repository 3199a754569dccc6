//! HTTP response building helpers
//!
//! Keeps status codes and error bodies consistent across handlers.

use bytes::Bytes;
use http_body_util::Full;
use hyper::http::response::Builder;
use hyper::{header, Response, StatusCode};
use serde::Serialize;

use crate::error::BoardError;

/// Result type alias for handlers
pub type HandlerResult = Result<Response<Full<Bytes>>, BoardError>;

fn build(builder: Builder, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    builder.body(Full::new(body.into())).unwrap_or_else(|_| {
        let mut fallback = Response::new(Full::new(Bytes::new()));
        *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        fallback
    })
}

/// Build a JSON response with the given status code
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Full<Bytes>> {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    build(
        Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, "application/json"),
        json,
    )
}

/// Build a JSON response with 200 OK status
pub fn ok<T: Serialize>(body: &T) -> Response<Full<Bytes>> {
    json_response(StatusCode::OK, body)
}

/// Build a JSON response with 201 Created status
pub fn created<T: Serialize>(body: &T) -> Response<Full<Bytes>> {
    json_response(StatusCode::CREATED, body)
}

/// Build a 404 Not Found response with message
pub fn not_found(message: &str) -> Response<Full<Bytes>> {
    json_response(StatusCode::NOT_FOUND, &serde_json::json!({ "error": message }))
}

/// Build a 405 Method Not Allowed response
pub fn method_not_allowed() -> Response<Full<Bytes>> {
    json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        &serde_json::json!({ "error": "Method not allowed" }),
    )
}

/// 303 redirect, as the browser form routes expect
pub fn see_other(location: &str) -> Response<Full<Bytes>> {
    build(
        Response::builder()
            .status(StatusCode::SEE_OTHER)
            .header(header::LOCATION, location),
        Bytes::new(),
    )
}

/// Downloadable attachment
pub fn attachment(content_type: &str, filename: &str, body: Vec<u8>) -> Response<Full<Bytes>> {
    build(
        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, content_type)
            .header(
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        body,
    )
}

/// Map a BoardError to its HTTP status
pub fn status_for(error: &BoardError) -> StatusCode {
    match error {
        BoardError::Validation(_) => StatusCode::BAD_REQUEST,
        BoardError::NotFound(_) => StatusCode::NOT_FOUND,
        BoardError::Forbidden(_) => StatusCode::FORBIDDEN,
        BoardError::Json(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Convert a BoardError to an appropriate HTTP response
pub fn error_response(error: BoardError) -> Response<Full<Bytes>> {
    let message = match &error {
        BoardError::Validation(msg) | BoardError::NotFound(msg) | BoardError::Forbidden(msg) => {
            msg.clone()
        }
        _ => error.to_string(),
    };
    json_response(status_for(&error), &serde_json::json!({ "error": message }))
}

/// Wrap a service result into an HTTP response
pub fn from_result<T: Serialize>(result: Result<T, BoardError>) -> Response<Full<Bytes>> {
    match result {
        Ok(value) => ok(&value),
        Err(e) => error_response(e),
    }
}
