use actix_web::http::{header, StatusCode};
use actix_web::{HttpResponse, ResponseError};
use gateway_core::{GatewayError, GatewayEvent};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub type Result<T, E = AppError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct JsonError {
    message: String,
    r#type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

#[derive(Serialize)]
struct JsonErrorWrapper {
    error: JsonError,
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Gateway(e) => {
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            AppError::SerializationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let (r#type, details) = match self {
            AppError::Gateway(e) => (e.kind().to_string(), Some(e.details())),
            AppError::SerializationError(_) => ("api_error".to_string(), None),
        };
        HttpResponse::build(self.status_code()).json(JsonErrorWrapper {
            error: JsonError {
                message: self.to_string(),
                r#type,
                details,
            },
        })
    }
}

/// Failure before streaming began: the mapped status with a single SSE
/// `error` event as the body.
pub fn sse_error_response(error: &GatewayError) -> HttpResponse {
    let status = StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::BAD_GATEWAY);
    let event = GatewayEvent::error(error.to_string(), Some(error.details()));
    HttpResponse::build(status)
        .append_header((header::CONTENT_TYPE, "text/event-stream"))
        .append_header((header::CACHE_CONTROL, "no-cache"))
        .body(event.to_sse_frame())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;

    #[actix_web::test]
    async fn invalid_request_renders_json_error() {
        let error = AppError::from(GatewayError::InvalidRequest("message is required".into()));
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);

        let body = to_bytes(error.error_response().into_body()).await.unwrap();
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"]["type"], "invalid_request");
        assert!(value["error"]["message"]
            .as_str()
            .unwrap()
            .contains("message is required"));
    }

    #[actix_web::test]
    async fn sse_error_carries_status_and_single_event() {
        let response = sse_error_response(&GatewayError::Unconfigured);
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(response.into_body()).await.unwrap();
        let text = std::str::from_utf8(&body).unwrap();
        assert_eq!(text.matches("data: ").count(), 1);
        assert!(text.contains(r#""type":"error""#));
        assert!(text.ends_with("\n\n"));
    }
}
