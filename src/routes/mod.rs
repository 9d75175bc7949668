// Route exports
pub mod swipes;

pub use swipes::AppState;

use crate::core::SwipeError;
use crate::models::ErrorResponse;
use actix_web::http::StatusCode;
use actix_web::{error, web, HttpRequest, HttpResponse};

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/api/v1").configure(swipes::configure));
}

impl error::ResponseError for SwipeError {
    fn status_code(&self) -> StatusCode {
        match self {
            SwipeError::NotFound(_) => StatusCode::NOT_FOUND,
            SwipeError::AlreadyDecided { .. } | SwipeError::NothingToRewind => StatusCode::CONFLICT,
            SwipeError::EntitlementDenied { .. } => StatusCode::PAYMENT_REQUIRED,
            SwipeError::InvalidAction(_) => StatusCode::BAD_REQUEST,
            SwipeError::Profiles(_) | SwipeError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if self.is_fatal() {
            tracing::error!("Request failed: {}", self);
        }

        let mut body = ErrorResponse::new(self.code(), self.to_string(), status.as_u16());
        if let SwipeError::EntitlementDenied { reason, balance, .. } = self {
            body.reason = Some(reason.as_str().to_string());
            body.balance = *balance;
        }
        HttpResponse::build(status).json(body)
    }
}

/// JSON error for rejected payloads
#[derive(Debug)]
pub struct PayloadError(ErrorResponse);

impl std::fmt::Display for PayloadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.0.error, self.0.message)
    }
}

impl std::error::Error for PayloadError {}

impl error::ResponseError for PayloadError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.0.status_code).unwrap_or(StatusCode::BAD_REQUEST)
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(&self.0)
    }
}

/// Handle JSON payload errors
pub fn handle_json_payload_error(
    err: error::JsonPayloadError,
    req: &HttpRequest,
) -> actix_web::Error {
    tracing::info!("JSON payload error on {}: {}", req.path(), err);
    PayloadError(ErrorResponse::new("invalidJson", format!("Invalid JSON: {}", err), 400)).into()
}

/// Handle path parameter errors
pub fn handle_path_error(err: error::PathError, req: &HttpRequest) -> actix_web::Error {
    tracing::info!("Path error on {}: {}", req.path(), err);
    PayloadError(ErrorResponse::new("invalidPath", format!("Invalid path: {}", err), 400)).into()
}
