pub mod auth;
pub mod media;
pub mod middleware;
pub mod rest;
pub mod state;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use thinkpath_core::TutorError;
use tracing::error;
use utoipa::ToSchema;

pub use middleware::require_auth;

/// The JSON body returned with every non-2xx response.
#[derive(Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
}

/// An HTTP error response built from a core error or a request problem.
#[derive(Debug)]
pub struct Rejection {
    status: StatusCode,
    message: String,
    retry_after_secs: Option<u64>,
}

impl Rejection {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            retry_after_secs: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<TutorError> for Rejection {
    fn from(err: TutorError) -> Self {
        let status = match &err {
            TutorError::AnalysisFailure => StatusCode::UNPROCESSABLE_ENTITY,
            TutorError::VerificationFailure => StatusCode::BAD_GATEWAY,
            TutorError::DuplicateIdentity | TutorError::SessionCompleted => StatusCode::CONFLICT,
            TutorError::InvalidCredentials | TutorError::InvalidToken => StatusCode::UNAUTHORIZED,
            TutorError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            TutorError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            TutorError::InvalidSignup | TutorError::EmptyAnswer => StatusCode::BAD_REQUEST,
            TutorError::StorageCorruption(_) | TutorError::Storage(_) | TutorError::Internal(_) => {
                error!("Request failed: {}", err);
                return Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An unexpected internal error occurred.",
                );
            }
        };
        let retry_after_secs = match err {
            TutorError::RateLimited { retry_after_secs } => Some(retry_after_secs),
            _ => None,
        };
        Self {
            status,
            message: err.to_string(),
            retry_after_secs,
        }
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let mut response = (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response();
        if let Some(secs) = self.retry_after_secs {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}
