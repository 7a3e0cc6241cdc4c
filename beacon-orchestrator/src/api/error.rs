//! API Error Handling
//!
//! Unified error types and conversion for API responses. Every error body is
//! `{"error": <message>, "code": <stable code>}`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::repository::StoreError;
use crate::service::diff_service::DiffError;
use crate::service::job_service::JobError;
use crate::service::retry_service::RetryError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound { code: &'static str, message: String },
    BadRequest { code: &'static str, message: String },
    Conflict { code: &'static str, message: String },
    /// Retry budget spent
    TooManyRequests { code: &'static str, message: String },
    DatabaseError(StoreError),
    InternalError(String),
}

impl ApiError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            code,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::NotFound { code, message } => (StatusCode::NOT_FOUND, code, message),
            ApiError::BadRequest { code, message } => (StatusCode::BAD_REQUEST, code, message),
            ApiError::Conflict { code, message } => (StatusCode::CONFLICT, code, message),
            ApiError::TooManyRequests { code, message } => {
                (StatusCode::TOO_MANY_REQUESTS, code, message)
            }
            ApiError::DatabaseError(err) => {
                tracing::error!("Database error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "StoreError",
                    "Internal server error".to_string(),
                )
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "InternalError", msg)
            }
        };

        (
            status,
            Json(serde_json::json!({ "error": message, "code": code })),
        )
            .into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::DatabaseError(err)
    }
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        let message = err.to_string();
        match err {
            JobError::Validation(validation) => ApiError::BadRequest {
                code: validation.code(),
                message,
            },
            JobError::NotFound(_) => ApiError::NotFound {
                code: "NotFound",
                message,
            },
            JobError::Conflict(_) => ApiError::Conflict {
                code: "JobConflict",
                message,
            },
            JobError::Cancelled(_) => ApiError::Conflict {
                code: "JobCancelled",
                message,
            },
            JobError::InvariantViolation(_) => ApiError::InternalError(message),
            JobError::Store(store) => ApiError::DatabaseError(store),
        }
    }
}

impl From<RetryError> for ApiError {
    fn from(err: RetryError) -> Self {
        let message = err.to_string();
        match err {
            RetryError::NotFound(_) | RetryError::JobNotFound(_) => ApiError::NotFound {
                code: "NotFound",
                message,
            },
            RetryError::InvalidState { .. } => ApiError::Conflict {
                code: "InvalidState",
                message,
            },
            RetryError::JobCancelled(_) => ApiError::Conflict {
                code: "JobCancelled",
                message,
            },
            RetryError::RetriesExhausted { .. } => ApiError::TooManyRequests {
                code: "RetriesExhausted",
                message,
            },
            RetryError::InvalidQuestionIndex { .. } => ApiError::BadRequest {
                code: "InvalidQuestionIndex",
                message,
            },
            RetryError::UnknownRegion(_) => ApiError::BadRequest {
                code: "UnknownRegion",
                message,
            },
            RetryError::Store(store) => ApiError::DatabaseError(store),
        }
    }
}

impl From<DiffError> for ApiError {
    fn from(err: DiffError) -> Self {
        match err {
            DiffError::NoExecutionData(_) => ApiError::NotFound {
                code: "NoExecutionData",
                message: err.to_string(),
            },
            DiffError::Store(store) => ApiError::DatabaseError(store),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use beacon_core::ValidationError;
    use uuid::Uuid;

    use super::*;

    fn status_of(err: impl Into<ApiError>) -> StatusCode {
        let err: ApiError = err.into();
        err.into_response().status()
    }

    #[test]
    fn test_retry_error_statuses() {
        let id = Uuid::new_v4();
        assert_eq!(
            status_of(RetryError::InvalidQuestionIndex { index: -1, len: 2 }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(RetryError::RetriesExhausted {
                execution_id: id,
                retry_count: 3,
                max_retries: 3,
            }),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            status_of(RetryError::InvalidState {
                execution_id: id,
                status: beacon_core::domain::execution::ExecutionStatus::Running,
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(RetryError::UnknownRegion("mars".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(RetryError::NotFound(id.to_string())),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_validation_code_passes_through() {
        let err = ApiError::from(JobError::Validation(ValidationError::EmptyQuestionSet));
        match err {
            ApiError::BadRequest { code, .. } => assert_eq!(code, "EmptyQuestionSet"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_store_errors_hide_details() {
        let err = ApiError::from(StoreError::Unavailable("pool closed".to_string()));
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
