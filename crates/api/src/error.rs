use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use domain::services::{
    ApprovalError, CancellationError, NotifierError, QueryError, RejectionError, SettingsError,
    StoreError, StudentError, SubmissionError,
};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Vec<ValidationDetail>>,
}

#[derive(Debug, Serialize)]
pub struct ValidationDetail {
    pub field: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg.clone()),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg.clone()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg.clone()),
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".into(),
                )
            }
            ApiError::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable",
                msg.clone(),
            ),
        };

        let body = ErrorBody {
            error: error_code.into(),
            message,
            details: None,
        };

        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate => ApiError::Conflict("Resource already exists".into()),
            StoreError::ForeignKey => ApiError::NotFound("Referenced resource not found".into()),
            StoreError::Transient(msg) => {
                tracing::warn!(error = %msg, "Storage temporarily unavailable");
                ApiError::ServiceUnavailable("Storage temporarily unavailable".into())
            }
            StoreError::Database(msg) => ApiError::Internal(format!("Database error: {}", msg)),
        }
    }
}

impl From<SubmissionError> for ApiError {
    fn from(err: SubmissionError) -> Self {
        match err {
            SubmissionError::Validation(msg) => ApiError::Validation(msg),
            SubmissionError::Duplicate(_) => ApiError::Conflict(err.to_string()),
            SubmissionError::UnknownStudent(_) => ApiError::NotFound(err.to_string()),
            SubmissionError::Storage(e) => e.into(),
        }
    }
}

impl From<ApprovalError> for ApiError {
    fn from(err: ApprovalError) -> Self {
        match err {
            ApprovalError::Validation(msg) => ApiError::Validation(msg),
            ApprovalError::NotFound(_) => ApiError::NotFound(err.to_string()),
            ApprovalError::Storage(e) => e.into(),
        }
    }
}

impl From<RejectionError> for ApiError {
    fn from(err: RejectionError) -> Self {
        match err {
            RejectionError::Validation(msg) => ApiError::Validation(msg),
            RejectionError::NotFound(_) => ApiError::NotFound(err.to_string()),
            RejectionError::Storage(e) => e.into(),
        }
    }
}

impl From<CancellationError> for ApiError {
    fn from(err: CancellationError) -> Self {
        match err {
            CancellationError::NotPermitted => {
                ApiError::Forbidden("Request cannot be cancelled".into())
            }
            CancellationError::Storage(e) => e.into(),
        }
    }
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::NotFound(_) => ApiError::NotFound(err.to_string()),
            QueryError::NotApproved(_) => ApiError::Forbidden(err.to_string()),
            QueryError::Storage(e) => e.into(),
        }
    }
}

impl From<SettingsError> for ApiError {
    fn from(err: SettingsError) -> Self {
        match err {
            SettingsError::Validation(msg) => ApiError::Validation(msg),
            SettingsError::Storage(e) => e.into(),
        }
    }
}

impl From<StudentError> for ApiError {
    fn from(err: StudentError) -> Self {
        match err {
            StudentError::NotFound(_) => ApiError::NotFound(err.to_string()),
            StudentError::Storage(e) => e.into(),
        }
    }
}

impl From<NotifierError> for ApiError {
    fn from(err: NotifierError) -> Self {
        match err {
            NotifierError::NotConfigured(_) => {
                ApiError::ServiceUnavailable("Roster sync is not configured".into())
            }
            NotifierError::Storage(e) => e.into(),
            other => ApiError::ServiceUnavailable(other.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let details: Vec<ValidationDetail> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |e| ValidationDetail {
                    field: field.to_string(),
                    message: e.message.clone().map(|m| m.to_string()).unwrap_or_default(),
                })
            })
            .collect();

        let message = if details.len() == 1 {
            details[0].message.clone()
        } else {
            format!("{} validation errors", details.len())
        };

        ApiError::Validation(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::models::RequestType;

    #[test]
    fn test_api_error_unauthorized() {
        let error = ApiError::Unauthorized("test message".to_string());
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_api_error_validation() {
        let error = ApiError::Validation("invalid input".to_string());
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_api_error_internal() {
        let error = ApiError::Internal("database connection failed".to_string());
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_api_error_display() {
        assert_eq!(
            format!("{}", ApiError::NotFound("test".to_string())),
            "Not found: test"
        );
        assert_eq!(
            format!("{}", ApiError::Conflict("test".to_string())),
            "Conflict: test"
        );
        assert_eq!(
            format!("{}", ApiError::ServiceUnavailable("test".to_string())),
            "Service unavailable: test"
        );
    }

    #[test]
    fn test_duplicate_submission_is_conflict() {
        let error: ApiError = SubmissionError::Duplicate(RequestType::Gate).into();
        assert!(matches!(error, ApiError::Conflict(_)));
        assert_eq!(error.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_unknown_student_is_not_found() {
        let error: ApiError = SubmissionError::UnknownStudent("s1".into()).into();
        assert_eq!(error.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_missing_student_is_not_found() {
        let error: ApiError = StudentError::NotFound("s9".into()).into();
        assert_eq!(error.to_string(), "Not found: student not found: s9");
        assert_eq!(error.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_cancellation_not_permitted_is_forbidden() {
        let error: ApiError = CancellationError::NotPermitted.into();
        assert_eq!(error.into_response().status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_transient_store_error_is_unavailable() {
        let error: ApiError = ApprovalError::Storage(StoreError::Transient("reset".into())).into();
        assert_eq!(
            error.into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_document_of_pending_request_is_forbidden() {
        let error: ApiError = QueryError::NotApproved(7).into();
        assert_eq!(error.into_response().status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_settings_validation_is_bad_request() {
        let error: ApiError = SettingsError::Validation("bad delay".into()).into();
        match error {
            ApiError::Validation(msg) => assert_eq!(msg, "bad delay"),
            other => panic!("Expected Validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_validation_detail() {
        let detail = ValidationDetail {
            field: "reason".to_string(),
            message: "Reason must be 1-1000 characters".to_string(),
        };
        assert_eq!(detail.field, "reason");
    }
}
