//! 错误响应

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use triage_core::TriageError;

/// HTTP 层错误，包装领域错误并映射为状态码
#[derive(Debug)]
pub struct ApiError(pub TriageError);

impl From<TriageError> for ApiError {
    fn from(err: TriageError) -> Self {
        Self(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self(TriageError::Internal(err.to_string()))
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            TriageError::NotFound(_) => StatusCode::NOT_FOUND,
            TriageError::NotTriaged(_)
            | TriageError::InvalidTransition { .. }
            | TriageError::AlreadyQueued(_) => StatusCode::CONFLICT,
            TriageError::Validation(_) => StatusCode::BAD_REQUEST,
            TriageError::Config(_)
            | TriageError::Internal(_)
            | TriageError::Io(_)
            | TriageError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self.0);
        }

        let body = Json(json!({
            "error": true,
            "message": self.0.to_string(),
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use triage_core::{IntakeEvent, IntakeStatus};
    use uuid::Uuid;

    #[test]
    fn test_status_mapping() {
        let id = Uuid::new_v4();
        assert_eq!(ApiError(TriageError::intake_not_found(id)).status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError(TriageError::NotTriaged(id)).status(), StatusCode::CONFLICT);
        assert_eq!(ApiError(TriageError::AlreadyQueued(id)).status(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError(TriageError::InvalidTransition {
                from: IntakeStatus::InService,
                event: IntakeEvent::Cancel,
            })
            .status(),
            StatusCode::CONFLICT
        );
        assert_eq!(ApiError(TriageError::Validation("x".into())).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::from(anyhow::anyhow!("boom")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
