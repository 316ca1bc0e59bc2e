use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::pipeline::error::PipelineError;
use crate::store::StoreError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unprocessable entity: {0}")]
    UnprocessableEntity(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Database(e) => AppError::Database(e),
            StoreError::NotFound { entity, id } => {
                AppError::NotFound(format!("{entity} {id} not found"))
            }
            StoreError::PlacementConflict { .. } => AppError::Conflict(e.to_string()),
            other => AppError::Store(other),
        }
    }
}

impl From<PipelineError> for AppError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::CompanyNotFound(_) => AppError::NotFound(e.to_string()),
            PipelineError::RoundOutOfRange { .. } => AppError::NotFound(e.to_string()),
            PipelineError::NoStudentsSelected { .. } => AppError::UnprocessableEntity(e.to_string()),
            PipelineError::NotEligible { .. } => AppError::UnprocessableEntity(e.to_string()),
            PipelineError::RoundClosed { .. } => AppError::Conflict(e.to_string()),
            PipelineError::PlacementConflict { .. } => AppError::Conflict(e.to_string()),
            PipelineError::Store { source, .. } => AppError::from(source),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::UnprocessableEntity(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "UNPROCESSABLE_ENTITY",
                msg.clone(),
            ),
            AppError::Conflict(msg) => {
                tracing::warn!("Conflict: {msg}");
                (StatusCode::CONFLICT, "CONFLICT", msg.clone())
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                )
            }
            AppError::Store(e) => {
                tracing::error!("Store error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "STORE_ERROR",
                    "A storage error occurred".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::company::RoundStatus;
    use uuid::Uuid;

    fn status_of(e: PipelineError) -> StatusCode {
        AppError::from(e).into_response().status()
    }

    #[test]
    fn test_pipeline_errors_map_to_statuses() {
        let company_id = Uuid::new_v4();
        assert_eq!(
            status_of(PipelineError::CompanyNotFound(company_id)),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(PipelineError::NoStudentsSelected {
                company_id,
                round_index: 2
            }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(PipelineError::RoundClosed {
                company_id,
                round_index: 0,
                status: RoundStatus::Completed
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(PipelineError::store(
                company_id,
                StoreError::PlacementConflict {
                    college: "X".into(),
                    identity: "a@x.com".into()
                }
            )),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_store_not_found_is_404() {
        let e = StoreError::NotFound {
            entity: "roster record",
            id: "abc".into(),
        };
        assert_eq!(
            AppError::from(e).into_response().status(),
            StatusCode::NOT_FOUND
        );
    }
}
