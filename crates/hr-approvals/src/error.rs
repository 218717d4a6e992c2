use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use crate::workflows::approval::{ApprovalError, DefinitionError};
use crate::workflows::offer::OfferError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Definition(DefinitionError),
    Approval(ApprovalError),
    Offer(OfferError),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Definition(err) => err.status(),
            AppError::Approval(err) => err.status(),
            AppError::Offer(err) => err.status(),
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::Definition(err) => err.code(),
            AppError::Approval(err) => err.code(),
            AppError::Offer(err) => err.code(),
            AppError::Config(_) => "CONFIGURATION",
            AppError::Telemetry(_) => "TELEMETRY",
            AppError::Io(_) | AppError::Server(_) => "INTERNAL",
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Definition(err) => write!(f, "workflow definition error: {}", err),
            AppError::Approval(err) => write!(f, "approval error: {}", err),
            AppError::Offer(err) => write!(f, "offer error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Definition(err) => Some(err),
            AppError::Approval(err) => Some(err),
            AppError::Offer(err) => Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "code": self.code(),
            "error": self.to_string(),
        }));
        (status, body).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<DefinitionError> for AppError {
    fn from(value: DefinitionError) -> Self {
        Self::Definition(value)
    }
}

impl From<ApprovalError> for AppError {
    fn from(value: ApprovalError) -> Self {
        Self::Approval(value)
    }
}

impl From<OfferError> for AppError {
    fn from(value: OfferError) -> Self {
        Self::Offer(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::approval::domain::{DepartmentId, LevelId};
    use crate::workflows::offer::OfferId;

    #[test]
    fn domain_errors_keep_their_status_and_code() {
        let err = AppError::from(DefinitionError::NoMatchingWorkflow {
            department_id: DepartmentId("5".to_string()),
            level_id: LevelId("2".to_string()),
        });
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.code(), "NO_MATCHING_WORKFLOW");

        let err = AppError::from(OfferError::NotFound(OfferId(3)));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "offer error: offer 3 not found");
    }

    #[test]
    fn infrastructure_errors_are_internal() {
        let err = AppError::from(ConfigError::InvalidPort);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(std::error::Error::source(&err).is_some());
    }
}
