//! Standardized error envelope: `{"error": {code, message, correlationId}}`.

use axum::http::{header::HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use concord_adaptation::AdaptationError;
use concord_arbiter::ArbiterError;
use concord_learning::LearningError;

pub static CORRELATION_HEADER: HeaderName = HeaderName::from_static("x-correlation-id");

/// Wire error codes and their status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ValidationError,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    Timeout,
    ServiceUnavailable,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::Timeout => "TIMEOUT",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::Internal => "INTERNAL",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::ValidationError => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::Timeout | Self::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// An API error, always carrying the request correlation id.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    pub correlation_id: String,
    pub details: Option<Value>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            correlation_id: correlation_id.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn validation(message: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message, correlation_id)
    }

    pub fn unauthorized(message: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message, correlation_id)
    }

    pub fn forbidden(correlation_id: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::Forbidden,
            "insufficient role for this operation",
            correlation_id,
        )
    }

    pub fn not_found(message: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message, correlation_id)
    }

    pub fn timeout(correlation_id: impl Into<String>) -> Self {
        Self::new(ErrorCode::Timeout, "request deadline exceeded", correlation_id)
    }

    /// Map a learning-layer error onto the wire contract.
    pub fn from_learning(error: LearningError, correlation_id: &str) -> Self {
        match &error {
            LearningError::DecisionNotFound(_) | LearningError::SuggestionNotFound { .. } => {
                Self::not_found(error.to_string(), correlation_id)
            }
            LearningError::InvalidPreferenceValue(_)
            | LearningError::IllegalStatusTransition { .. }
            | LearningError::PreferenceNotFound { .. }
            | LearningError::FeedbackAlreadyRecorded(_) => {
                Self::validation(error.to_string(), correlation_id)
            }
        }
    }

    pub fn from_arbiter(error: ArbiterError, correlation_id: &str) -> Self {
        match &error {
            ArbiterError::ProposalNotFound(_)
            | ArbiterError::ConflictNotFound(_)
            | ArbiterError::DecisionNotFound(_) => Self::not_found(error.to_string(), correlation_id),
            ArbiterError::NotAnOpenEscalation(_)
            | ArbiterError::ProposalNotEscalated { .. }
            | ArbiterError::NoProposals => Self::validation(error.to_string(), correlation_id),
        }
    }

    pub fn from_adaptation(error: AdaptationError, correlation_id: &str) -> Self {
        match &error {
            AdaptationError::Learning(inner) => {
                // Re-borrowing the inner error keeps one mapping.
                match inner {
                    LearningError::DecisionNotFound(_)
                    | LearningError::SuggestionNotFound { .. } => {
                        Self::not_found(error.to_string(), correlation_id)
                    }
                    _ => Self::validation(error.to_string(), correlation_id),
                }
            }
            AdaptationError::AttemptNotFound(_) | AdaptationError::DecisionNotFound(_) => {
                Self::not_found(error.to_string(), correlation_id)
            }
            AdaptationError::NotRollbackable(_) | AdaptationError::InvalidPreferenceKey(_) => {
                Self::validation(error.to_string(), correlation_id)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "error": {
                "code": self.code.as_str(),
                "message": self.message,
                "correlationId": self.correlation_id,
            }
        });
        if let Some(details) = self.details {
            body["error"]["details"] = details;
        }

        let mut response = (self.code.status(), Json(body)).into_response();
        if let Ok(value) = self.correlation_id.parse() {
            response
                .headers_mut()
                .insert(CORRELATION_HEADER.clone(), value);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_status_mapping() {
        assert_eq!(ErrorCode::ValidationError.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorCode::Conflict.status(), StatusCode::CONFLICT);
        assert_eq!(ErrorCode::Timeout.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_envelope_shape() {
        let error = ApiError::validation("bad field", "corr-1");
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get(&CORRELATION_HEADER).unwrap(),
            "corr-1"
        );
    }
}
