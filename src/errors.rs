//! Engine error types
//!
//! Error codes:
//! - INVALID_PARAMETER (malformed syntax, wrong field type for an operator)
//! - NOT_ALLOWED (legal syntax, forbidden combination)
//! - BAD_REQUEST (missing companion parameter)
//! - NOT_FOUND (field or collection resolution failure)
//! - BACKEND_FAILURE (backend-reported failure, never retried)
//!
//! Every compilation error surfaces before a backend call is issued.

use std::fmt;

/// Engine error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExploreErrorCode {
    /// Malformed filter/aggregation syntax or incompatible field type
    InvalidParameter,
    /// Legal syntax but forbidden combination
    NotAllowed,
    /// Missing required companion parameter
    BadRequest,
    /// Field or collection could not be resolved
    NotFound,
    /// Failure reported by the backend
    Backend,
}

impl ExploreErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            ExploreErrorCode::InvalidParameter => "INVALID_PARAMETER",
            ExploreErrorCode::NotAllowed => "NOT_ALLOWED",
            ExploreErrorCode::BadRequest => "BAD_REQUEST",
            ExploreErrorCode::NotFound => "NOT_FOUND",
            ExploreErrorCode::Backend => "BACKEND_FAILURE",
        }
    }

    /// Returns the HTTP status the REST layer maps this code to
    pub fn status(&self) -> u16 {
        match self {
            ExploreErrorCode::InvalidParameter => 400,
            ExploreErrorCode::BadRequest => 400,
            ExploreErrorCode::NotAllowed => 403,
            ExploreErrorCode::NotFound => 404,
            ExploreErrorCode::Backend => 500,
        }
    }
}

impl fmt::Display for ExploreErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Engine error with full context
#[derive(Debug, Clone, PartialEq)]
pub struct ExploreError {
    code: ExploreErrorCode,
    message: String,
    field: Option<String>,
}

impl ExploreError {
    fn new(code: ExploreErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            field: None,
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::new(ExploreErrorCode::InvalidParameter, message)
    }

    /// Create a not allowed error
    pub fn not_allowed(message: impl Into<String>) -> Self {
        Self::new(ExploreErrorCode::NotAllowed, message)
    }

    /// Create a bad request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ExploreErrorCode::BadRequest, message)
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ExploreErrorCode::NotFound, message)
    }

    /// Create an unknown field error
    pub fn unknown_field(field: impl Into<String>, collection: &str) -> Self {
        let f = field.into();
        Self {
            code: ExploreErrorCode::NotFound,
            message: format!("Field '{}' not found in collection '{}'", f, collection),
            field: Some(f),
        }
    }

    /// Create a backend failure error
    pub fn backend(message: impl Into<String>) -> Self {
        Self::new(ExploreErrorCode::Backend, message)
    }

    /// Attach the offending field
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    /// Prefix the message with context, keeping the code unchanged
    pub fn with_context(mut self, context: impl fmt::Display) -> Self {
        self.message = format!("{}: {}", context, self.message);
        self
    }

    /// Returns the error code
    pub fn code(&self) -> ExploreErrorCode {
        self.code
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the field name if applicable
    pub fn field(&self) -> Option<&str> {
        self.field.as_deref()
    }
}

impl fmt::Display for ExploreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.code(), self.message)
    }
}

impl std::error::Error for ExploreError {}

/// Result type for engine operations
pub type ExploreResult<T> = Result<T, ExploreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_statuses() {
        assert_eq!(ExploreErrorCode::InvalidParameter.code(), "INVALID_PARAMETER");
        assert_eq!(ExploreErrorCode::NotAllowed.status(), 403);
        assert_eq!(ExploreErrorCode::BadRequest.status(), 400);
        assert_eq!(ExploreErrorCode::NotFound.status(), 404);
        assert_eq!(ExploreErrorCode::Backend.status(), 500);
    }

    #[test]
    fn test_unknown_field_carries_field() {
        let err = ExploreError::unknown_field("params.age", "flights");
        assert_eq!(err.code(), ExploreErrorCode::NotFound);
        assert_eq!(err.field(), Some("params.age"));
        assert!(err.message().contains("flights"));
    }

    #[test]
    fn test_context_keeps_code() {
        let err = ExploreError::backend("timeout").with_context("collection 'flights'");
        assert_eq!(err.code(), ExploreErrorCode::Backend);
        assert_eq!(err.to_string(), "[BACKEND_FAILURE] collection 'flights': timeout");
    }
}
