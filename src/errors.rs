use thiserror::Error;
use validator::ValidationErrors;

/// Errors raised by the cart persistence layer.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Unified error type for every checkout-core service.
///
/// Field-scoped form errors travel as `Validation` so callers can re-prompt
/// the same stage; `Unauthorized` is the only variant that forces a
/// navigation redirect (to login).
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Payment failed: {0}")]
    PaymentFailed(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Event error: {0}")]
    EventError(String),
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        ServiceError::ExternalServiceError(err.to_string())
    }
}

impl ServiceError {
    /// Whether the caller may retry the same stage without losing context.
    ///
    /// Matches the propagation policy: transport and gateway problems are
    /// recoverable in place, authentication failures are not.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ServiceError::Validation(_)
                | ServiceError::InvalidInput(_)
                | ServiceError::PaymentFailed(_)
                | ServiceError::ExternalServiceError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_recoverable() {
        let err = ServiceError::Validation(ValidationErrors::new());
        assert!(err.is_recoverable());
    }

    #[test]
    fn unauthorized_is_not_recoverable() {
        let err = ServiceError::Unauthorized("no active session".to_string());
        assert!(!err.is_recoverable());
    }

    #[test]
    fn storage_error_converts() {
        let err: ServiceError = StorageError::Backend("corrupt".to_string()).into();
        assert!(matches!(err, ServiceError::Storage(_)));
    }

    #[test]
    fn display_includes_context() {
        let err = ServiceError::NotFound("booking 42".to_string());
        assert_eq!(err.to_string(), "Not found: booking 42");
    }
}
