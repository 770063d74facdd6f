use palaver_core::CoreError;
use thiserror::Error;

/// Errors raised by service implementations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// The request couldn't be built
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The HTTP client couldn't be created
    #[error("HTTP client error: {0}")]
    Client(String),

    /// The request was sent but no response came back
    #[error("Connection error: {0}")]
    Connection(String),

    /// The remote service answered with an error status
    #[error("Service returned status {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, possibly truncated
        body: String,
    },

    /// The response couldn't be decoded
    #[error("Invalid response: {0}")]
    Decode(String),
}

impl From<ServiceError> for CoreError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::InvalidRequest(msg) => CoreError::ExecutionError(msg),
            ServiceError::Client(msg) => CoreError::ConfigurationError(msg),
            other => CoreError::ServiceError(other.to_string()),
        }
    }
}
