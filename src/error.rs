//! Error types for the REGON MCP server

use serde_json::{Map, Value};
use thiserror::Error;

/// Result type alias for server operations
pub type Result<T> = std::result::Result<T, ServerError>;

/// Structured detail attached to an error
pub type ErrorDetails = Map<String, Value>;

/// Machine-readable error tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Validation,
    Api,
    Network,
    Configuration,
    Execution,
}

impl ErrorCode {
    /// Every tag, in declaration order
    pub const ALL: [ErrorCode; 5] = [
        ErrorCode::Validation,
        ErrorCode::Api,
        ErrorCode::Network,
        ErrorCode::Configuration,
        ErrorCode::Execution,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Validation => "VALIDATION_ERROR",
            ErrorCode::Api => "API_ERROR",
            ErrorCode::Network => "NETWORK_ERROR",
            ErrorCode::Configuration => "CONFIGURATION_ERROR",
            ErrorCode::Execution => "EXECUTION_ERROR",
        }
    }

    /// HTTP status used by the REST adapter
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorCode::Validation => 400,
            ErrorCode::Api => 502,
            ErrorCode::Network => 503,
            ErrorCode::Configuration | ErrorCode::Execution => 500,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ErrorCode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ErrorCode::ALL
            .into_iter()
            .find(|code| code.as_str() == s)
            .ok_or_else(|| format!("Unknown error code: {}", s))
    }
}

/// Main error type for the server.
///
/// Variants are the error tags; every variant carries the same payload so
/// formatting and dispatch can treat them uniformly.
#[derive(Error, Debug, Clone)]
pub enum ServerError {
    /// Caller input failed a contract the caller could have checked
    #[error("{message}")]
    Validation { message: String, details: ErrorDetails },

    /// The registry rejected or could not service a well-formed request
    #[error("{message}")]
    Api { message: String, details: ErrorDetails },

    /// Transport failure talking to the registry
    #[error("{message}")]
    Network { message: String, details: ErrorDetails },

    /// The server's own setup (credentials, config files) is invalid
    #[error("{message}")]
    Configuration { message: String, details: ErrorDetails },

    /// Anything not otherwise classified
    #[error("{message}")]
    Execution { message: String, details: ErrorDetails },
}

impl ServerError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        let message = message.into();
        let details = ErrorDetails::new();
        match code {
            ErrorCode::Validation => ServerError::Validation { message, details },
            ErrorCode::Api => ServerError::Api { message, details },
            ErrorCode::Network => ServerError::Network { message, details },
            ErrorCode::Configuration => ServerError::Configuration { message, details },
            ErrorCode::Execution => ServerError::Execution { message, details },
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Validation, message)
    }

    pub fn api(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Api, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Network, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Configuration, message)
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Execution, message)
    }

    /// Attach a structured detail
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details_mut().insert(key.into(), value.into());
        self
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ServerError::Validation { .. } => ErrorCode::Validation,
            ServerError::Api { .. } => ErrorCode::Api,
            ServerError::Network { .. } => ErrorCode::Network,
            ServerError::Configuration { .. } => ErrorCode::Configuration,
            ServerError::Execution { .. } => ErrorCode::Execution,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ServerError::Validation { message, .. }
            | ServerError::Api { message, .. }
            | ServerError::Network { message, .. }
            | ServerError::Configuration { message, .. }
            | ServerError::Execution { message, .. } => message,
        }
    }

    pub fn details(&self) -> &ErrorDetails {
        match self {
            ServerError::Validation { details, .. }
            | ServerError::Api { details, .. }
            | ServerError::Network { details, .. }
            | ServerError::Configuration { details, .. }
            | ServerError::Execution { details, .. } => details,
        }
    }

    fn details_mut(&mut self) -> &mut ErrorDetails {
        match self {
            ServerError::Validation { details, .. }
            | ServerError::Api { details, .. }
            | ServerError::Network { details, .. }
            | ServerError::Configuration { details, .. }
            | ServerError::Execution { details, .. } => details,
        }
    }

    /// Check if error is worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServerError::Api { .. } | ServerError::Network { .. })
    }

    /// Get error code for the JSON-RPC protocol
    pub fn jsonrpc_code(&self) -> i64 {
        match self {
            ServerError::Validation { .. } => -32602,
            _ => -32000,
        }
    }

    /// HTTP status used by the REST adapter
    pub fn http_status(&self) -> u16 {
        self.code().http_status()
    }

    /// Message with technical detail removed, for production responses
    pub fn user_message(&self) -> String {
        match self {
            ServerError::Validation { message, .. } => message.clone(),
            ServerError::Network { message, .. }
                if message.to_lowercase().contains("timed out")
                    || message.to_lowercase().contains("timeout") =>
            {
                "Request timed out. Please try again.".to_string()
            }
            ServerError::Network { .. } => {
                "Network connection problem. Please try again later.".to_string()
            }
            ServerError::Api { .. } => {
                "Problem connecting to REGON database. Please try again later.".to_string()
            }
            ServerError::Configuration { .. } | ServerError::Execution { .. } => {
                "An unexpected error occurred. Please contact support if this persists."
                    .to_string()
            }
        }
    }
}

impl From<std::io::Error> for ServerError {
    fn from(e: std::io::Error) -> Self {
        ServerError::network(format!("IO error: {}", e))
    }
}

impl From<serde_json::Error> for ServerError {
    fn from(e: serde_json::Error) -> Self {
        ServerError::execution(format!("Serialization error: {}", e))
    }
}

impl From<reqwest::Error> for ServerError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ServerError::network(format!("Request to REGON service timed out: {}", e))
        } else if e.is_connect() || e.is_request() {
            ServerError::network(format!("Connection to REGON service failed: {}", e))
        } else {
            ServerError::api(format!("REGON service error: {}", e))
        }
    }
}
