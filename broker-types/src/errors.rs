use serde_json::Value;

/// Domain error enum shared across the broker crates.
///
/// Each variant carries the JSON-RPC error code spec.md §7 assigns to its
/// error kind; `code()` is the single place that mapping lives.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    StateViolation(String),

    #[error("{0}")]
    AuthRequired(String),

    #[error("Upstream error: {0}")]
    UpstreamError(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BrokerError {
    /// JSON-RPC 2.0 error code for this error kind.
    pub fn code(&self) -> i64 {
        match self {
            BrokerError::BadRequest(_) => -32602,
            BrokerError::MethodNotFound(_) => -32601,
            BrokerError::ParseError(_) => -32700,
            BrokerError::NotFound(_) => -1,
            BrokerError::Conflict(_) => -1,
            BrokerError::StateViolation(_) => -1,
            BrokerError::AuthRequired(_) => -1,
            BrokerError::UpstreamError(_) => -32603,
            BrokerError::Timeout(_) => -32603,
            BrokerError::Internal(_) => -32603,
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        BrokerError::NotFound(what.into())
    }

    /// Extra structured data to attach to the JSON-RPC error object, if any.
    pub fn data(&self) -> Option<Value> {
        None
    }
}

impl From<anyhow::Error> for BrokerError {
    fn from(err: anyhow::Error) -> Self {
        BrokerError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for BrokerError {
    fn from(err: serde_json::Error) -> Self {
        BrokerError::ParseError(err.to_string())
    }
}

pub type BrokerResult<T> = Result<T, BrokerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_request_maps_to_invalid_params() {
        assert_eq!(BrokerError::BadRequest("x".into()).code(), -32602);
    }

    #[test]
    fn method_not_found_maps_to_dash_32601() {
        assert_eq!(BrokerError::MethodNotFound("x".into()).code(), -32601);
    }

    #[test]
    fn internal_maps_to_dash_32603() {
        assert_eq!(BrokerError::Internal("x".into()).code(), -32603);
    }
}
