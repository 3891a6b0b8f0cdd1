//! Error types for the peer sidecar.

use thiserror::Error;

/// Result type for sidecar operations
pub type Result<T> = std::result::Result<T, PeerdError>;

/// Sidecar error types
#[derive(Error, Debug)]
pub enum PeerdError {
    /// Invalid configuration, fatal at startup
    #[error("Configuration error: {0}")]
    Config(String),

    /// Control plane unreachable, timed out or refused our credentials
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// Unexpected response from the control plane or the storage daemon
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Hosts file could not be read or written
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Hosts file content could not be parsed
    #[error("Decode error at line {line}: {reason}")]
    Decode { line: usize, reason: String },

    /// Record set cannot be written in hosts file syntax
    #[error("Encode error: {0}")]
    Encode(String),

    /// Instance address could not be turned into a host record
    #[error("Cannot resolve instance {name}: {reason}")]
    Resolve { name: String, reason: String },

    /// External process failed to start or exited unsuccessfully
    #[error("Subprocess error: {0}")]
    Subprocess(String),
}

impl PeerdError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a connectivity error
    pub fn connectivity(msg: impl Into<String>) -> Self {
        Self::Connectivity(msg.into())
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a decode error for a 1-based line number
    pub fn decode(line: usize, reason: impl Into<String>) -> Self {
        Self::Decode {
            line,
            reason: reason.into(),
        }
    }

    /// Create an encode error
    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    /// Create a resolution error for an instance
    pub fn resolve(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Resolve {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a subprocess error
    pub fn subprocess(msg: impl Into<String>) -> Self {
        Self::Subprocess(msg.into())
    }

    /// Whether the next tick may succeed without operator intervention.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connectivity(_) | Self::Io(_))
    }
}

impl From<kube::Error> for PeerdError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(resp) if resp.code == 401 || resp.code == 403 => {
                Self::Connectivity(format!("control plane rejected credentials: {}", resp.message))
            }
            kube::Error::Api(resp) => {
                Self::Protocol(format!("control plane returned {}: {}", resp.code, resp.message))
            }
            kube::Error::SerdeError(e) => {
                Self::Protocol(format!("malformed control plane response: {}", e))
            }
            other => Self::Connectivity(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: u16) -> kube::Error {
        kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: "nope".to_string(),
            reason: "Forbidden".to_string(),
            code,
        })
    }

    #[test]
    fn test_auth_failures_are_connectivity_errors() {
        assert!(matches!(PeerdError::from(api_error(401)), PeerdError::Connectivity(_)));
        assert!(matches!(PeerdError::from(api_error(403)), PeerdError::Connectivity(_)));
    }

    #[test]
    fn test_other_api_failures_are_protocol_errors() {
        assert!(matches!(PeerdError::from(api_error(500)), PeerdError::Protocol(_)));
    }

    #[test]
    fn test_decode_error_display() {
        let err = PeerdError::decode(3, "invalid address");
        assert_eq!(err.to_string(), "Decode error at line 3: invalid address");
    }
}
