use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MqmError {
    #[error("{context}: {}", path.display())]
    NotFound {
        context: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{context}; status code {status} and reason {reason} [{description}]")]
    Request {
        context: String,
        status: u16,
        reason: String,
        description: String,
    },

    #[error("{context}: {detail}")]
    InvalidResponse { context: String, detail: String },

    /// Connection failure or a local read error while sending a request
    #[error("{context}: {source}")]
    Transport {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl MqmError {
    pub(crate) fn transport(
        context: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Transport {
            context: context.into(),
            source: source.into(),
        }
    }

    pub(crate) fn invalid_response(context: impl Into<String>, detail: impl ToString) -> Self {
        Self::InvalidResponse {
            context: context.into(),
            detail: detail.to_string(),
        }
    }

    /// HTTP status carried by a non-success response, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Request { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True for failures reported by the server or in its response payload.
    pub fn is_request_failure(&self) -> bool {
        matches!(self, Self::Request { .. } | Self::InvalidResponse { .. })
    }

    /// True when the request could not be sent or completed.
    pub fn is_transport_failure(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// True only for a missing local resource, never for a remote 404.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, MqmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_error_message_embeds_status() {
        let err = MqmError::Request {
            context: "Pipeline creation failed".to_string(),
            status: 409,
            reason: "Conflict".to_string(),
            description: "duplicate pipeline".to_string(),
        };

        assert_eq!(
            err.to_string(),
            "Pipeline creation failed; status code 409 and reason Conflict [duplicate pipeline]"
        );
        assert_eq!(err.status(), Some(409));
        assert!(err.is_request_failure());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_not_found_is_distinct_from_remote_404() {
        let err = MqmError::NotFound {
            context: "Cannot find test result file".to_string(),
            path: PathBuf::from("missing.xml"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };

        assert!(err.is_not_found());
        assert!(!err.is_request_failure());
        assert_eq!(err.status(), None);
        assert!(err.to_string().contains("missing.xml"));
    }

    #[test]
    fn test_transport_accepts_io_source() {
        let err = MqmError::transport(
            "Cannot post test results to MQM",
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );

        assert!(err.is_transport_failure());
        assert!(!err.is_request_failure());
        assert!(!err.is_not_found());
        assert!(err.to_string().starts_with("Cannot post test results to MQM: "));
    }
}
