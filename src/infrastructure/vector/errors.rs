use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

use crate::domain::errors::KnowledgeError;

/// Errors that can occur on a single round trip to the vector index.
///
/// These never leave the client: after the retry policy has run they are
/// normalized into a [`KnowledgeError`].
#[derive(Error, Debug)]
pub enum IndexRequestError {
    /// Connection refused, reset or otherwise failed before a response
    #[error("Connection error: {0}")]
    Connect(String),

    /// Request exceeded its deadline
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// Server answered with a non-success status
    #[error("HTTP {status}: {body}")]
    Status { status: StatusCode, body: String },

    /// Response body could not be decoded
    #[error("Invalid response: {0}")]
    Decode(String),

    /// Request could not be constructed
    #[error("Invalid request: {0}")]
    Request(String),
}

impl IndexRequestError {
    pub fn status(status: StatusCode, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: body.into(),
        }
    }

    /// Returns true if this error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connect(_) | Self::Timeout(_) => true,
            Self::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            Self::Decode(_) | Self::Request(_) => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status, .. } if *status == StatusCode::NOT_FOUND)
    }

    /// Returns true if the server rejected a request parameter it does not know.
    ///
    /// Older servers answer the `points/query` route with 404, or reject an
    /// unrecognized body field with 400/422.
    pub fn is_unknown_parameter(&self) -> bool {
        let Self::Status { status, body } = self else {
            return false;
        };

        let body = body.to_lowercase();
        if *status == StatusCode::NOT_FOUND {
            // a missing collection is a real 404, not a missing route
            return !body.contains("collection");
        }
        if *status != StatusCode::BAD_REQUEST && *status != StatusCode::UNPROCESSABLE_ENTITY {
            return false;
        }

        ["unknown field", "unknown parameter", "unknown variant", "unrecognized field"]
            .iter()
            .any(|marker| body.contains(marker))
    }

    /// Normalize into the domain taxonomy once retries are spent.
    pub fn into_knowledge_error(self, operation: &str, timeout: Duration) -> KnowledgeError {
        if self.is_timeout() {
            return KnowledgeError::timeout(operation, timeout);
        }
        if self.is_transient() {
            return KnowledgeError::IndexUnavailable(format!("{operation}: {self}"));
        }
        KnowledgeError::IndexRejected(format!("{operation}: {self}"))
    }
}

impl From<reqwest::Error> for IndexRequestError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else if err.is_builder() {
            Self::Request(err.to_string())
        } else if let Some(status) = err.status() {
            Self::status(status, err.to_string())
        } else {
            Self::Connect(err.to_string())
        }
    }
}

impl From<serde_json::Error> for IndexRequestError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}
