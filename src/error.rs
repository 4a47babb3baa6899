//! Error taxonomy for the pieces of the pipeline that callers branch on.
//!
//! Everything else propagates as [`anyhow::Error`].

use thiserror::Error;

/// Failure talking to the messaging source.
///
/// Always non-fatal inside the pipeline: it ends the smallest enclosing
/// unit (one address lookup, one handle's pagination loop) and the
/// surrounding loop continues. A lookup miss is not an error; it is
/// reported as `Ok(None)`.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("source returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed source payload: {0}")]
    Decode(String),
}

impl SourceError {
    /// Whether a retry could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SourceError::Transport(_) => true,
            SourceError::Status { status, .. } => *status == 429 || *status >= 500,
            SourceError::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            SourceError::Decode(e.to_string())
        } else {
            SourceError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(e: serde_json::Error) -> Self {
        SourceError::Decode(e.to_string())
    }
}

/// Failure resolving a free-text query to a single contact.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("no contact has an email or phone exactly matching '{0}'")]
    NotFound(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses() {
        let rate_limited = SourceError::Status {
            status: 429,
            body: String::new(),
        };
        let server = SourceError::Status {
            status: 503,
            body: String::new(),
        };
        let client = SourceError::Status {
            status: 401,
            body: "bad password".into(),
        };
        assert!(rate_limited.is_retryable());
        assert!(server.is_retryable());
        assert!(!client.is_retryable());
        assert!(SourceError::Transport("reset".into()).is_retryable());
        assert!(!SourceError::Decode("eof".into()).is_retryable());
    }
}
