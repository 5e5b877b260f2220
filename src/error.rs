// src/error.rs
//! Error types shared by the source clients, the augmenter and the store.

use std::fmt;

use thiserror::Error;

/// Coarse classification the orchestrator uses to decide between fallback and abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Transport,
    Malformed,
    Config,
    Persistence,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::Transport => "transport",
            ErrorKind::Malformed => "malformed",
            ErrorKind::Config => "config",
            ErrorKind::Persistence => "persistence",
        })
    }
}

/// Failure raised by a source client or the AI augmenter.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Connect failure, timeout, or a body that could not be read.
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    /// Non-success HTTP status or an upstream API error code.
    #[error("{url} returned status {status}")]
    Status { url: String, status: String },

    /// Unexpected payload shape, missing field, or unparsable value.
    #[error("malformed {context}: {message}")]
    Malformed { context: String, message: String },

    /// Required setting (usually a credential) is absent.
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Persistence(#[from] StoreError),
}

impl IngestError {
    pub fn transport(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.to_string(),
        }
    }

    pub fn status(url: impl Into<String>, status: impl fmt::Display) -> Self {
        Self::Status {
            url: url.into(),
            status: status.to_string(),
        }
    }

    pub fn malformed(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Malformed {
            context: context.into(),
            message: message.to_string(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            IngestError::Transport { .. } | IngestError::Status { .. } => ErrorKind::Transport,
            IngestError::Malformed { .. } => ErrorKind::Malformed,
            IngestError::Config(_) => ErrorKind::Config,
            IngestError::Persistence(_) => ErrorKind::Persistence,
        }
    }

    /// Whether a feed that failed with this error may be served from the fallback generator.
    pub fn allows_fallback(&self) -> bool {
        self.kind() != ErrorKind::Persistence
    }
}

/// Failure inside the snapshot store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("timestamp parse error: {0}")]
    Timestamp(String),
    #[error("unsupported schema version {found}, max supported {supported}")]
    UnsupportedSchemaVersion { found: i64, supported: i64 },
    #[error("store lock poisoned")]
    Poisoned,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_errors_classify_as_transport() {
        let e = IngestError::status("https://example.test/x", 503);
        assert_eq!(e.kind(), ErrorKind::Transport);
        assert!(e.allows_fallback());
        assert_eq!(e.to_string(), "https://example.test/x returned status 503");
    }

    #[test]
    fn persistence_never_falls_back() {
        let e = IngestError::from(StoreError::Poisoned);
        assert_eq!(e.kind(), ErrorKind::Persistence);
        assert!(!e.allows_fallback());
    }
}
