use std::path::PathBuf;

use thiserror::Error;

/// Failures raised by a [`crate::store::BundleStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{} does not exist", .0.display())]
    NotFound(PathBuf),
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound(path)
        } else {
            StoreError::Io { path, source }
        }
    }
}

/// Transport-level class of an [`UpdatesError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    InvalidRequest,
    NotFound,
    Internal,
}

#[derive(Debug, Error)]
pub enum UpdatesError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("malformed document {}: {source}", path.display())]
    MalformedDocument {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("signing failed: {0}")]
    Signing(String),
    #[error("failed to encode response: {0}")]
    Encode(#[source] serde_json::Error),
}

impl UpdatesError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        UpdatesError::InvalidRequest(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        UpdatesError::NotFound(msg.into())
    }

    /// I/O and document failures surface as not-found; most of them come
    /// from bundle content that is missing or half-published.
    pub fn class(&self) -> ErrorClass {
        match self {
            UpdatesError::InvalidRequest(_) => ErrorClass::InvalidRequest,
            UpdatesError::NotFound(_)
            | UpdatesError::MalformedDocument { .. }
            | UpdatesError::Store(_) => ErrorClass::NotFound,
            UpdatesError::Signing(_) | UpdatesError::Encode(_) => ErrorClass::Internal,
        }
    }
}

pub type Result<T, E = UpdatesError> = std::result::Result<T, E>;
