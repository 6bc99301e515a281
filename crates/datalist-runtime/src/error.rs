#![forbid(unsafe_code)]

use std::sync::Arc;

use datalist_core::ObserverError;
use datalist_diff::DiffError;
use thiserror::Error;

/// Boxed error returned by loaders and page sources.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T, E = DataError> = std::result::Result<T, E>;

/// Misuse of a data instance.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataError {
    #[error(transparent)]
    Observer(#[from] ObserverError),

    #[error("data instance has been disposed")]
    Disposed,

    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl DataError {
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}

/// Failure surfaced to error observers. Content is never modified by a
/// failed load.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    #[error("loader failed: {0}")]
    Loader(Arc<dyn std::error::Error + Send + Sync + 'static>),

    #[error("loader panicked: {0}")]
    LoaderPanicked(String),

    #[error("diff failed: {0}")]
    Diff(#[from] DiffError),
}

impl LoadError {
    /// Wrap any loader error.
    #[must_use]
    pub fn loader(error: impl Into<BoxError>) -> Self {
        Self::Loader(Arc::from(error.into()))
    }

    /// Wrap a plain message.
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self::loader(message)
    }
}
