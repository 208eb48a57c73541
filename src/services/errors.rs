//! Error taxonomy for chunked transfers.

use std::io;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum TransferError {
    /// Bad arguments or an unusable parent object.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The parent object has never been saved to its collection.
    #[error("file entity `{0}` has not been saved")]
    UnsavedParent(Uuid),

    /// Download attempted on a parent whose data is not readable.
    #[error("invalid state: {0}")]
    State(String),

    #[error("the supplied source had no data to read")]
    EmptySource,

    #[error("stream i/o failed: {0}")]
    Io(#[from] io::Error),

    #[error("document store operation failed: {0}")]
    Store(#[from] sqlx::Error),

    #[error("transfer canceled")]
    Canceled,

    /// An upload failed and the chunk cleanup that followed failed as well.
    #[error("upload failed ({source}) and chunk cleanup failed ({cleanup})")]
    CleanupFailed {
        source: Box<TransferError>,
        cleanup: Box<TransferError>,
    },
}

pub type TransferResult<T> = Result<T, TransferError>;

impl TransferError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }

    /// True for failures of the underlying stream or store.
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Store(_))
    }

    /// Validation failures, including an unsaved parent.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::UnsavedParent(_))
    }
}
