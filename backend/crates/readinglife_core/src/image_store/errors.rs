use std::io;

/// Errors raised by the on-disk image directory.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ImageStoreError {
    #[error("image file not found: {0}")]
    NotFound(String),

    #[error("invalid image path: {0}")]
    InvalidPath(String),

    #[error("image I/O error: {0}")]
    Io(#[from] io::Error),
}
