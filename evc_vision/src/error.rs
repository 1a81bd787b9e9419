//! Vision error types.

use thiserror::Error;

/// Failure reading one frame. The worker skips the frame and carries on.
#[derive(Debug, Error)]
pub enum VisionError {
    /// Underlying reader failed.
    #[error("frame read failed: {0}")]
    Read(#[from] std::io::Error),

    /// Frame could not be decoded.
    #[error("malformed frame: {0}")]
    Decode(String),
}
