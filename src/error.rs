use crate::common::*;
use thiserror::Error;

/// Errors raised by the video data pipeline.
///
/// Manifest and construction errors are fatal before the first epoch;
/// `MissingFrame` is recoverable per sample and only shrinks its batch.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("{}:{line_no}: bad manifest line: {message}", path.display())]
    Parse {
        path: PathBuf,
        line_no: usize,
        message: String,
    },
    #[error(
        "video {video_id} has {frame_count} frames, needs at least {required} \
         for {}-segment validation sampling",
        crate::params::NUM_VAL_SEGMENTS
    )]
    InsufficientLength {
        video_id: String,
        frame_count: i64,
        required: i64,
    },
    #[error("missing frame file {}", path.display())]
    MissingFrame { path: PathBuf },
    #[error("invalid mode {given:?}: expected one of {expected}")]
    InvalidMode {
        given: String,
        expected: &'static str,
    },
}

impl DataError {
    /// Whether the error only affects one sample and the epoch may continue.
    pub fn is_per_sample(&self) -> bool {
        matches!(self, DataError::MissingFrame { .. })
    }
}
