use std::{path::PathBuf, time::Duration};

use thiserror::Error;

/// Failure kinds of the media generation tools.
///
/// `UnsupportedImageForModel`, `StatusPollTransientFailure`, `ImageProbeFailed`
/// and `ImageResizeFailed` are soft: they get logged and the run continues with
/// a fallback. Every other kind ends the run.
#[derive(Debug, Error)]
pub enum MediaGenError {
    #[error("Missing {var} environment variable")]
    MissingCredential { var: &'static str },

    #[error("Input image not found: {}", path.display())]
    MissingInputFile { path: PathBuf },

    #[error("Model {model} does not support image input, ignoring input image")]
    UnsupportedImageForModel { model: String },

    #[error("Failed to create task ({status}): {body}")]
    JobCreationFailed { status: u16, body: String },

    #[error("Failed to get status ({status}): {body}")]
    StatusPollTransientFailure { status: u16, body: String },

    #[error("Video generation failed: {detail}")]
    JobFailed { detail: String },

    #[error("Video generation timed out after {}s", after.as_secs())]
    JobTimedOut { after: Duration },

    #[error("Download failed: {reason}")]
    DownloadFailed { reason: String },

    #[error("Could not read dimensions of {}: {reason}", path.display())]
    ImageProbeFailed { path: PathBuf, reason: String },

    #[error("Could not resize {} to {width}x{height}: {reason}", path.display())]
    ImageResizeFailed {
        path: PathBuf,
        width: u32,
        height: u32,
        reason: String,
    },

    #[error("Unexpected response from provider: {reason}")]
    ResponseParseFailed { reason: String },

    /// The provider answered with an explicit `error` object.
    #[error("API error: {message}")]
    Api { message: String },
}

impl MediaGenError {
    pub fn parse_failed(reason: impl Into<String>) -> Self {
        Self::ResponseParseFailed {
            reason: reason.into(),
        }
    }

    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedImageForModel { .. }
                | Self::StatusPollTransientFailure { .. }
                | Self::ImageProbeFailed { .. }
                | Self::ImageResizeFailed { .. }
        )
    }
}
