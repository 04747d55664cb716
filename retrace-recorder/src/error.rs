use retrace::DesktopError;
use std::path::PathBuf;
use thiserror::Error;

use crate::session::SessionState;

#[derive(Error, Debug)]
pub enum RecorderError {
    /// The global input hook could not be installed.
    #[error("Input capture unavailable: {0}")]
    CaptureUnavailable(String),

    #[error("Playback failed at action {index}: {source}")]
    PlaybackExecution {
        index: usize,
        #[source]
        source: DesktopError,
    },

    #[error("Failed to access session file {}: {message}", .path.display())]
    Persistence { path: PathBuf, message: String },

    #[error("Cannot {operation} while the session is {from}")]
    InvalidTransition {
        from: SessionState,
        operation: &'static str,
    },

    #[error(transparent)]
    Desktop(#[from] DesktopError),
}

impl RecorderError {
    pub(crate) fn persistence(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        RecorderError::Persistence {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RecorderError>;
