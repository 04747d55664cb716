use thiserror::Error;

#[derive(Error, Debug)]
pub enum DesktopError {
    #[error("Platform-specific error: {0}")]
    PlatformError(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No active window: {0}")]
    NoActiveWindow(String),

    #[error("Image error: {0}")]
    ImageError(String),

    #[error("Input simulation failed: {0}")]
    Simulation(String),
}

impl From<image::ImageError> for DesktopError {
    fn from(e: image::ImageError) -> Self {
        DesktopError::ImageError(e.to_string())
    }
}

impl From<xcap::XCapError> for DesktopError {
    fn from(e: xcap::XCapError) -> Self {
        DesktopError::PlatformError(e.to_string())
    }
}
