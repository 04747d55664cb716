//! Desktop primitives used to record and replay user input.
//!
//! Everything that talks to the operating system sits behind a narrow trait
//! ([`ScreenshotProvider`], [`InputSurface`]) so the recording and playback
//! engines can be driven by in-memory fakes.

pub mod bitmap;
pub mod compare;
pub mod errors;
pub mod input;
pub mod keys;
pub mod screenshot;

pub use bitmap::Bitmap;
pub use compare::{mean_channel_difference, resize_to_match, similar, Tolerance};
pub use errors::DesktopError;
pub use input::{InputSurface, MouseButton, RdevInput};
pub use screenshot::{centered_region, ScreenshotProvider, XcapScreenshots};
