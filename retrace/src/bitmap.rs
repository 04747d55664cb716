//! Immutable RGBA bitmaps shared between capture, playback and storage.
//!
//! A [`Bitmap`] is cheap to clone (the pixels live behind an `Arc`) and
//! compares pixel-exactly. On the wire it is a base64-encoded PNG string, which
//! keeps session files lossless.

use base64::{engine::general_purpose, Engine as _};
use image::{ImageFormat, Rgba, RgbaImage};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::io::Cursor;
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

use crate::DesktopError;

#[derive(Clone, PartialEq)]
pub struct Bitmap(Arc<RgbaImage>);

impl Bitmap {
    pub fn new(image: RgbaImage) -> Self {
        Self(Arc::new(image))
    }

    /// A bitmap of a single colour.
    pub fn filled(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        Self::new(RgbaImage::from_pixel(width, height, Rgba(rgba)))
    }

    pub fn image(&self) -> &RgbaImage {
        &self.0
    }

    pub fn to_png_bytes(&self) -> Result<Vec<u8>, DesktopError> {
        let mut png = Vec::new();
        self.0.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
        Ok(png)
    }

    pub fn from_png_bytes(bytes: &[u8]) -> Result<Self, DesktopError> {
        let decoded = image::load_from_memory_with_format(bytes, ImageFormat::Png)?;
        Ok(Self::new(decoded.to_rgba8()))
    }

    pub fn to_base64_png(&self) -> Result<String, DesktopError> {
        Ok(general_purpose::STANDARD.encode(self.to_png_bytes()?))
    }

    pub fn from_base64_png(encoded: &str) -> Result<Self, DesktopError> {
        let bytes = general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| DesktopError::ImageError(format!("invalid base64 image data: {e}")))?;
        Self::from_png_bytes(&bytes)
    }

    pub fn save_png(&self, path: impl AsRef<Path>) -> Result<(), DesktopError> {
        self.0.save_with_format(path, ImageFormat::Png)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, DesktopError> {
        Ok(Self::new(image::open(path)?.to_rgba8()))
    }
}

impl Deref for Bitmap {
    type Target = RgbaImage;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<RgbaImage> for Bitmap {
    fn from(image: RgbaImage) -> Self {
        Self::new(image)
    }
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bitmap({}x{})", self.0.width(), self.0.height())
    }
}

impl Serialize for Bitmap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let encoded = self.to_base64_png().map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&encoded)
    }
}

impl<'de> Deserialize<'de> for Bitmap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Bitmap::from_base64_png(&encoded).map_err(de::Error::custom)
    }
}
