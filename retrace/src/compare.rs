//! Image similarity under a numeric tolerance.
//!
//! Two bitmaps are similar when they have the same dimensions and the mean
//! per-channel absolute difference over the colour channels is at most the
//! tolerance. Alpha is ignored: screen captures are opaque, and counting it
//! would dilute the score.

use image::imageops::{self, FilterType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Bitmap, DesktopError};

/// Tolerance presets exposed by the editing surface. The numeric values are
/// baked into exported scripts and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tolerance {
    Low,
    #[default]
    Medium,
    High,
    Custom(f64),
}

impl Tolerance {
    pub fn value(&self) -> f64 {
        match self {
            Tolerance::Low => 3.0,
            Tolerance::Medium => 7.0,
            Tolerance::High => 10.0,
            Tolerance::Custom(v) => *v,
        }
    }
}

impl fmt::Display for Tolerance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tolerance::Low => write!(f, "low"),
            Tolerance::Medium => write!(f, "medium"),
            Tolerance::High => write!(f, "high"),
            Tolerance::Custom(v) => write!(f, "{v}"),
        }
    }
}

impl FromStr for Tolerance {
    type Err = DesktopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Tolerance::Low),
            "medium" => Ok(Tolerance::Medium),
            "high" => Ok(Tolerance::High),
            other => other
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite() && *v >= 0.0)
                .map(Tolerance::Custom)
                .ok_or_else(|| {
                    DesktopError::InvalidArgument(format!(
                        "tolerance must be low, medium, high or a non-negative number, got '{s}'"
                    ))
                }),
        }
    }
}

/// Mean absolute difference per colour channel, or `None` when the
/// dimensions differ.
pub fn mean_channel_difference(a: &Bitmap, b: &Bitmap) -> Option<f64> {
    if a.dimensions() != b.dimensions() {
        return None;
    }

    let samples = u64::from(a.width()) * u64::from(a.height()) * 3;
    if samples == 0 {
        return Some(0.0);
    }

    let total: u64 = a
        .pixels()
        .zip(b.pixels())
        .map(|(pa, pb)| {
            (0..3)
                .map(|c| u64::from(pa.0[c].abs_diff(pb.0[c])))
                .sum::<u64>()
        })
        .sum();

    Some(total as f64 / samples as f64)
}

pub fn similar(a: &Bitmap, b: &Bitmap, tolerance: f64) -> bool {
    match mean_channel_difference(a, b) {
        Some(diff) => diff <= tolerance,
        None => false,
    }
}

/// Resize `image` to exactly `width` x `height`, returning it untouched when
/// it already matches.
pub fn resize_to_match(image: &Bitmap, width: u32, height: u32) -> Bitmap {
    if image.dimensions() == (width, height) {
        return image.clone();
    }
    Bitmap::new(imageops::resize(image.image(), width, height, FilterType::Triangle))
}
