//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They sit between
//! the pure [`calculations`](super::calculations), the stage functions in
//! [`operations`](super::operations) and the [`engine`](super::engine) that
//! does the pixel work.
//!
//! ## Types
//!
//! - [`Angle`]: clockwise rotation in 90° steps.
//! - [`ImageMeta`]: visual dimensions plus the rotation/flip needed to get
//!   there; derived once per decode.
//! - [`GeometryPlan`]: scale, shrink-on-load factor and effective target;
//!   computed once per request.
//! - [`CropRegion`]: the window handed to the engine's crop primitive.
//! - [`BandFormat`]: numeric sample format, recorded across premultiply.
//! - [`ColorInterpretation`]: how the engine reads the bands.

use serde::Serialize;
use std::fmt;

/// Clockwise rotation in 90-degree steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Angle {
    #[default]
    D0,
    D90,
    D180,
    D270,
}

impl Angle {
    pub fn degrees(self) -> u32 {
        match self {
            Self::D0 => 0,
            Self::D90 => 90,
            Self::D180 => 180,
            Self::D270 => 270,
        }
    }
}

/// Metadata of a decoded image, as it will visually appear.
///
/// `width`/`height` are already swapped for 90°-class orientations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageMeta {
    pub width: u32,
    pub height: u32,
    pub angle: Angle,
    /// Horizontal flip, applied after rotation.
    pub flip: bool,
    pub has_alpha: bool,
}

impl ImageMeta {
    /// Whether any rotation or flip is pending.
    pub fn needs_orientation(&self) -> bool {
        self.angle != Angle::D0 || self.flip
    }
}

/// The numbers the resize and crop stages consume.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryPlan {
    /// Remaining resize after shrink-on-load (1.0 = none).
    pub scale: f64,
    /// Integer decode-time downscale hint (1 = full decode).
    pub shrink: u32,
    /// Effective target after enlarge/crop-bounds clamping.
    pub target_width: u32,
    pub target_height: u32,
}

impl GeometryPlan {
    pub fn needs_redecode(&self) -> bool {
        self.shrink > 1
    }
}

/// Rectangle handed to the engine's crop primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl fmt::Display for CropRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}+{}+{}",
            self.width, self.height, self.left, self.top
        )
    }
}

/// Numeric format of each band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BandFormat {
    U8,
    U16,
    F32,
}

/// How the engine interprets an image's bands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorInterpretation {
    /// 8-bit sRGB, the normalization target.
    Srgb,
    /// 16-bit RGB.
    Rgb16,
    /// 8-bit greyscale.
    BW,
    /// 16-bit greyscale.
    Grey16,
    /// Linear floating-point RGB.
    ScRgb,
}
