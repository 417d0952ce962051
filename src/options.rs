//! Per-request processing options.
//!
//! These types describe *what* the caller wants: a resize mode, a target box,
//! a gravity, whether upscaling is allowed and which format to emit. They are
//! immutable once built; the pipeline derives its effective (clamped) target
//! from them without writing back.
//!
//! ## Tokens
//!
//! Every enum parses from the short codes used on the request surface, with
//! the long spelling accepted as an alias:
//!
//! | Type | Tokens |
//! |---|---|
//! | [`ResizeMode`] | `fit`, `fill`, `crop` |
//! | [`Gravity`] | `ce`, `no`, `ea`, `so`, `we`, `sm` (or `center`, `north`, `east`, `south`, `west`, `smart`) |
//! | [`ImageFormat`] | `jpeg`/`jpg`, `png`, `webp`, `gif` |

use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OptionsError {
    #[error("unknown resize mode: {0}")]
    UnknownResize(String),
    #[error("unknown gravity: {0}")]
    UnknownGravity(String),
    #[error("unknown image format: {0}")]
    UnknownFormat(String),
    #[error("invalid target size {width}x{height}: {reason}")]
    InvalidSize {
        width: u32,
        height: u32,
        reason: &'static str,
    },
}

/// How the source is mapped onto the target box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeMode {
    /// Scale to fit inside the box; one axis may come out smaller.
    #[default]
    Fit,
    /// Scale to cover the box, then crop the overflow.
    Fill,
    /// Crop only, never scale.
    Crop,
}

impl FromStr for ResizeMode {
    type Err = OptionsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fit" => Ok(Self::Fit),
            "fill" => Ok(Self::Fill),
            "crop" => Ok(Self::Crop),
            other => Err(OptionsError::UnknownResize(other.to_string())),
        }
    }
}

impl fmt::Display for ResizeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fit => "fit",
            Self::Fill => "fill",
            Self::Crop => "crop",
        })
    }
}

/// Which part of the image survives a crop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Gravity {
    #[default]
    Center,
    North,
    East,
    South,
    West,
    /// Salient-region detection by the engine.
    Smart,
}

impl FromStr for Gravity {
    type Err = OptionsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ce" | "center" => Ok(Self::Center),
            "no" | "north" => Ok(Self::North),
            "ea" | "east" => Ok(Self::East),
            "so" | "south" => Ok(Self::South),
            "we" | "west" => Ok(Self::West),
            "sm" | "smart" => Ok(Self::Smart),
            other => Err(OptionsError::UnknownGravity(other.to_string())),
        }
    }
}

impl fmt::Display for Gravity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Center => "ce",
            Self::North => "no",
            Self::East => "ea",
            Self::South => "so",
            Self::West => "we",
            Self::Smart => "sm",
        })
    }
}

/// Container formats the pipeline knows about.
///
/// Whether a given format can actually be decoded or encoded is a question
/// for the [`CapabilityRegistry`](crate::imaging::CapabilityRegistry), not
/// for this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Webp,
    Gif,
}

impl ImageFormat {
    pub const ALL: [Self; 4] = [Self::Jpeg, Self::Png, Self::Webp, Self::Gif];

    /// Canonical file extension for output naming.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Gif => "gif",
        }
    }

    /// Map a file extension (case-insensitive) to a format.
    pub fn from_extension(ext: &str) -> Option<Self> {
        ext.parse().ok()
    }

    /// Detect the container format from leading magic bytes.
    pub fn sniff(data: &[u8]) -> Option<Self> {
        match data {
            [0xFF, 0xD8, 0xFF, ..] => Some(Self::Jpeg),
            [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, ..] => Some(Self::Png),
            [b'G', b'I', b'F', b'8', b'7' | b'9', b'a', ..] => Some(Self::Gif),
            [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some(Self::Webp),
            _ => None,
        }
    }
}

impl FromStr for ImageFormat {
    type Err = OptionsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            "webp" => Ok(Self::Webp),
            "gif" => Ok(Self::Gif),
            other => Err(OptionsError::UnknownFormat(other.to_string())),
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Gif => "gif",
        })
    }
}

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(u8);

impl Quality {
    pub fn new(value: u32) -> Self {
        // Clamped to 1..=100, so the narrowing is lossless.
        Self(value.clamp(1, 100) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(80)
    }
}

/// What one request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessingOptions {
    pub resize: ResizeMode,
    pub width: u32,
    pub height: u32,
    pub gravity: Gravity,
    /// Allow upscaling beyond the source dimensions.
    pub enlarge: bool,
    pub format: ImageFormat,
}

impl ProcessingOptions {
    pub fn new(resize: ResizeMode, width: u32, height: u32, format: ImageFormat) -> Self {
        Self {
            resize,
            width,
            height,
            gravity: Gravity::default(),
            enlarge: false,
            format,
        }
    }

    pub fn with_gravity(mut self, gravity: Gravity) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn with_enlarge(mut self, enlarge: bool) -> Self {
        self.enlarge = enlarge;
        self
    }

    /// Check the target box against the resize mode.
    ///
    /// FILL and CROP need both axes; FIT needs at least one.
    pub fn validate(&self) -> Result<(), OptionsError> {
        let invalid = |reason| OptionsError::InvalidSize {
            width: self.width,
            height: self.height,
            reason,
        };
        match self.resize {
            ResizeMode::Fill | ResizeMode::Crop if self.width == 0 || self.height == 0 => {
                Err(invalid("fill and crop require both width and height"))
            }
            ResizeMode::Fit if self.width == 0 && self.height == 0 => {
                Err(invalid("fit requires width or height"))
            }
            _ => Ok(()),
        }
    }
}
