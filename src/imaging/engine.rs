//! Image engine trait and shared types.
//!
//! The [`ImageEngine`] trait is the boundary between the planner/executor and
//! whatever does the actual pixel work. The pipeline only ever talks to an
//! engine through this trait, so a recording mock can stand in for tests.
//!
//! ## Ownership
//!
//! Every transforming primitive takes its input handle **by value** and
//! returns a fresh one. The superseded handle is dropped inside the call (or
//! on the error path when the call fails), so no stage can read a handle that
//! a later stage has replaced. Handles are never shared across requests.
//!
//! The production implementation is
//! [`RustEngine`](super::rust_engine::RustEngine).

use super::params::{Angle, BandFormat, ColorInterpretation, CropRegion};
use crate::options::{ImageFormat, Quality};
use serde::Serialize;
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("engine initialization failed: {0}")]
    Init(String),
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("encode failed: {0}")]
    Encode(String),
    #[error("{op} failed: {message}")]
    Operation { op: &'static str, message: String },
}

impl EngineError {
    pub fn operation(op: &'static str, message: impl Into<String>) -> Self {
        Self::Operation {
            op,
            message: message.into(),
        }
    }
}

/// What an engine can do, as reported once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub decode: BTreeSet<ImageFormat>,
    pub encode: BTreeSet<ImageFormat>,
    pub smart_crop: bool,
}

/// Pixel primitives the pipeline sequences.
///
/// Queries borrow the handle; transforms consume it. `Sync` so a single
/// engine can serve all worker threads.
pub trait ImageEngine: Sync {
    /// Opaque decoded image, exclusively owned by one request.
    type Handle: Send;

    fn capabilities(&self) -> Capabilities;

    /// Decode `data`. `shrink` > 1 asks for an integer downscale at load time.
    fn decode(
        &self,
        data: &[u8],
        format: ImageFormat,
        shrink: u32,
    ) -> Result<Self::Handle, EngineError>;

    fn encode(
        &self,
        image: &Self::Handle,
        format: ImageFormat,
        quality: Quality,
    ) -> Result<Vec<u8>, EngineError>;

    /// Raw pixel dimensions, before any orientation is applied.
    fn dimensions(&self, image: &Self::Handle) -> (u32, u32);

    /// EXIF orientation code 1-8. 0 (absent) and 1 both mean "as stored".
    fn orientation(&self, image: &Self::Handle) -> u8;

    fn has_alpha(&self, image: &Self::Handle) -> bool;

    fn interpretation(&self, image: &Self::Handle) -> ColorInterpretation;

    fn resize(&self, image: Self::Handle, scale: f64) -> Result<Self::Handle, EngineError>;

    fn rotate(&self, image: Self::Handle, angle: Angle) -> Result<Self::Handle, EngineError>;

    fn flip_horizontal(&self, image: Self::Handle) -> Result<Self::Handle, EngineError>;

    fn crop(&self, image: Self::Handle, region: CropRegion) -> Result<Self::Handle, EngineError>;

    fn convert_colorspace(
        &self,
        image: Self::Handle,
        target: ColorInterpretation,
    ) -> Result<Self::Handle, EngineError>;

    /// Multiply color bands by alpha. Returns the band format to restore later.
    fn premultiply(&self, image: Self::Handle)
    -> Result<(Self::Handle, BandFormat), EngineError>;

    /// Divide color bands by alpha and cast back to `format`.
    fn unpremultiply(
        &self,
        image: Self::Handle,
        format: BandFormat,
    ) -> Result<Self::Handle, EngineError>;

    /// Crop to `width`x`height` around the most salient region.
    fn smart_crop(
        &self,
        image: Self::Handle,
        width: u32,
        height: u32,
    ) -> Result<Self::Handle, EngineError>;

    /// Guarantee an exclusively owned, contiguous pixel buffer.
    fn copy_memory(&self, image: Self::Handle) -> Result<Self::Handle, EngineError>;
}
