//! Image processing: planning math, engine boundary and pipeline stages.
//!
//! | Piece | Where |
//! |---|---|
//! | **Dimension math** (scale, shrink, crop window) | [`calculations`] |
//! | **What-to-do types** | [`params`] |
//! | **Engine boundary** | [`ImageEngine`] trait, [`EngineError`], [`Capabilities`] |
//! | **Production engine** | [`RustEngine`] on the `image` crate |
//! | **Capability registry** | [`capabilities`], built once at startup |
//! | **Decoded-image cache** | [`decode_cache`] |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Engine**: [`ImageEngine`] trait + [`RustEngine`]
//! - **Operations**: Stage functions combining calculations + engine primitives

pub mod calculations;
pub mod capabilities;
pub mod decode_cache;
pub mod engine;
pub mod metadata;
pub(crate) mod operations;
pub mod params;
pub mod rust_engine;
mod smartcrop;

pub use capabilities::CapabilityRegistry;
pub use engine::{Capabilities, EngineError, ImageEngine};
pub use params::{Angle, BandFormat, ColorInterpretation, CropRegion, GeometryPlan, ImageMeta};
pub use rust_engine::RustEngine;
