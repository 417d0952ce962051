//! Request orchestration: bytes in, bytes out.
//!
//! [`process_image_with_engine`] is the only place that sequences the stages.
//! The order is fixed:
//!
//! ```text
//! validate options + capabilities      (no decode yet)
//! decode (shrink 1)                    ── checkpoint
//! extract metadata, plan geometry
//! if effective target != source:
//!     re-decode at shrink (FIT/FILL, shrink > 1)
//!     alpha-safe resize (FIT/FILL)
//!     colorspace → sRGB                ── checkpoint
//!     rotate → flip → crop             ── checkpoint
//! encode                               ── checkpoint before
//! ```
//!
//! Every handle is owned by this function and moved into each stage, so any
//! `?` exit drops whatever intermediate image is alive at that point.

use crate::deadline::{Deadline, DeadlineExceeded};
use crate::imaging::calculations::plan_geometry;
use crate::imaging::capabilities::{self, CapabilityRegistry};
use crate::imaging::engine::{EngineError, ImageEngine};
use crate::imaging::metadata::extract_meta;
use crate::imaging::operations::{normalize_colorspace, orient_and_crop, resize};
use crate::imaging::params::{GeometryPlan, ImageMeta};
use crate::options::{Gravity, ImageFormat, OptionsError, ProcessingOptions, Quality, ResizeMode};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid options: {0}")]
    InvalidOptions(#[from] OptionsError),
    #[error("unsupported: {0}")]
    UnsupportedCapability(String),
    #[error("image processing failed: {0}")]
    Engine(#[from] EngineError),
    #[error(transparent)]
    DeadlineExceeded(#[from] DeadlineExceeded),
}

/// Reject requests the engine cannot serve before any pixel work happens.
fn check_capabilities(
    registry: &CapabilityRegistry,
    source_format: ImageFormat,
    options: &ProcessingOptions,
) -> Result<(), PipelineError> {
    if options.gravity == Gravity::Smart && !registry.supports_smart_crop() {
        return Err(PipelineError::UnsupportedCapability(
            "smart crop is not available".into(),
        ));
    }
    if !registry.can_decode(source_format) {
        return Err(PipelineError::UnsupportedCapability(format!(
            "cannot decode {source_format}"
        )));
    }
    if !registry.can_encode(options.format) {
        return Err(PipelineError::UnsupportedCapability(format!(
            "cannot encode {}",
            options.format
        )));
    }
    Ok(())
}

/// Run one request against `engine`, using `registry` for capability checks.
pub fn process_image_with_engine<E: ImageEngine>(
    engine: &E,
    registry: &CapabilityRegistry,
    data: &[u8],
    source_format: ImageFormat,
    options: &ProcessingOptions,
    quality: Quality,
    deadline: &Deadline,
) -> Result<Vec<u8>, PipelineError> {
    options.validate()?;
    check_capabilities(registry, source_format, options)?;

    let image = engine.decode(data, source_format, 1)?;
    deadline.check()?;

    let meta = extract_meta(engine, &image);
    let plan = plan_geometry(&meta, options, source_format);
    debug!(
        source = %format_args!("{}x{}", meta.width, meta.height),
        target = %format_args!("{}x{}", plan.target_width, plan.target_height),
        scale = plan.scale,
        shrink = plan.shrink,
        "geometry planned"
    );

    let image = if (plan.target_width, plan.target_height) == (meta.width, meta.height) {
        debug!("target equals source, skipping transforms");
        image
    } else {
        transform(engine, image, data, source_format, &meta, &plan, options, deadline)?
    };

    deadline.check()?;
    let output = engine.encode(&image, options.format, quality)?;

    let (width, height) = engine.dimensions(&image);
    info!(
        format = %options.format,
        width,
        height,
        bytes = output.len(),
        elapsed_ms = deadline.elapsed().as_millis() as u64,
        "image processed"
    );
    Ok(output)
}

#[allow(clippy::too_many_arguments)]
fn transform<E: ImageEngine>(
    engine: &E,
    mut image: E::Handle,
    data: &[u8],
    source_format: ImageFormat,
    meta: &ImageMeta,
    plan: &GeometryPlan,
    options: &ProcessingOptions,
    deadline: &Deadline,
) -> Result<E::Handle, PipelineError> {
    if options.resize != ResizeMode::Crop {
        if plan.needs_redecode() {
            debug!(shrink = plan.shrink, "re-decoding with shrink-on-load");
            drop(image);
            image = engine.decode(data, source_format, plan.shrink)?;
        }
        image = resize(engine, image, plan.scale)?;
    }

    let image = normalize_colorspace(engine, image)?;
    deadline.check()?;

    let image = orient_and_crop(engine, image, meta, plan, options)?;
    deadline.check()?;

    Ok(image)
}

/// Run one request using the process-wide capability registry.
///
/// [`capabilities::init`] must have been called at startup.
pub fn process_image<E: ImageEngine>(
    engine: &E,
    data: &[u8],
    source_format: ImageFormat,
    options: &ProcessingOptions,
    quality: Quality,
    deadline: &Deadline,
) -> Result<Vec<u8>, PipelineError> {
    let registry = capabilities::global().ok_or_else(|| {
        EngineError::Init("capability registry has not been initialized".into())
    })?;
    process_image_with_engine(engine, registry, data, source_format, options, quality, deadline)
}
