//! Pipeline stages built on top of the engine primitives.
//!
//! Two orderings here are silent-correctness hazards, so each is exposed as a
//! single function rather than as separately callable steps:
//!
//! - [`resize`]: premultiply → resize → unpremultiply, or a plain resize when
//!   there is no alpha. Both halves of the bracket run or neither does.
//! - [`orient_and_crop`]: rotate → flip → crop, where the crop window is
//!   computed against the post-rotation dimensions.
//!
//! Colorspace normalization ([`normalize_colorspace`]) must run between the
//! two; the orchestrator owns that sequencing.

use super::calculations::crop_region;
use super::engine::{EngineError, ImageEngine};
use super::params::{Angle, ColorInterpretation, GeometryPlan, ImageMeta};
use crate::options::{Gravity, ProcessingOptions, ResizeMode};
use tracing::debug;

/// Resize by `scale`, bracketing with premultiply/unpremultiply when the
/// image has an alpha channel.
pub fn resize<E: ImageEngine>(
    engine: &E,
    image: E::Handle,
    scale: f64,
) -> Result<E::Handle, EngineError> {
    if !engine.has_alpha(&image) {
        debug!(scale, "resize");
        return engine.resize(image, scale);
    }

    let (image, band_format) = engine.premultiply(image)?;
    debug!(scale, ?band_format, "resize premultiplied");
    let image = engine.resize(image, scale)?;
    engine.unpremultiply(image, band_format)
}

/// Convert to sRGB unless the engine already reads the image as sRGB.
pub fn normalize_colorspace<E: ImageEngine>(
    engine: &E,
    image: E::Handle,
) -> Result<E::Handle, EngineError> {
    let interpretation = engine.interpretation(&image);
    if interpretation == ColorInterpretation::Srgb {
        return Ok(image);
    }
    debug!(?interpretation, "convert colorspace to srgb");
    engine.convert_colorspace(image, ColorInterpretation::Srgb)
}

/// Apply the pending rotation and flip, then the crop for `options`.
///
/// The handle is copied into exclusively owned memory once, before the first
/// transform that rewrites region data.
pub fn orient_and_crop<E: ImageEngine>(
    engine: &E,
    image: E::Handle,
    meta: &ImageMeta,
    plan: &GeometryPlan,
    options: &ProcessingOptions,
) -> Result<E::Handle, EngineError> {
    let mut image = image;
    let mut exclusive = false;

    if meta.needs_orientation() {
        image = engine.copy_memory(image)?;
        exclusive = true;

        if meta.angle != Angle::D0 {
            debug!(angle = meta.angle.degrees(), "rotate");
            image = engine.rotate(image, meta.angle)?;
        }
        if meta.flip {
            debug!("flip horizontal");
            image = engine.flip_horizontal(image)?;
        }
    }

    if options.resize == ResizeMode::Fit {
        return Ok(image);
    }

    let target = (plan.target_width, plan.target_height);

    if options.gravity == Gravity::Smart {
        if !exclusive {
            image = engine.copy_memory(image)?;
        }
        debug!(width = target.0, height = target.1, "smart crop");
        return engine.smart_crop(image, target.0, target.1);
    }

    let current = engine.dimensions(&image);
    let region = crop_region(current, target, options.gravity);
    if (region.width, region.height) == current {
        return Ok(image);
    }

    if !exclusive {
        image = engine.copy_memory(image)?;
    }
    debug!(%region, gravity = %options.gravity, "crop");
    engine.crop(image, region)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::engine::tests::{MockEngine, RecordedOp};
    use crate::imaging::metadata::extract_meta;
    use crate::imaging::params::{BandFormat, CropRegion};
    use crate::options::ImageFormat;

    fn plan(target_width: u32, target_height: u32) -> GeometryPlan {
        GeometryPlan {
            scale: 1.0,
            shrink: 1,
            target_width,
            target_height,
        }
    }

    // =========================================================================
    // resize
    // =========================================================================

    #[test]
    fn resize_with_alpha_brackets_premultiply() {
        let engine = MockEngine::new(400, 400).with_alpha();
        let img = engine.decode(b"", ImageFormat::Png, 1).unwrap();

        let img = resize(&engine, img, 0.5).unwrap();

        assert_eq!((img.width, img.height), (200, 200));
        assert!(!img.premultiplied);
        assert_eq!(
            engine.op_names(),
            vec!["decode", "premultiply", "resize", "unpremultiply"]
        );
        assert_eq!(engine.count("premultiply"), 1);
        assert_eq!(engine.count("unpremultiply"), 1);
        assert!(
            engine
                .get_operations()
                .contains(&RecordedOp::Unpremultiply(BandFormat::U8))
        );
    }

    #[test]
    fn resize_without_alpha_skips_premultiply() {
        let engine = MockEngine::new(400, 400);
        let img = engine.decode(b"", ImageFormat::Jpeg, 1).unwrap();

        resize(&engine, img, 0.5).unwrap();

        assert_eq!(engine.count("premultiply"), 0);
        assert_eq!(engine.count("unpremultiply"), 0);
        assert_eq!(engine.count("resize"), 1);
    }

    #[test]
    fn resize_failure_stops_before_unpremultiply() {
        let engine = MockEngine::new(400, 400).with_alpha().failing_on("resize");
        let img = engine.decode(b"", ImageFormat::Png, 1).unwrap();

        assert!(resize(&engine, img, 0.5).is_err());
        assert_eq!(engine.count("unpremultiply"), 0);
    }

    // =========================================================================
    // normalize_colorspace
    // =========================================================================

    #[test]
    fn srgb_is_left_alone() {
        let engine = MockEngine::new(10, 10);
        let img = engine.decode(b"", ImageFormat::Jpeg, 1).unwrap();
        normalize_colorspace(&engine, img).unwrap();
        assert_eq!(engine.count("colourspace"), 0);
    }

    #[test]
    fn greyscale_is_converted() {
        let engine = MockEngine::new(10, 10).with_interpretation(ColorInterpretation::BW);
        let img = engine.decode(b"", ImageFormat::Png, 1).unwrap();
        let img = normalize_colorspace(&engine, img).unwrap();
        assert_eq!(img.interpretation, ColorInterpretation::Srgb);
        assert_eq!(engine.count("colourspace"), 1);
    }

    // =========================================================================
    // orient_and_crop
    // =========================================================================

    #[test]
    fn rotation_precedes_flip_precedes_crop() {
        // Orientation 5: 90° + flip; raw 300x200 shows as 200x300
        let engine = MockEngine::new(300, 200).with_orientation(5);
        let img = engine.decode(b"", ImageFormat::Jpeg, 1).unwrap();
        let meta = extract_meta(&engine, &img);
        let po = ProcessingOptions::new(ResizeMode::Crop, 200, 100, ImageFormat::Jpeg)
            .with_gravity(Gravity::North);

        let img = orient_and_crop(&engine, img, &meta, &plan(200, 100), &po).unwrap();

        assert_eq!((img.width, img.height), (200, 100));
        assert_eq!(
            engine.op_names(),
            vec!["decode", "copy_memory", "rotate", "flip", "crop"]
        );
        // Window computed against the rotated 200x300 image
        assert!(engine.get_operations().contains(&RecordedOp::Crop(CropRegion {
            left: 0,
            top: 0,
            width: 200,
            height: 100,
        })));
    }

    #[test]
    fn fit_never_crops() {
        let engine = MockEngine::new(300, 200);
        let img = engine.decode(b"", ImageFormat::Jpeg, 1).unwrap();
        let meta = extract_meta(&engine, &img);
        let po = ProcessingOptions::new(ResizeMode::Fit, 100, 100, ImageFormat::Jpeg);

        let img = orient_and_crop(&engine, img, &meta, &plan(100, 100), &po).unwrap();

        assert_eq!((img.width, img.height), (300, 200));
        assert_eq!(engine.op_names(), vec!["decode"]);
    }

    #[test]
    fn gravity_crop_copies_memory_first() {
        let engine = MockEngine::new(300, 200);
        let img = engine.decode(b"", ImageFormat::Jpeg, 1).unwrap();
        let meta = extract_meta(&engine, &img);
        let po = ProcessingOptions::new(ResizeMode::Fill, 100, 100, ImageFormat::Jpeg)
            .with_gravity(Gravity::East);

        orient_and_crop(&engine, img, &meta, &plan(100, 100), &po).unwrap();

        assert_eq!(engine.op_names(), vec!["decode", "copy_memory", "crop"]);
        assert!(engine.get_operations().contains(&RecordedOp::Crop(CropRegion {
            left: 200,
            top: 50,
            width: 100,
            height: 100,
        })));
    }

    #[test]
    fn full_frame_crop_is_skipped() {
        let engine = MockEngine::new(100, 100);
        let img = engine.decode(b"", ImageFormat::Jpeg, 1).unwrap();
        let meta = extract_meta(&engine, &img);
        let po = ProcessingOptions::new(ResizeMode::Fill, 100, 100, ImageFormat::Jpeg);

        orient_and_crop(&engine, img, &meta, &plan(100, 100), &po).unwrap();

        assert_eq!(engine.count("crop"), 0);
    }

    #[test]
    fn smart_gravity_delegates_to_engine() {
        let engine = MockEngine::new(600, 400);
        let img = engine.decode(b"", ImageFormat::Jpeg, 1).unwrap();
        let meta = extract_meta(&engine, &img);
        let po = ProcessingOptions::new(ResizeMode::Fill, 300, 300, ImageFormat::Jpeg)
            .with_gravity(Gravity::Smart);

        let img = orient_and_crop(&engine, img, &meta, &plan(300, 300), &po).unwrap();

        assert_eq!((img.width, img.height), (300, 300));
        assert_eq!(engine.op_names(), vec!["decode", "copy_memory", "smartcrop"]);
        assert_eq!(engine.count("crop"), 0);
    }

    #[test]
    fn oriented_smart_crop_copies_once() {
        let engine = MockEngine::new(600, 400).with_orientation(3);
        let img = engine.decode(b"", ImageFormat::Jpeg, 1).unwrap();
        let meta = extract_meta(&engine, &img);
        let po = ProcessingOptions::new(ResizeMode::Crop, 300, 300, ImageFormat::Jpeg)
            .with_gravity(Gravity::Smart);

        orient_and_crop(&engine, img, &meta, &plan(300, 300), &po).unwrap();

        assert_eq!(
            engine.op_names(),
            vec!["decode", "copy_memory", "rotate", "smartcrop"]
        );
    }
}
