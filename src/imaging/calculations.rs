//! Pure calculation functions for image geometry.
//!
//! All functions here are pure and testable without any engine or pixels.
//! Dimensions passed in are always the *visual* ones (post-orientation swap).

use super::params::{CropRegion, GeometryPlan, ImageMeta};
use crate::options::{Gravity, ImageFormat, ProcessingOptions, ResizeMode};

/// Clamp the requested target to the source when upscaling is not allowed.
///
/// Applies when `enlarge` is off, and always for CROP (a crop window can
/// never exceed the source). Axes where the target is already within the
/// source, including a zero "unconstrained" FIT axis, are left alone.
///
/// # Examples
/// ```
/// # use imgpipe::imaging::calculations::clamp_target;
/// # use imgpipe::options::{ImageFormat, ProcessingOptions, ResizeMode};
/// let po = ProcessingOptions::new(ResizeMode::Crop, 500, 500, ImageFormat::Jpeg);
/// assert_eq!(clamp_target((300, 300), &po), (300, 300));
/// ```
pub fn clamp_target(source: (u32, u32), options: &ProcessingOptions) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (mut width, mut height) = (options.width, options.height);

    if !options.enlarge || options.resize == ResizeMode::Crop {
        width = width.min(src_w);
        height = height.min(src_h);
    }

    (width, height)
}

/// Scale factor taking the source to the target.
///
/// Returns 1.0 when the target already equals the source, and for CROP,
/// which never scales. FIT picks the smaller axis ratio so the whole image
/// lands inside the box; FILL picks the larger so the box is covered and the
/// overflow can be cropped. A zero target axis contributes no ratio.
pub fn calc_scale(source: (u32, u32), target: (u32, u32), resize: ResizeMode) -> f64 {
    let (src_w, src_h) = source;
    let (tgt_w, tgt_h) = target;

    if source == target || resize == ResizeMode::Crop || src_w == 0 || src_h == 0 {
        return 1.0;
    }

    let ratio = |tgt: u32, src: u32| (tgt > 0).then(|| tgt as f64 / src as f64);
    let ratios = [ratio(tgt_w, src_w), ratio(tgt_h, src_h)];
    let mut ratios = ratios.into_iter().flatten();

    let first = match ratios.next() {
        Some(r) => r,
        None => return 1.0,
    };

    match resize {
        ResizeMode::Fit => ratios.fold(first, f64::min),
        _ => ratios.fold(first, f64::max),
    }
}

/// Integer shrink-on-load factor for `scale`.
///
/// JPEG decoders only shrink cheaply by powers of two through DCT scaling,
/// so the raw factor is mapped onto 1, 2, 4 or 8. Other formats get the
/// raw factor as a hint.
pub fn calc_shrink_factor(scale: f64, format: ImageFormat) -> u32 {
    let shrink = if scale > 0.0 {
        (1.0 / scale).floor().min(u32::MAX as f64) as u32
    } else {
        1
    };

    if format != ImageFormat::Jpeg {
        return shrink.max(1);
    }

    match shrink {
        16.. => 8,
        8.. => 4,
        4.. => 2,
        _ => 1,
    }
}

/// Top-left corner of a `target` window inside `current`.
///
/// The default centers the window, rounding an odd leftover pixel towards
/// the left/top. NORTH/SOUTH pin the top or bottom edge, WEST/EAST the left
/// or right edge; the other axis stays centered. SMART is not handled here.
pub fn calc_crop_origin(current: (u32, u32), target: (u32, u32), gravity: Gravity) -> (u32, u32) {
    let (cur_w, cur_h) = current;
    let (tgt_w, tgt_h) = target;

    let spare_w = cur_w.saturating_sub(tgt_w);
    let spare_h = cur_h.saturating_sub(tgt_h);

    let mut left = (spare_w + 1) / 2;
    let mut top = (spare_h + 1) / 2;

    match gravity {
        Gravity::North => top = 0,
        Gravity::South => top = spare_h,
        Gravity::West => left = 0,
        Gravity::East => left = spare_w,
        Gravity::Center | Gravity::Smart => {}
    }

    (left, top)
}

/// Crop window of the effective target size, clamped to `current`.
///
/// Rounding during shrink and resize can leave an axis a pixel short of the
/// target; the window shrinks to fit rather than reaching out of bounds.
pub fn crop_region(current: (u32, u32), target: (u32, u32), gravity: Gravity) -> CropRegion {
    let width = target.0.min(current.0);
    let height = target.1.min(current.1);
    let (left, top) = calc_crop_origin(current, (width, height), gravity);
    CropRegion {
        left,
        top,
        width,
        height,
    }
}

/// Compute the full geometry plan for one request.
///
/// `source_format` decides whether shrink-on-load is attempted (JPEG and WEBP
/// only). When it is, the integer shrink is folded into the returned scale so
/// that `scale` is what remains to be done after the shrunk decode.
pub fn plan_geometry(
    meta: &ImageMeta,
    options: &ProcessingOptions,
    source_format: ImageFormat,
) -> GeometryPlan {
    let source = (meta.width, meta.height);
    let (target_width, target_height) = clamp_target(source, options);

    let mut scale = calc_scale(source, (target_width, target_height), options.resize);
    let mut shrink = 1;

    if scale < 1.0 && matches!(source_format, ImageFormat::Jpeg | ImageFormat::Webp) {
        shrink = calc_shrink_factor(scale, source_format);
        scale *= shrink as f64;
    }

    GeometryPlan {
        scale,
        shrink,
        target_width,
        target_height,
    }
}
