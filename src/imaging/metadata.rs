//! Metadata extraction from a decoded handle.

use super::engine::ImageEngine;
use super::params::{Angle, ImageMeta};

/// Rotation implied by an EXIF orientation code.
pub fn orientation_angle(orientation: u8) -> Angle {
    match orientation {
        3 | 4 => Angle::D180,
        5 | 6 => Angle::D90,
        7 | 8 => Angle::D270,
        _ => Angle::D0,
    }
}

/// Whether an EXIF orientation code implies a horizontal flip after rotation.
pub fn orientation_flip(orientation: u8) -> bool {
    matches!(orientation, 2 | 4 | 5 | 7)
}

/// Read dimensions, orientation and alpha from `image`.
///
/// Orientations 5-8 are 90°-class, so width and height are swapped to give
/// the dimensions the image will have once oriented. Codes outside 1-8 are
/// treated as "no orientation".
pub fn extract_meta<E: ImageEngine>(engine: &E, image: &E::Handle) -> ImageMeta {
    let (mut width, mut height) = engine.dimensions(image);
    let orientation = engine.orientation(image);

    if (5..=8).contains(&orientation) {
        std::mem::swap(&mut width, &mut height);
    }

    ImageMeta {
        width,
        height,
        angle: orientation_angle(orientation),
        flip: orientation_flip(orientation),
        has_alpha: engine.has_alpha(image),
    }
}
