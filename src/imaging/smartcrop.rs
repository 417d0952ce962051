//! Salient-region window search.
//!
//! Scores every pixel by local contrast (luma gradient) plus saturation,
//! builds a summed-area table, and slides the target window across the image
//! to find the placement with the most "interesting" content. Among equal
//! scores the placement nearest the center wins, so a featureless image
//! degrades to a center crop.

use super::params::CropRegion;
use image::{DynamicImage, GenericImageView};

/// Rough number of candidate positions tried along each axis.
const STEPS_PER_AXIS: u32 = 48;

/// Per-pixel saliency: gradient magnitude plus half the chroma spread.
fn saliency_map(img: &DynamicImage) -> (Vec<u32>, u32, u32) {
    let rgb = img.to_rgb8();
    let (w, h) = rgb.dimensions();
    let luma: Vec<i32> = rgb
        .pixels()
        .map(|p| {
            let [r, g, b] = p.0;
            (299 * r as i32 + 587 * g as i32 + 114 * b as i32) / 1000
        })
        .collect();

    let at = |x: u32, y: u32| luma[(y * w + x) as usize];
    let mut map = Vec::with_capacity((w * h) as usize);

    for y in 0..h {
        for x in 0..w {
            let dx = at((x + 1).min(w - 1), y) - at(x.saturating_sub(1), y);
            let dy = at(x, (y + 1).min(h - 1)) - at(x, y.saturating_sub(1));
            let [r, g, b] = rgb.get_pixel(x, y).0;
            let spread = r.max(g).max(b) - r.min(g).min(b);
            map.push(dx.unsigned_abs() + dy.unsigned_abs() + spread as u32 / 2);
        }
    }

    (map, w, h)
}

/// Summed-area table with a zero row and column in front.
fn integral(map: &[u32], w: u32, h: u32) -> Vec<u64> {
    let stride = (w + 1) as usize;
    let mut table = vec![0u64; stride * (h + 1) as usize];
    for y in 0..h as usize {
        let mut row = 0u64;
        for x in 0..w as usize {
            row += map[y * w as usize + x] as u64;
            table[(y + 1) * stride + x + 1] = table[y * stride + x + 1] + row;
        }
    }
    table
}

fn window_sum(table: &[u64], stride: usize, x: u32, y: u32, w: u32, h: u32) -> u64 {
    let (x0, y0) = (x as usize, y as usize);
    let (x1, y1) = (x0 + w as usize, y0 + h as usize);
    table[y1 * stride + x1] + table[y0 * stride + x0]
        - table[y0 * stride + x1]
        - table[y1 * stride + x0]
}

/// Offsets to try along one axis: evenly spaced, always including both ends.
fn positions(spare: u32) -> Vec<u32> {
    let step = (spare / STEPS_PER_AXIS).max(1);
    let mut out: Vec<u32> = (0..=spare).step_by(step as usize).collect();
    if out.last() != Some(&spare) {
        out.push(spare);
    }
    out
}

/// Pick the `width`x`height` window (clamped to the image) with the highest
/// saliency.
pub fn salient_window(img: &DynamicImage, width: u32, height: u32) -> CropRegion {
    let (img_w, img_h) = img.dimensions();
    let width = width.min(img_w);
    let height = height.min(img_h);

    if (width == img_w && height == img_h) || width == 0 || height == 0 {
        return CropRegion {
            left: 0,
            top: 0,
            width,
            height,
        };
    }

    let (map, w, h) = saliency_map(img);
    let table = integral(&map, w, h);
    let stride = (w + 1) as usize;

    let spare_w = img_w - width;
    let spare_h = img_h - height;
    let center = (spare_w as i64, spare_h as i64);

    let mut best = (0u64, i64::MAX, 0u32, 0u32);
    for &top in &positions(spare_h) {
        for &left in &positions(spare_w) {
            let score = window_sum(&table, stride, left, top, width, height);
            // Doubled coordinates keep the center distance integral.
            let distance = (2 * left as i64 - center.0).abs() + (2 * top as i64 - center.1).abs();
            if score > best.0 || (score == best.0 && distance < best.1) {
                best = (score, distance, left, top);
            }
        }
    }

    CropRegion {
        left: best.2,
        top: best.3,
        width,
        height,
    }
}
