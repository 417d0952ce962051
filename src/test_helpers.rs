//! Shared test utilities: synthetic encoded images built in memory.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let bytes = with_exif_orientation(&jpeg_bytes(40, 20), 6);
//! let img = engine.decode(&bytes, ImageFormat::Jpeg, 1).unwrap();
//! assert_eq!(engine.orientation(&img), 6);
//! ```

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage, Rgba, RgbaImage};

/// Smooth red/green gradient with a blue diagonal, so crops are distinguishable.
pub fn gradient_rgb(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            if x == y { 255 } else { 0 },
        ])
    })
}

/// Left half opaque red, right half fully transparent.
pub fn half_transparent_rgba(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, _| {
        if x < width / 2 {
            Rgba([255, 0, 0, 255])
        } else {
            Rgba([0, 0, 0, 0])
        }
    })
}

pub fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(gradient_rgb(width, height))
        .write_with_encoder(JpegEncoder::new_with_quality(&mut buf, 90))
        .unwrap();
    buf
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    encode_png(DynamicImage::ImageRgb8(gradient_rgb(width, height)))
}

pub fn png_alpha_bytes(width: u32, height: u32) -> Vec<u8> {
    encode_png(DynamicImage::ImageRgba8(half_transparent_rgba(width, height)))
}

pub fn grey_png_bytes(width: u32, height: u32) -> Vec<u8> {
    encode_png(DynamicImage::ImageLuma8(GrayImage::from_fn(
        width,
        height,
        |x, _| Luma([(x % 256) as u8]),
    )))
}

fn encode_png(img: DynamicImage) -> Vec<u8> {
    let mut buf = Vec::new();
    img.write_with_encoder(PngEncoder::new(&mut buf)).unwrap();
    buf
}

/// Splice a minimal EXIF APP1 segment carrying `orientation` after the SOI marker.
pub fn with_exif_orientation(jpeg: &[u8], orientation: u8) -> Vec<u8> {
    assert_eq!(&jpeg[..2], &[0xFF, 0xD8], "not a JPEG");

    let mut exif = Vec::new();
    exif.extend_from_slice(b"Exif\0\0");
    // Big-endian TIFF header, first IFD at offset 8
    exif.extend_from_slice(&[b'M', b'M', 0x00, 0x2A, 0x00, 0x00, 0x00, 0x08]);
    // One entry: tag 0x0112 (Orientation), SHORT, count 1
    exif.extend_from_slice(&[0x00, 0x01]);
    exif.extend_from_slice(&[0x01, 0x12, 0x00, 0x03, 0x00, 0x00, 0x00, 0x01]);
    exif.extend_from_slice(&[0x00, orientation, 0x00, 0x00]);
    // No next IFD
    exif.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);

    let len = (exif.len() + 2) as u16;
    let mut out = Vec::with_capacity(jpeg.len() + exif.len() + 4);
    out.extend_from_slice(&jpeg[..2]);
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(&exif);
    out.extend_from_slice(&jpeg[2..]);
    out
}
