//! Pure Rust engine built on the `image` crate.
//!
//! ## Crate mapping
//!
//! | Primitive | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, WEBP, GIF) | `image::ImageReader` + `ImageDecoder::orientation` |
//! | Shrink-on-load | integer downscale right after decode (`Triangle`) |
//! | Resize | `DynamicImage::resize_exact` with `Lanczos3` |
//! | Rotate / flip / crop | `rotate90`/`rotate180`/`rotate270`, `fliph`, `crop_imm` |
//! | Premultiply | manual pass over an `Rgba32F` buffer |
//! | Smart crop | [`salient_window`](super::smartcrop::salient_window) |
//! | Encode → JPEG | `JpegEncoder::new_with_quality` |
//! | Encode → PNG | `PngEncoder` |
//! | Encode → WEBP | `webp::Encoder::encode_simple` (lossy, at the requested quality) |
//!
//! GIF is decode-only.
//!
//! Decoded pixels are held behind an `Arc` and cached in a
//! [`DecodeCache`], so the handle returned by `decode` may share its buffer
//! with the cache. Every transform here writes into a fresh buffer, and
//! [`copy_memory`](ImageEngine::copy_memory) detaches a handle from the cache.

use super::decode_cache::{CacheStats, DecodeCache, cache_key};
use super::engine::{Capabilities, EngineError, ImageEngine};
use super::params::{Angle, BandFormat, ColorInterpretation, CropRegion};
use super::smartcrop::salient_window;
use crate::config::EngineConfig;
use crate::options::{ImageFormat, Quality};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, ImageDecoder, ImageReader, Rgba32FImage};
use std::io::Cursor;
use std::sync::Arc;
use tracing::{debug, trace};

/// Decoded image handle.
#[derive(Debug, Clone)]
pub struct RustImage {
    pixels: Arc<DynamicImage>,
    orientation: u8,
}

impl RustImage {
    fn new(pixels: DynamicImage, orientation: u8) -> Self {
        Self {
            pixels: Arc::new(pixels),
            orientation,
        }
    }

    /// Same orientation tag, new pixels.
    fn with_pixels(&self, pixels: DynamicImage) -> Self {
        Self::new(pixels, self.orientation)
    }

    pub fn pixels(&self) -> &DynamicImage {
        &self.pixels
    }

    /// Whether this handle is the only owner of its pixel buffer.
    pub fn is_exclusive(&self) -> bool {
        Arc::strong_count(&self.pixels) == 1
    }
}

/// Production engine. One instance serves every worker thread.
pub struct RustEngine {
    cache: DecodeCache<RustImage>,
    smart_crop: bool,
}

fn codec_format(format: ImageFormat) -> image::ImageFormat {
    match format {
        ImageFormat::Jpeg => image::ImageFormat::Jpeg,
        ImageFormat::Png => image::ImageFormat::Png,
        ImageFormat::Webp => image::ImageFormat::WebP,
        ImageFormat::Gif => image::ImageFormat::Gif,
    }
}

/// Lossy WEBP through libwebp; the `image` crate only writes lossless.
fn encode_webp(pixels: &DynamicImage, quality: Quality) -> Result<Vec<u8>, EngineError> {
    let quality = f32::from(quality.value());
    let encoded = if pixels.color().has_alpha() {
        let rgba = pixels.to_rgba8();
        webp::Encoder::from_rgba(&rgba, rgba.width(), rgba.height()).encode_simple(false, quality)
    } else {
        let rgb = pixels.to_rgb8();
        webp::Encoder::from_rgb(&rgb, rgb.width(), rgb.height()).encode_simple(false, quality)
    };
    encoded
        .map(|memory| memory.to_vec())
        .map_err(|e| EngineError::Encode(format!("webp: {e:?}")))
}

fn band_format(color: ColorType) -> BandFormat {
    match color {
        ColorType::L16 | ColorType::La16 | ColorType::Rgb16 | ColorType::Rgba16 => {
            BandFormat::U16
        }
        ColorType::Rgb32F | ColorType::Rgba32F => BandFormat::F32,
        _ => BandFormat::U8,
    }
}

impl RustEngine {
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        if config.cache_max_mem == 0 || config.cache_max_entries == 0 {
            return Err(EngineError::Init(
                "decode cache budgets must be non-zero".into(),
            ));
        }
        debug!(
            cache_max_mem = config.cache_max_mem,
            cache_max_entries = config.cache_max_entries,
            smart_crop = config.smart_crop,
            "engine initialized"
        );
        Ok(Self {
            cache: DecodeCache::new(config.cache_max_mem, config.cache_max_entries),
            smart_crop: config.smart_crop,
        })
    }

    /// Release cached decode buffers.
    pub fn shutdown(&self) {
        debug!(entries = self.cache.len(), "releasing decode cache");
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn decode_source(&self, data: &[u8], format: ImageFormat) -> Result<RustImage, EngineError> {
        let reader = ImageReader::with_format(Cursor::new(data), codec_format(format));
        let mut decoder = reader
            .into_decoder()
            .map_err(|e| EngineError::Decode(e.to_string()))?;
        let orientation = decoder
            .orientation()
            .map(|o| o.to_exif())
            .unwrap_or_default();
        let pixels =
            DynamicImage::from_decoder(decoder).map_err(|e| EngineError::Decode(e.to_string()))?;
        Ok(RustImage::new(pixels, orientation))
    }
}

impl ImageEngine for RustEngine {
    type Handle = RustImage;

    fn capabilities(&self) -> Capabilities {
        let decode = ImageFormat::ALL
            .into_iter()
            .filter(|f| codec_format(*f).reading_enabled())
            .collect();
        let encode = ImageFormat::ALL
            .into_iter()
            .filter(|f| *f != ImageFormat::Gif && codec_format(*f).writing_enabled())
            .collect();
        Capabilities {
            decode,
            encode,
            smart_crop: self.smart_crop,
        }
    }

    fn decode(
        &self,
        data: &[u8],
        format: ImageFormat,
        shrink: u32,
    ) -> Result<RustImage, EngineError> {
        let shrink = shrink.max(1);
        let key = cache_key(data, format, shrink);
        if let Some(hit) = self.cache.get(&key) {
            trace!(%format, shrink, "decode cache hit");
            return Ok(RustImage::clone(&hit));
        }

        let image = if shrink == 1 {
            self.decode_source(data, format)?
        } else {
            let full = self.decode(data, format, 1)?;
            let (w, h) = (full.pixels.width(), full.pixels.height());
            full.with_pixels(full.pixels.resize_exact(
                w.div_ceil(shrink),
                h.div_ceil(shrink),
                FilterType::Triangle,
            ))
        };

        let size = image.pixels.as_bytes().len();
        self.cache.insert(key, Arc::new(image.clone()), size);
        Ok(image)
    }

    fn encode(
        &self,
        image: &RustImage,
        format: ImageFormat,
        quality: Quality,
    ) -> Result<Vec<u8>, EngineError> {
        let pixels = image.pixels();
        let mut buf = Vec::new();
        let result = match format {
            ImageFormat::Jpeg => {
                let encoder = JpegEncoder::new_with_quality(&mut buf, quality.value());
                DynamicImage::ImageRgb8(pixels.to_rgb8()).write_with_encoder(encoder)
            }
            ImageFormat::Png => {
                let encoder = PngEncoder::new(&mut buf);
                if band_format(pixels.color()) == BandFormat::F32 {
                    DynamicImage::ImageRgba16(pixels.to_rgba16()).write_with_encoder(encoder)
                } else {
                    pixels.write_with_encoder(encoder)
                }
            }
            ImageFormat::Webp => return encode_webp(pixels, quality),
            ImageFormat::Gif => {
                return Err(EngineError::Encode("gif encoding is not supported".into()));
            }
        };
        result.map_err(|e| EngineError::Encode(e.to_string()))?;
        Ok(buf)
    }

    fn dimensions(&self, image: &RustImage) -> (u32, u32) {
        (image.pixels.width(), image.pixels.height())
    }

    fn orientation(&self, image: &RustImage) -> u8 {
        image.orientation
    }

    fn has_alpha(&self, image: &RustImage) -> bool {
        image.pixels.color().has_alpha()
    }

    fn interpretation(&self, image: &RustImage) -> ColorInterpretation {
        match image.pixels.color() {
            ColorType::L8 | ColorType::La8 => ColorInterpretation::BW,
            ColorType::L16 | ColorType::La16 => ColorInterpretation::Grey16,
            ColorType::Rgb16 | ColorType::Rgba16 => ColorInterpretation::Rgb16,
            ColorType::Rgb32F | ColorType::Rgba32F => ColorInterpretation::ScRgb,
            _ => ColorInterpretation::Srgb,
        }
    }

    fn resize(&self, image: RustImage, scale: f64) -> Result<RustImage, EngineError> {
        if !(scale.is_finite() && scale > 0.0) {
            return Err(EngineError::operation("resize", format!("bad scale {scale}")));
        }
        let (w, h) = self.dimensions(&image);
        let new_w = ((w as f64 * scale).round() as u32).max(1);
        let new_h = ((h as f64 * scale).round() as u32).max(1);
        if (new_w, new_h) == (w, h) {
            return Ok(image);
        }
        Ok(image.with_pixels(
            image
                .pixels
                .resize_exact(new_w, new_h, FilterType::Lanczos3),
        ))
    }

    fn rotate(&self, image: RustImage, angle: Angle) -> Result<RustImage, EngineError> {
        let rotated = match angle {
            Angle::D0 => return Ok(image),
            Angle::D90 => image.pixels.rotate90(),
            Angle::D180 => image.pixels.rotate180(),
            Angle::D270 => image.pixels.rotate270(),
        };
        Ok(image.with_pixels(rotated))
    }

    fn flip_horizontal(&self, image: RustImage) -> Result<RustImage, EngineError> {
        Ok(image.with_pixels(image.pixels.fliph()))
    }

    fn crop(&self, image: RustImage, region: CropRegion) -> Result<RustImage, EngineError> {
        let (w, h) = self.dimensions(&image);
        let fits = region.width > 0
            && region.height > 0
            && region.left.checked_add(region.width).is_some_and(|r| r <= w)
            && region.top.checked_add(region.height).is_some_and(|b| b <= h);
        if !fits {
            return Err(EngineError::operation(
                "crop",
                format!("bad extract area {region} for {w}x{h}"),
            ));
        }
        Ok(image.with_pixels(image.pixels.crop_imm(
            region.left,
            region.top,
            region.width,
            region.height,
        )))
    }

    fn convert_colorspace(
        &self,
        image: RustImage,
        target: ColorInterpretation,
    ) -> Result<RustImage, EngineError> {
        let px = &image.pixels;
        let alpha = px.color().has_alpha();
        let converted = match (target, alpha) {
            (ColorInterpretation::Srgb, true) => DynamicImage::ImageRgba8(px.to_rgba8()),
            (ColorInterpretation::Srgb, false) => DynamicImage::ImageRgb8(px.to_rgb8()),
            (ColorInterpretation::Rgb16, true) => DynamicImage::ImageRgba16(px.to_rgba16()),
            (ColorInterpretation::Rgb16, false) => DynamicImage::ImageRgb16(px.to_rgb16()),
            (ColorInterpretation::BW, true) => DynamicImage::ImageLumaA8(px.to_luma_alpha8()),
            (ColorInterpretation::BW, false) => DynamicImage::ImageLuma8(px.to_luma8()),
            (ColorInterpretation::Grey16, true) => {
                DynamicImage::ImageLumaA16(px.to_luma_alpha16())
            }
            (ColorInterpretation::Grey16, false) => DynamicImage::ImageLuma16(px.to_luma16()),
            (ColorInterpretation::ScRgb, true) => DynamicImage::ImageRgba32F(px.to_rgba32f()),
            (ColorInterpretation::ScRgb, false) => DynamicImage::ImageRgb32F(px.to_rgb32f()),
        };
        Ok(image.with_pixels(converted))
    }

    fn premultiply(&self, image: RustImage) -> Result<(RustImage, BandFormat), EngineError> {
        let format = band_format(image.pixels.color());
        let mut buf = image.pixels.to_rgba32f();
        for px in buf.pixels_mut() {
            let a = px.0[3];
            for c in &mut px.0[..3] {
                *c *= a;
            }
        }
        Ok((image.with_pixels(DynamicImage::ImageRgba32F(buf)), format))
    }

    fn unpremultiply(&self, image: RustImage, format: BandFormat) -> Result<RustImage, EngineError> {
        let DynamicImage::ImageRgba32F(premultiplied) = image.pixels.as_ref() else {
            return Err(EngineError::operation(
                "unpremultiply",
                format!("expected premultiplied float image, got {:?}", image.pixels.color()),
            ));
        };

        let mut buf: Rgba32FImage = premultiplied.clone();
        for px in buf.pixels_mut() {
            let a = px.0[3];
            if a > 0.0 {
                for c in &mut px.0[..3] {
                    *c = (*c / a).min(1.0);
                }
            }
        }

        let restored = DynamicImage::ImageRgba32F(buf);
        let restored = match format {
            BandFormat::U8 => DynamicImage::ImageRgba8(restored.to_rgba8()),
            BandFormat::U16 => DynamicImage::ImageRgba16(restored.to_rgba16()),
            BandFormat::F32 => restored,
        };
        Ok(image.with_pixels(restored))
    }

    fn smart_crop(&self, image: RustImage, width: u32, height: u32) -> Result<RustImage, EngineError> {
        if !self.smart_crop {
            return Err(EngineError::operation("smartcrop", "disabled"));
        }
        let region = salient_window(&image.pixels, width, height);
        debug!(%region, "salient window");
        self.crop(image, region)
    }

    fn copy_memory(&self, image: RustImage) -> Result<RustImage, EngineError> {
        let RustImage {
            pixels,
            orientation,
        } = image;
        Ok(RustImage::new(Arc::unwrap_or_clone(pixels), orientation))
    }
}
