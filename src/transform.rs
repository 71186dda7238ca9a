pub mod params;
pub mod pool;

pub use pool::TransformPool;

use crate::config::ImageFormat;
use crate::error::ImageError;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, GenericImageView, ImageEncoder};

/// Largest output a resize may produce, in pixels.
pub const MAX_OUTPUT_PIXELS: u64 = 100_000_000;

/// libwebp refuses anything wider or taller than this.
const WEBP_MAX_DIMENSION: u32 = 16383;

/// Decodes raw image bytes into memory-resident representation.
///
/// The format is detected from magic bytes, so the object's stored
/// content type is never trusted.
///
/// # Errors
/// Returns `ImageError::Decode` if the bytes are not a recognizable image
/// or the decoded image has a zero dimension.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, ImageError> {
    let guessed = image::guess_format(bytes)
        .map_err(|e| ImageError::Decode(e.to_string()))?;

    let img = image::load_from_memory_with_format(bytes, guessed)
        .map_err(|e| ImageError::Decode(e.to_string()))?;

    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return Err(ImageError::Decode(format!("degenerate image {}x{}", w, h)));
    }
    Ok(img)
}

/// Scales the image to `width`, keeping the aspect ratio.
///
/// A width of 0 returns the image untouched. The kernel is picked from
/// the direction of the resize: Lanczos3 when shrinking, CatmullRom when
/// enlarging. Height is rounded and never drops below one pixel.
pub fn resize_to_width(img: DynamicImage, width: u32) -> Result<DynamicImage, ImageError> {
    if width == 0 {
        return Ok(img);
    }

    let (orig_w, orig_h) = img.dimensions();
    if orig_w == 0 || orig_h == 0 {
        return Err(ImageError::Resize(format!("source is {}x{}", orig_w, orig_h)));
    }
    if width == orig_w {
        return Ok(img);
    }

    let scale = f64::from(width) / f64::from(orig_w);
    let target_h = (f64::from(orig_h) * scale).round().max(1.0);
    if !target_h.is_finite() || target_h > f64::from(u32::MAX) {
        return Err(ImageError::Resize(format!("target height {} out of range", target_h)));
    }
    let target_h = target_h as u32;

    if u64::from(width) * u64::from(target_h) > MAX_OUTPUT_PIXELS {
        return Err(ImageError::Resize(format!(
            "target {}x{} exceeds {} pixels",
            width, target_h, MAX_OUTPUT_PIXELS
        )));
    }

    let filter = if width < orig_w { FilterType::Lanczos3 } else { FilterType::CatmullRom };
    Ok(img.resize_exact(width, target_h, filter))
}

/// Encodes image to specified format with quality control.
///
/// - **WebP**: lossy encoding via libwebp, alpha kept when present
/// - **JPEG**: RGB, DCT-based lossy compression
/// - **PNG**: lossless, `quality` is accepted and ignored
///
/// Quality is clamped to [1, 100].
pub fn encode_image(
    img: &DynamicImage,
    fmt: ImageFormat,
    quality: u8,
) -> Result<Vec<u8>, ImageError> {
    let mut out = Vec::new();
    let q = quality.clamp(1, 100);

    match fmt {
        ImageFormat::Webp => {
            let (w, h) = img.dimensions();
            if w > WEBP_MAX_DIMENSION || h > WEBP_MAX_DIMENSION {
                return Err(ImageError::Encode(format!(
                    "{}x{} exceeds the webp limit of {}",
                    w, h, WEBP_MAX_DIMENSION
                )));
            }
            if img.color().has_alpha() {
                let rgba = img.to_rgba8();
                let encoded = webp::Encoder::from_rgba(rgba.as_raw(), w, h)
                    .encode_simple(false, f32::from(q))
                    .map_err(|e| ImageError::Encode(format!("webp: {:?}", e)))?;
                out.extend_from_slice(&encoded);
            } else {
                let rgb = img.to_rgb8();
                let encoded = webp::Encoder::from_rgb(rgb.as_raw(), w, h)
                    .encode_simple(false, f32::from(q))
                    .map_err(|e| ImageError::Encode(format!("webp: {:?}", e)))?;
                out.extend_from_slice(&encoded);
            }
        }
        ImageFormat::Jpeg => {
            let rgb = img.to_rgb8();
            let (w, h) = rgb.dimensions();
            let enc = JpegEncoder::new_with_quality(&mut out, q);
            enc.write_image(rgb.as_raw(), w, h, ExtendedColorType::Rgb8)
                .map_err(|e| ImageError::Encode(e.to_string()))?;
        }
        ImageFormat::Png => {
            let enc = PngEncoder::new(&mut out);
            if img.color().has_alpha() {
                let rgba = img.to_rgba8();
                let (w, h) = rgba.dimensions();
                enc.write_image(rgba.as_raw(), w, h, ExtendedColorType::Rgba8)
                    .map_err(|e| ImageError::Encode(e.to_string()))?;
            } else {
                let rgb = img.to_rgb8();
                let (w, h) = rgb.dimensions();
                enc.write_image(rgb.as_raw(), w, h, ExtendedColorType::Rgb8)
                    .map_err(|e| ImageError::Encode(e.to_string()))?;
            }
        }
    }

    if out.is_empty() {
        return Err(ImageError::Encode(format!("{} encoder produced no output", fmt)));
    }
    Ok(out)
}

/// Decode, optionally resize, then encode. The decoded buffer is dropped
/// before returning on every path.
pub fn transform(
    source: &[u8],
    width: u32,
    quality: u8,
    format: ImageFormat,
) -> Result<Vec<u8>, ImageError> {
    let img = decode_image(source)?;
    let resized = resize_to_width(img, width)?;
    encode_image(&resized, format, quality)
}
