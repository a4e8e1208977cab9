//! Transport codec for masks and images
//!
//! Masks travel as base64-encoded PNGs. The encoder writes a 4-channel
//! bitmap with the same 0/255 value in red, green, blue and alpha, so a
//! client can overlay the payload directly: opaque white inside the mask,
//! fully transparent outside. The decoder accepts that form or a plain
//! grayscale image, with or without a `data:...;base64,` prefix.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{DynamicImage, ExtendedColorType, GrayImage, ImageEncoder, Luma, RgbImage};

use super::types::{BinaryMask, MaskError};

/// A decoded pixel is in the mask iff its value is above this threshold.
pub const MASK_THRESHOLD: u8 = 0;

/// Threshold used when masks are decoded for the local compositing fallback.
///
/// Kept above the primary threshold so speckle left by lossy recompression
/// of a mask does not get painted.
pub const FALLBACK_MASK_THRESHOLD: u8 = 128;

/// Above this pixel count the transport image is sent as JPEG instead of PNG
const TRANSPORT_JPEG_PIXELS: u64 = 2000 * 2000;
const TRANSPORT_JPEG_QUALITY: u8 = 85;

/// Output formats for encoded images
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    /// JPEG with a quality in 1..=100
    Jpeg(u8),
}

/// Encode a mask as a base64 RGBA PNG
pub fn encode(mask: &BinaryMask) -> Result<String, MaskError> {
    let mut rgba = Vec::with_capacity(mask.as_slice().len() * 4);
    for &bit in mask.as_slice() {
        let v = if bit { 255 } else { 0 };
        rgba.extend_from_slice(&[v, v, v, v]);
    }

    let mut buffer = Vec::new();
    PngEncoder::new(&mut buffer)
        .write_image(&rgba, mask.width(), mask.height(), ExtendedColorType::Rgba8)
        .map_err(|e| MaskError::Encode(format!("PNG encoding failed: {}", e)))?;

    Ok(BASE64_STANDARD.encode(buffer))
}

/// Decode a transport mask with the primary threshold
pub fn decode(payload: &str) -> Result<BinaryMask, MaskError> {
    decode_with_threshold(payload, MASK_THRESHOLD)
}

/// Decode a transport mask; a pixel is set iff its luma is above `threshold`
pub fn decode_with_threshold(payload: &str, threshold: u8) -> Result<BinaryMask, MaskError> {
    let image = load_mask_image(payload)?;
    Ok(BinaryMask::from_luma(&image.to_luma8(), threshold))
}

/// Decode a transport mask and nearest-neighbor resize it to `width`x`height`
pub fn decode_fitted(
    payload: &str,
    width: u32,
    height: u32,
    threshold: u8,
) -> Result<BinaryMask, MaskError> {
    let mask = decode_with_threshold(payload, threshold)?;
    Ok(fit(mask, width, height))
}

/// Decode a mask for the local compositing fallback, fitted to `width`x`height`
///
/// Only the first channel is tested (red for color payloads), against
/// [`FALLBACK_MASK_THRESHOLD`].
pub fn decode_fallback(payload: &str, width: u32, height: u32) -> Result<BinaryMask, MaskError> {
    let rgb = load_mask_image(payload)?.to_rgb8();
    let first = GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        Luma([rgb.get_pixel(x, y).0[0]])
    });
    let mask = BinaryMask::from_luma(&first, FALLBACK_MASK_THRESHOLD);
    Ok(fit(mask, width, height))
}

fn load_mask_image(payload: &str) -> Result<DynamicImage, MaskError> {
    let bytes = decode_base64(payload)?;
    image::load_from_memory(&bytes)
        .map_err(|e| MaskError::Decode(format!("invalid mask image: {}", e)))
}

fn fit(mask: BinaryMask, width: u32, height: u32) -> BinaryMask {
    if mask.dimensions() == (width, height) {
        return mask;
    }
    tracing::debug!(
        "Resizing mask from {}x{} to {}x{}",
        mask.width(),
        mask.height(),
        width,
        height
    );
    mask.resized(width, height)
}

/// Strip an optional data-URI prefix and base64-decode the remainder
pub fn decode_base64(payload: &str) -> Result<Vec<u8>, MaskError> {
    BASE64_STANDARD
        .decode(strip_data_uri(payload))
        .map_err(|e| MaskError::Decode(format!("invalid base64: {}", e)))
}

fn strip_data_uri(payload: &str) -> &str {
    let payload = payload.trim();
    if payload.starts_with("data:")
        && let Some((_, data)) = payload.split_once(',')
    {
        return data;
    }
    payload
}

/// Decode a base64 image payload into opaque RGB
pub fn decode_image(payload: &str) -> Result<RgbImage, MaskError> {
    let bytes = decode_base64(payload)?;
    let image = image::load_from_memory(&bytes)
        .map_err(|e| MaskError::Decode(format!("invalid image: {}", e)))?;
    Ok(image.into_rgb8())
}

/// Encode an RGB image in the requested format
pub fn encode_image_bytes(image: &RgbImage, format: ImageFormat) -> Result<Vec<u8>, MaskError> {
    let mut buffer = Vec::new();
    let result = match format {
        ImageFormat::Png => PngEncoder::new(&mut buffer).write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgb8,
        ),
        ImageFormat::Jpeg(quality) => JpegEncoder::new_with_quality(&mut buffer, quality)
            .write_image(
                image.as_raw(),
                image.width(),
                image.height(),
                ExtendedColorType::Rgb8,
            ),
    };
    result.map_err(|e| MaskError::Encode(format!("{:?} encoding failed: {}", format, e)))?;
    Ok(buffer)
}

/// Encode an RGB image as a base64 PNG
pub fn encode_png(image: &RgbImage) -> Result<String, MaskError> {
    Ok(BASE64_STANDARD.encode(encode_image_bytes(image, ImageFormat::Png)?))
}

/// Encode the image sent to clients and the oracle: PNG, or JPEG for large images
pub fn encode_transport_image(image: &RgbImage) -> Result<String, MaskError> {
    let pixels = image.width() as u64 * image.height() as u64;
    let format = if pixels > TRANSPORT_JPEG_PIXELS {
        ImageFormat::Jpeg(TRANSPORT_JPEG_QUALITY)
    } else {
        ImageFormat::Png
    };
    Ok(BASE64_STANDARD.encode(encode_image_bytes(image, format)?))
}
