//! Image decoding from raw bytes
//!
//! Uses a two-stage decoding strategy:
//! 1. Primary: `image` crate with content-guessed format. Collects the ICC
//!    profile and raw EXIF from the decoder before pixels are decoded.
//! 2. Fallback: the magic-byte sniffed format forced onto the `image` crate
//!    with decode limits removed. Narrower, but accepts data the guesser
//!    rejects. Animation is never decoded through this path.
//!
//! When animation is requested and the container declares several frames,
//! the (format, mode) dispatch in [`magic`](super::magic) picks between the
//! primary decoder's frame iterator and canvas reconstruction.

use super::animation::{self, DecodedFrames};
use super::bitmap::Bitmap;
use super::container::{self, BackgroundDecl};
use super::magic::{self, AnimationRoute, ImageFormat, PixelMode};
use crate::utils::error::{MageError, Result};
use image::{DynamicImage, ImageDecoder, ImageReader};
use std::io::Cursor;

/// Side data of a decoded source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
    pub format: Option<ImageFormat>,
    pub mode: PixelMode,
    pub icc_profile: Option<Vec<u8>>,
    /// Raw EXIF block (TIFF structure, optionally behind an `Exif\0\0` header)
    pub exif: Option<Vec<u8>>,
    /// Textual key/value chunks (PNG tEXt/zTXt/iTXt)
    pub text: Vec<(String, String)>,
}

impl Default for SourceInfo {
    fn default() -> Self {
        Self {
            format: None,
            mode: PixelMode::Unknown,
            icc_profile: None,
            exif: None,
            text: Vec::new(),
        }
    }
}

/// Animation part of a decode
#[derive(Debug)]
pub struct DecodedAnimation {
    /// Every frame, the first included, with its duration in milliseconds
    pub frames: Vec<(Bitmap, u32)>,
    pub background: Option<BackgroundDecl>,
    pub looping: bool,
}

/// Result of a successful decode, not yet attached to a page
#[derive(Debug)]
pub struct DecodedImage {
    pub image: Bitmap,
    pub info: SourceInfo,
    pub animation: Option<DecodedAnimation>,
}

fn check_limits(width: u32, height: u32, max_pixels: u64) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(MageError::Decode(format!(
            "Image has zero dimension: {}x{}",
            width, height
        )));
    }
    let pixels = width as u64 * height as u64;
    if max_pixels > 0 && pixels > max_pixels {
        return Err(MageError::Decode(format!(
            "Image too large: {}x{} ({} pixels, max {})",
            width, height, pixels, max_pixels
        )));
    }
    Ok(())
}

fn decode_primary(data: &[u8], max_pixels: u64) -> Result<(DynamicImage, SourceInfo)> {
    let reader = ImageReader::new(Cursor::new(data))
        .with_guessed_format()
        .map_err(|e| MageError::Decode(format!("Format detection failed: {}", e)))?;

    let format = reader
        .format()
        .ok_or_else(|| MageError::Decode("Unknown image format".to_string()))?;

    let mut decoder = reader
        .into_decoder()
        .map_err(|e| MageError::Decode(format!("No decoder for {:?}: {}", format, e)))?;

    let (width, height) = decoder.dimensions();
    check_limits(width, height, max_pixels)?;

    let icc_profile = decoder.icc_profile().unwrap_or_else(|e| {
        tracing::debug!("ICC profile unreadable: {}", e);
        None
    });
    let exif = decoder.exif_metadata().unwrap_or_else(|e| {
        tracing::debug!("EXIF block unreadable: {}", e);
        None
    });

    let image = DynamicImage::from_decoder(decoder)
        .map_err(|e| MageError::Decode(format!("Failed to decode image: {}", e)))?;

    let format = ImageFormat::from_image_format(format);
    let mode = format
        .map(|f| magic::detect_pixel_mode(data, f))
        .unwrap_or(PixelMode::Unknown);
    let text = match format {
        Some(ImageFormat::Png) => container::png_text_chunks(data),
        _ => Vec::new(),
    };

    Ok((
        image,
        SourceInfo {
            format,
            mode,
            icc_profile,
            exif,
            text,
        },
    ))
}

/// Secondary decoder: forced format, no decode limits, static only
pub fn decode_fallback(data: &[u8], max_pixels: u64) -> Result<(DynamicImage, SourceInfo)> {
    let format = magic::detect_image_format(data)?;

    let mut reader = ImageReader::with_format(Cursor::new(data), format.to_image_format());
    reader.no_limits();
    let image = reader
        .decode()
        .map_err(|e| MageError::Decode(format!("Fallback decode as {} failed: {}", format.as_str(), e)))?;
    check_limits(image.width(), image.height(), max_pixels)?;

    Ok((
        image,
        SourceInfo {
            format: Some(format),
            mode: magic::detect_pixel_mode(data, format),
            ..SourceInfo::default()
        },
    ))
}

fn decode_animation(
    data: &[u8],
    format: ImageFormat,
    mode: PixelMode,
) -> Result<Option<DecodedAnimation>> {
    let header = container::read_animation_header(data, format);
    if !header.animated {
        return Ok(None);
    }

    let route = AnimationRoute::for_source(format, mode);
    tracing::debug!(
        "Animated {} ({:?}), {:?} frames declared, route {:?}",
        format.as_str(),
        mode,
        header.frame_count,
        route
    );

    let DecodedFrames { frames, looping } = match route {
        AnimationRoute::Native => animation::decode_native(data, format)?,
        AnimationRoute::Composited => animation::decode_composited(data)?,
    };

    Ok(Some(DecodedAnimation {
        frames: frames
            .into_iter()
            .map(|(buffer, duration)| (Bitmap::from_rgba(buffer), duration))
            .collect(),
        background: header.background,
        looping: looping.unwrap_or(header.looping),
    }))
}

/// Decode raw bytes into an original image, optionally with its frames
///
/// # Returns
/// * `Ok(DecodedImage)` - `animation` is `Some` only when requested, the
///   source actually has several frames and all of them decoded
/// * `Err(MageError::Decode)` - neither decoder accepted the data
pub fn decode_image(data: &[u8], enable_animation: bool, max_pixels: u64) -> Result<DecodedImage> {
    if data.is_empty() {
        return Err(MageError::Decode("Empty image data".to_string()));
    }

    let (image, info) = match decode_primary(data, max_pixels) {
        Ok(decoded) => decoded,
        Err(primary) => {
            tracing::debug!("Primary decoder failed ({}), trying fallback", primary);
            let (image, info) = decode_fallback(data, max_pixels).map_err(|fallback| {
                MageError::Decode(format!("{}; fallback: {}", primary, fallback))
            })?;
            return Ok(DecodedImage {
                image: Bitmap::from_dynamic(image),
                info,
                animation: None,
            });
        }
    };

    tracing::debug!(
        "Decoded {:?} {}x{} (icc: {}, exif: {})",
        info.format,
        image.width(),
        image.height(),
        info.icc_profile.is_some(),
        info.exif.is_some()
    );

    let animation = match (enable_animation, info.format) {
        (true, Some(format)) => decode_animation(data, format, info.mode).unwrap_or_else(|e| {
            // the still image is usable on its own
            tracing::warn!("Animation dropped, showing a static page: {}", e);
            None
        }),
        _ => None,
    };

    let image = match animation.as_ref().and_then(|a| a.frames.first()) {
        // the original is a separate copy of the first frame
        Some((first, _)) => Bitmap::from_rgba(first.as_rgba().clone()),
        None => Bitmap::from_dynamic(image),
    };

    Ok(DecodedImage {
        image,
        info,
        animation,
    })
}
