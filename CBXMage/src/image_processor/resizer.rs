//! Image resizing with aspect ratio preservation
//!
//! Page renderings and thumbnails are resampled with the fast_image_resize
//! crate. The filter is part of the cache key of a rendering, so it is a
//! small closed enum rather than a free-form string.

use crate::utils::error::{MageError, Result};
use fast_image_resize as fr;
use fast_image_resize::images::Image;
use image::RgbaImage;
use std::str::FromStr;

/// Resampling algorithm used to scale page renderings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResizeFilter {
    /// Nearest neighbour, no interpolation
    Nearest,

    /// Box filter, averages covered source pixels
    Box,

    /// Bilinear filtering (fastest convolution, good quality)
    Triangle,

    /// Catmull-Rom bicubic
    CatmullRom,

    /// Mitchell-Netravali bicubic
    Mitchell,

    /// Lanczos3 filtering (slower, highest quality)
    #[default]
    Lanczos3,
}

impl ResizeFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nearest => "nearest",
            Self::Box => "box",
            Self::Triangle => "triangle",
            Self::CatmullRom => "catmullrom",
            Self::Mitchell => "mitchell",
            Self::Lanczos3 => "lanczos3",
        }
    }

    fn resize_alg(self) -> fr::ResizeAlg {
        match self {
            Self::Nearest => fr::ResizeAlg::Nearest,
            Self::Box => fr::ResizeAlg::Convolution(fr::FilterType::Box),
            Self::Triangle => fr::ResizeAlg::Convolution(fr::FilterType::Bilinear),
            Self::CatmullRom => fr::ResizeAlg::Convolution(fr::FilterType::CatmullRom),
            Self::Mitchell => fr::ResizeAlg::Convolution(fr::FilterType::Mitchell),
            Self::Lanczos3 => fr::ResizeAlg::Convolution(fr::FilterType::Lanczos3),
        }
    }
}

impl FromStr for ResizeFilter {
    type Err = MageError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nearest" => Ok(Self::Nearest),
            "box" => Ok(Self::Box),
            "triangle" | "bilinear" => Ok(Self::Triangle),
            "catmullrom" | "bicubic" => Ok(Self::CatmullRom),
            "mitchell" => Ok(Self::Mitchell),
            "lanczos3" | "lanczos" => Ok(Self::Lanczos3),
            other => Err(MageError::Image(format!("Unknown resize filter: {}", other))),
        }
    }
}

/// Calculate thumbnail dimensions maintaining aspect ratio
///
/// The smaller of the two scale factors wins, images are never upscaled,
/// and the result is at least 1x1 for any non-empty source.
///
/// # Examples
/// ```
/// use cbxmage::image_processor::resizer::calculate_thumbnail_size;
///
/// // Landscape image 1000x500 -> 256x128 (2:1 ratio preserved)
/// assert_eq!(calculate_thumbnail_size(1000, 500, 256, 256), (256, 128));
///
/// // Small image 100x100 -> 100x100 (no upscaling)
/// assert_eq!(calculate_thumbnail_size(100, 100, 256, 256), (100, 100));
/// ```
pub fn calculate_thumbnail_size(
    src_width: u32,
    src_height: u32,
    max_width: u32,
    max_height: u32,
) -> (u32, u32) {
    if src_width == 0 || src_height == 0 {
        return (0, 0);
    }

    let rx = max_width as f32 / src_width as f32;
    let ry = max_height as f32 / src_height as f32;
    let scale = rx.min(ry);

    if scale >= 1.0 {
        return (src_width, src_height);
    }

    let new_width = (src_width as f32 * scale).round() as u32;
    let new_height = (src_height as f32 * scale).round() as u32;

    (new_width.max(1), new_height.max(1))
}

/// Resize image to exact target dimensions
///
/// Returns a copy when the dimensions already match. The resampling is
/// deterministic: identical input and parameters give identical pixels.
pub fn resize_image(
    source: &RgbaImage,
    target_width: u32,
    target_height: u32,
    filter: ResizeFilter,
) -> Result<RgbaImage> {
    let (src_width, src_height) = source.dimensions();

    if target_width == 0 || target_height == 0 {
        return Err(MageError::InvalidSize {
            width: target_width,
            height: target_height,
        });
    }

    if src_width == target_width && src_height == target_height {
        return Ok(source.clone());
    }

    let src_view = Image::from_vec_u8(
        src_width,
        src_height,
        source.as_raw().to_vec(),
        fr::PixelType::U8x4,
    )
    .map_err(|e| MageError::Image(format!("Failed to create source view: {}", e)))?;

    let mut dst_image = Image::new(target_width, target_height, fr::PixelType::U8x4);

    let mut resizer = fr::Resizer::new();
    resizer
        .resize(
            &src_view,
            &mut dst_image,
            &fr::ResizeOptions::new().resize_alg(filter.resize_alg()),
        )
        .map_err(|e| MageError::Image(format!("Resize operation failed: {}", e)))?;

    RgbaImage::from_raw(target_width, target_height, dst_image.into_vec())
        .ok_or_else(|| MageError::Image("Failed to create output image".to_string()))
}
