//! Thumbnail generation
//!
//! The fast path for list and grid views:
//! 1. Calculate target thumbnail size (aspect ratio preserved, no upscaling)
//! 2. Resize the original with the thumbnail filter
//! 3. Composite transparent areas onto an opaque background (white by default)
//!
//! Thumbnails ignore rotation, the page target size, the ICC profile and
//! animation. They are built from the original only.

use super::bitmap::Bitmap;
use super::resizer::{self, ResizeFilter};
use super::transform;
use crate::utils::error::{MageError, Result};

/// Thumbnail generation settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThumbnailConfig {
    pub max_width: u32,
    pub max_height: u32,

    /// Background for transparent images (packed RGBA)
    /// Default: 0xFFFFFFFF - opaque white
    pub background_color: u32,

    /// Default: Triangle/Bilinear
    pub resize_filter: ResizeFilter,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            max_width: 128,
            max_height: 128,
            background_color: 0xFFFF_FFFF,
            resize_filter: ResizeFilter::Triangle,
        }
    }
}

/// Create a thumbnail bitmap from an original
///
/// # Returns
/// * `Ok(Bitmap)` - Opaque thumbnail no larger than the configured bounds
/// * `Err(MageError)` - Zero-sized bounds or a resize failure
pub fn create_thumbnail(original: &Bitmap, config: &ThumbnailConfig) -> Result<Bitmap> {
    if config.max_width == 0 || config.max_height == 0 {
        return Err(MageError::InvalidSize {
            width: config.max_width,
            height: config.max_height,
        });
    }

    let (src_width, src_height) = original.dimensions();
    let (target_width, target_height) = resizer::calculate_thumbnail_size(
        src_width,
        src_height,
        config.max_width,
        config.max_height,
    );

    if target_width == 0 || target_height == 0 {
        return Err(MageError::Image(format!(
            "Invalid thumbnail dimensions ({}x{} into {}x{})",
            src_width, src_height, config.max_width, config.max_height
        )));
    }

    let mut rgba = resizer::resize_image(
        original.as_rgba(),
        target_width,
        target_height,
        config.resize_filter,
    )?;

    if original.has_alpha() {
        transform::apply_background(&mut rgba, config.background_color);
    }

    tracing::debug!(
        "Thumbnail built: {}x{} -> {}x{} ({})",
        src_width,
        src_height,
        target_width,
        target_height,
        config.resize_filter.as_str()
    );
    Ok(Bitmap::from_rgba(rgba))
}
