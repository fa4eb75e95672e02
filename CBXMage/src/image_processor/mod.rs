//! Image processing for page containers
//!
//! Everything below works on owned [`bitmap::Bitmap`] values; the
//! [`Mage`](crate::Mage) container decides when they are built and released.
//!
//! # Architecture
//!
//! - **magic**: Sniffs format and pixel mode from file signatures, and holds
//!   the (format, mode) dispatch table for animation routes
//! - **container**: Reads animation headers (frame count, loop, background)
//!   and PNG text chunks without decoding pixels
//! - **decoder**: Primary and fallback decoders
//! - **animation**: Native frame iteration and GIF canvas reconstruction
//! - **metadata**: EXIF extraction, including the legacy PNG text profile
//! - **resizer**: Thumbnail size calculation and resampling
//! - **color**: ICC profile to sRGB conversion for cache renderings
//! - **transform**: Rotation, background compositing and cache rendering
//! - **thumbnail**: The fast list-view path, without colour management
//!
//! # Supported Image Formats
//!
//! - JPEG (.jpg, .jpeg, .jpe, .jfif)
//! - PNG (.png), including APNG animation
//! - GIF (.gif), including animation
//! - BMP (.bmp)
//! - WebP (.webp), including animation
//! - TIFF (.tif, .tiff)
//! - ICO (.ico)
//!
//! AVIF is recognised by signature but has no decoder in this build.

pub mod animation;
pub mod bitmap;
pub mod color;
pub mod container;
pub mod decoder;
pub mod magic;
pub mod metadata;
pub mod resizer;
pub mod thumbnail;
pub mod transform;

/// Supported image file extensions
const SUPPORTED_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "jpe", "jfif", // JPEG
    "png",  // PNG
    "apng", // Animated PNG
    "gif",  // GIF
    "bmp",  // BMP
    "webp", // WebP
    "tif", "tiff", // TIFF
    "ico",  // Icon
];

/// Check if a file name has a supported image extension (case-insensitive)
///
/// # Examples
/// ```
/// use cbxmage::image_processor::is_image_file;
///
/// assert!(is_image_file("page001.jpg"));
/// assert!(is_image_file("cover.PNG"));
/// assert!(!is_image_file("readme.txt"));
/// ```
pub fn is_image_file(filename: &str) -> bool {
    std::path::Path::new(filename)
        .extension()
        .and_then(|s| s.to_str())
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}
