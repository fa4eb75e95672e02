//! CBXMage - page image container for comic book viewers
//!
//! Decodes a page from raw bytes (JPEG, PNG/APNG, GIF, BMP, TIFF, ICO, WebP),
//! keeps its animation frames and exif/icc metadata, and builds rotated,
//! scaled, sRGB-converted and background-composited renderings on demand.
//! Renderings are released as soon as any parameter they were built from
//! changes.
//!
//! ```
//! use cbxmage::{Mage, MageError};
//!
//! let mut mage = Mage::new();
//! assert!(matches!(mage.cache(), Err(MageError::NotLoaded)));
//! ```

pub mod config;
pub mod image_processor;
mod mage;
pub mod process;
mod utils;

pub use config::MageConfig;
pub use image_processor::bitmap::{Bitmap, BitmapId};
pub use image_processor::decoder::SourceInfo;
pub use image_processor::magic::ImageFormat;
pub use image_processor::metadata::ExifMap;
pub use image_processor::resizer::ResizeFilter;
pub use image_processor::transform::{CacheBackground, Rotation};
pub use mage::{CacheStats, Mage};
pub use utils::error::{MageError, Result};

/// Install a `tracing` subscriber filtered by `RUST_LOG`
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
