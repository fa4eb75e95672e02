//! Owned RGBA bitmaps with a stable handle
//!
//! Every decoded, cached or thumbnail image held by a [`Mage`](crate::Mage)
//! is a [`Bitmap`]. Each bitmap carries a process-unique [`BitmapId`] so
//! callers can tell whether a cached rendering was rebuilt or reused, and
//! its pixel buffer is released exactly once: either explicitly through
//! [`Bitmap::close`] or when the value is dropped.

use image::{DynamicImage, RgbaImage};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_BITMAP_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque handle identifying one bitmap allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BitmapId(u64);

impl BitmapId {
    fn next() -> Self {
        Self(NEXT_BITMAP_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BitmapId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Decoded raster image in RGBA8 layout
pub struct Bitmap {
    id: BitmapId,
    pixels: RgbaImage,
    has_alpha: bool,
}

impl Bitmap {
    /// Wrap an RGBA buffer, scanning it for non-opaque pixels
    pub fn from_rgba(pixels: RgbaImage) -> Self {
        let has_alpha = pixels.pixels().any(|p| p[3] < u8::MAX);
        Self::with_alpha_flag(pixels, has_alpha)
    }

    /// Convert a decoded image; the alpha flag follows the source color type
    pub fn from_dynamic(image: DynamicImage) -> Self {
        let has_alpha = image.color().has_alpha();
        Self::with_alpha_flag(image.into_rgba8(), has_alpha)
    }

    pub(crate) fn with_alpha_flag(pixels: RgbaImage, has_alpha: bool) -> Self {
        let id = BitmapId::next();
        tracing::trace!(
            "Bitmap {} allocated: {}x{} (alpha: {})",
            id,
            pixels.width(),
            pixels.height(),
            has_alpha
        );
        Self {
            id,
            pixels,
            has_alpha,
        }
    }

    pub fn id(&self) -> BitmapId {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    /// Raw RGBA bytes, row-major, 4 bytes per pixel
    pub fn pixels(&self) -> &[u8] {
        self.pixels.as_raw()
    }

    pub fn as_rgba(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn has_alpha(&self) -> bool {
        self.has_alpha
    }

    /// Give up the handle and keep the pixel buffer
    pub fn into_rgba(mut self) -> RgbaImage {
        std::mem::take(&mut self.pixels)
    }

    /// Release the pixel buffer now
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for Bitmap {
    fn drop(&mut self) {
        tracing::trace!(
            "Bitmap {} released ({}x{})",
            self.id,
            self.pixels.width(),
            self.pixels.height()
        );
    }
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bitmap")
            .field("id", &self.id)
            .field("width", &self.pixels.width())
            .field("height", &self.pixels.height())
            .field("has_alpha", &self.has_alpha)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba};

    #[test]
    fn test_ids_are_unique() {
        let a = Bitmap::from_rgba(RgbaImage::new(1, 1));
        let b = Bitmap::from_rgba(RgbaImage::new(1, 1));
        assert_ne!(a.id(), b.id());
        assert!(b.id().get() > a.id().get());
    }

    #[test]
    fn test_alpha_scan() {
        let opaque = Bitmap::from_rgba(RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 255])));
        assert!(!opaque.has_alpha());

        let mut buffer = RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 255]));
        buffer.put_pixel(1, 1, Rgba([0, 0, 0, 10]));
        let translucent = Bitmap::from_rgba(buffer);
        assert!(translucent.has_alpha());
    }

    #[test]
    fn test_from_dynamic_rgb_has_no_alpha() {
        let rgb = DynamicImage::ImageRgb8(RgbImage::from_pixel(3, 2, Rgb([9, 8, 7])));
        let bitmap = Bitmap::from_dynamic(rgb);
        assert!(!bitmap.has_alpha());
        assert_eq!(bitmap.dimensions(), (3, 2));
        assert_eq!(bitmap.pixels().len(), 3 * 2 * 4);
        assert_eq!(&bitmap.pixels()[0..4], &[9, 8, 7, 255]);
    }

    #[test]
    fn test_into_rgba_keeps_pixels() {
        let bitmap = Bitmap::from_rgba(RgbaImage::from_pixel(4, 1, Rgba([5, 5, 5, 5])));
        let raw = bitmap.into_rgba();
        assert_eq!(raw.dimensions(), (4, 1));
        assert_eq!(raw.get_pixel(3, 0), &Rgba([5, 5, 5, 5]));
    }

    #[test]
    fn test_debug_output() {
        let bitmap = Bitmap::from_rgba(RgbaImage::new(7, 3));
        let text = format!("{:?}", bitmap);
        assert!(text.contains("width: 7"));
        assert!(text.contains("height: 3"));
    }
}
