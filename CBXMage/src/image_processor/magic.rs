//! Image format detection using magic headers (file signatures)
//!
//! Detection only looks at the first bytes of the data, so it is cheap
//! enough to run before every decode. It backs the fallback decoder (which
//! forces the sniffed format instead of trusting the guesser) and the
//! (format, mode) dispatch used to pick an animation route.
//!
//! ## Supported Formats
//!
//! - **JPEG**: `FF D8 FF`
//! - **PNG**: `89 50 4E 47 0D 0A 1A 0A`
//! - **GIF**: `47 49 46 38` (GIF87a/GIF89a)
//! - **BMP**: `42 4D`
//! - **TIFF**: `49 49 2A 00` or `4D 4D 00 2A`
//! - **ICO**: `00 00 01 00`
//! - **WebP**: `RIFF .... WEBP`
//! - **AVIF**: `ftyp` box with an `avif`/`avis` brand

use crate::utils::error::{MageError, Result};

const PNG_SIGNATURE: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Represents a detected image format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Bmp,
    Tiff,
    Ico,
    WebP,
    Avif,
}

impl ImageFormat {
    /// Get format name as string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "JPEG",
            Self::Png => "PNG",
            Self::Gif => "GIF",
            Self::Bmp => "BMP",
            Self::Tiff => "TIFF",
            Self::Ico => "ICO",
            Self::WebP => "WebP",
            Self::Avif => "AVIF",
        }
    }

    /// The matching `image` crate format
    pub fn to_image_format(self) -> image::ImageFormat {
        match self {
            Self::Jpeg => image::ImageFormat::Jpeg,
            Self::Png => image::ImageFormat::Png,
            Self::Gif => image::ImageFormat::Gif,
            Self::Bmp => image::ImageFormat::Bmp,
            Self::Tiff => image::ImageFormat::Tiff,
            Self::Ico => image::ImageFormat::Ico,
            Self::WebP => image::ImageFormat::WebP,
            Self::Avif => image::ImageFormat::Avif,
        }
    }

    pub fn from_image_format(format: image::ImageFormat) -> Option<Self> {
        match format {
            image::ImageFormat::Jpeg => Some(Self::Jpeg),
            image::ImageFormat::Png => Some(Self::Png),
            image::ImageFormat::Gif => Some(Self::Gif),
            image::ImageFormat::Bmp => Some(Self::Bmp),
            image::ImageFormat::Tiff => Some(Self::Tiff),
            image::ImageFormat::Ico => Some(Self::Ico),
            image::ImageFormat::WebP => Some(Self::WebP),
            image::ImageFormat::Avif => Some(Self::Avif),
            _ => None,
        }
    }
}

/// Pixel storage mode declared by the container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelMode {
    /// Indexed color (GIF, PNG colour type 3)
    Palette,
    Gray,
    GrayAlpha,
    Rgb,
    Rgba,
    /// Not declared in a header we read
    Unknown,
}

/// How an animated source is turned into frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnimationRoute {
    /// Iterate the primary decoder's frame sequence
    Native,
    /// Rebuild every frame on a running canvas from raw frame deltas
    Composited,
}

/// (format, mode) pairs whose primary animated decode path is not trusted
const ANIMATION_ROUTES: &[((ImageFormat, PixelMode), AnimationRoute)] = &[(
    (ImageFormat::Gif, PixelMode::Palette),
    AnimationRoute::Composited,
)];

impl AnimationRoute {
    pub fn for_source(format: ImageFormat, mode: PixelMode) -> Self {
        ANIMATION_ROUTES
            .iter()
            .find(|(key, _)| *key == (format, mode))
            .map(|(_, route)| *route)
            .unwrap_or(AnimationRoute::Native)
    }
}

fn is_avif_brand(brand: &[u8]) -> bool {
    brand == b"avif" || brand == b"avis"
}

/// Walk ISO-BMFF boxes looking for an `ftyp` box with an AVIF brand
fn has_avif_ftyp(data: &[u8]) -> bool {
    let limit = data.len().min(4096);
    let mut cursor = 0usize;

    while cursor + 8 <= limit {
        let size = u32::from_be_bytes([
            data[cursor],
            data[cursor + 1],
            data[cursor + 2],
            data[cursor + 3],
        ]) as usize;
        let (header, end) = match size {
            1 if cursor + 16 <= limit => {
                let mut large = [0u8; 8];
                large.copy_from_slice(&data[cursor + 8..cursor + 16]);
                (16usize, cursor.saturating_add(u64::from_be_bytes(large) as usize))
            }
            s if s >= 8 => (8usize, cursor.saturating_add(s)),
            _ => return false,
        };
        if end > limit || end < cursor + header {
            return false;
        }

        if &data[cursor + 4..cursor + 8] == b"ftyp" {
            let body = &data[cursor + header..end];
            // major brand, minor version, then compatible brands
            let major = body.get(0..4).is_some_and(is_avif_brand);
            let compatible = body
                .get(8..)
                .is_some_and(|brands| brands.chunks_exact(4).any(is_avif_brand));
            return major || compatible;
        }
        cursor = end;
    }
    false
}

/// Detect image format from magic bytes
///
/// # Examples
/// ```
/// use cbxmage::image_processor::magic::{detect_image_format, ImageFormat};
///
/// let format = detect_image_format(b"GIF89a\x01\x00\x01\x00").unwrap();
/// assert_eq!(format, ImageFormat::Gif);
/// ```
pub fn detect_image_format(data: &[u8]) -> Result<ImageFormat> {
    const MIN_BYTES: usize = 4;
    if data.len() < MIN_BYTES {
        return Err(MageError::Decode(format!(
            "Insufficient data for format detection (need {} bytes, got {})",
            MIN_BYTES,
            data.len()
        )));
    }

    let format = if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        ImageFormat::Jpeg
    } else if data.starts_with(PNG_SIGNATURE) {
        ImageFormat::Png
    } else if data.starts_with(b"GIF8") {
        ImageFormat::Gif
    } else if data.starts_with(b"BM") {
        ImageFormat::Bmp
    } else if data.starts_with(b"II*\0") || data.starts_with(b"MM\0*") {
        ImageFormat::Tiff
    } else if data.starts_with(&[0x00, 0x00, 0x01, 0x00]) {
        ImageFormat::Ico
    } else if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        ImageFormat::WebP
    } else if data.len() >= 16 && has_avif_ftyp(data) {
        ImageFormat::Avif
    } else {
        return Err(MageError::Decode(format!(
            "Unrecognized image format (first 16 bytes: {:02X?})",
            &data[..data.len().min(16)]
        )));
    };

    Ok(format)
}

/// Pixel mode from the container header, without decoding
pub fn detect_pixel_mode(data: &[u8], format: ImageFormat) -> PixelMode {
    match format {
        // GIF frames are always indexed
        ImageFormat::Gif => PixelMode::Palette,
        // IHDR is the first chunk: colour type at byte 8 + 8 + 9
        ImageFormat::Png => match data.get(25) {
            Some(0) => PixelMode::Gray,
            Some(2) => PixelMode::Rgb,
            Some(3) => PixelMode::Palette,
            Some(4) => PixelMode::GrayAlpha,
            Some(6) => PixelMode::Rgba,
            _ => PixelMode::Unknown,
        },
        _ => PixelMode::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JPEG_HEADER: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46];

    /// PNG signature + IHDR for a 1x1 RGB image
    const PNG_HEADER: &[u8] = &[
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
        0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x02, 0x00, 0x00, 0x00,
    ];

    const WEBP_HEADER: &[u8] = b"RIFF\x00\x00\x00\x00WEBPVP8 ";

    const AVIF_HEADER: &[u8] = b"\x00\x00\x00\x18ftypavif\x00\x00\x00\x00mif1miaf";

    #[test]
    fn test_detect_common_formats() {
        assert_eq!(detect_image_format(JPEG_HEADER).unwrap(), ImageFormat::Jpeg);
        assert_eq!(detect_image_format(PNG_HEADER).unwrap(), ImageFormat::Png);
        assert_eq!(
            detect_image_format(b"GIF87a\x01\x00\x01\x00").unwrap(),
            ImageFormat::Gif
        );
        assert_eq!(
            detect_image_format(&[0x42, 0x4D, 0x46, 0x00]).unwrap(),
            ImageFormat::Bmp
        );
        assert_eq!(detect_image_format(WEBP_HEADER).unwrap(), ImageFormat::WebP);
    }

    #[test]
    fn test_detect_tiff_both_endians() {
        assert_eq!(
            detect_image_format(&[0x49, 0x49, 0x2A, 0x00, 0x08]).unwrap(),
            ImageFormat::Tiff
        );
        assert_eq!(
            detect_image_format(&[0x4D, 0x4D, 0x00, 0x2A, 0x00]).unwrap(),
            ImageFormat::Tiff
        );
    }

    #[test]
    fn test_detect_ico() {
        let format = detect_image_format(&[0x00, 0x00, 0x01, 0x00, 0x01, 0x00]).unwrap();
        assert_eq!(format, ImageFormat::Ico);
        assert_eq!(format.as_str(), "ICO");
    }

    #[test]
    fn test_detect_avif_major_and_compatible_brand() {
        assert_eq!(detect_image_format(AVIF_HEADER).unwrap(), ImageFormat::Avif);

        let compatible = b"\x00\x00\x00\x1cftypmif1\x00\x00\x00\x00mif1avifmiaf";
        assert_eq!(detect_image_format(compatible).unwrap(), ImageFormat::Avif);
    }

    #[test]
    fn test_insufficient_and_unknown_data() {
        assert!(detect_image_format(&[]).is_err());
        assert!(detect_image_format(&[0xFF, 0xD8]).is_err());
        assert!(matches!(
            detect_image_format(b"This is not an image file"),
            Err(MageError::Decode(_))
        ));
    }

    #[test]
    fn test_image_format_mapping() {
        for format in [
            ImageFormat::Jpeg,
            ImageFormat::Png,
            ImageFormat::Gif,
            ImageFormat::Bmp,
            ImageFormat::Tiff,
            ImageFormat::Ico,
            ImageFormat::WebP,
            ImageFormat::Avif,
        ] {
            assert_eq!(
                ImageFormat::from_image_format(format.to_image_format()),
                Some(format)
            );
        }
        assert_eq!(ImageFormat::from_image_format(image::ImageFormat::Qoi), None);
    }

    #[test]
    fn test_pixel_mode() {
        assert_eq!(
            detect_pixel_mode(b"GIF89a", ImageFormat::Gif),
            PixelMode::Palette
        );
        assert_eq!(detect_pixel_mode(PNG_HEADER, ImageFormat::Png), PixelMode::Rgb);

        let mut palette = PNG_HEADER.to_vec();
        palette[25] = 3;
        assert_eq!(detect_pixel_mode(&palette, ImageFormat::Png), PixelMode::Palette);
        assert_eq!(detect_pixel_mode(JPEG_HEADER, ImageFormat::Jpeg), PixelMode::Unknown);
    }

    #[test]
    fn test_animation_routes() {
        assert_eq!(
            AnimationRoute::for_source(ImageFormat::Gif, PixelMode::Palette),
            AnimationRoute::Composited
        );
        assert_eq!(
            AnimationRoute::for_source(ImageFormat::Png, PixelMode::Palette),
            AnimationRoute::Native
        );
        assert_eq!(
            AnimationRoute::for_source(ImageFormat::WebP, PixelMode::Unknown),
            AnimationRoute::Native
        );
    }
}
