//! Rotation, scaling and background compositing for page renderings
//!
//! A rendering is built in a fixed order: rotate the source clockwise,
//! resample to the target size, convert to sRGB when the source embeds a
//! colour profile, then composite onto the cache background wherever the
//! source carries alpha.

use super::bitmap::Bitmap;
use super::color::SrgbTransform;
use super::resizer::{self, ResizeFilter};
use crate::utils::error::{MageError, Result};
use image::{imageops, Rgba, RgbaImage};

/// Clockwise rotation of a rendering relative to the original image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Rotation {
    #[default]
    None,
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    /// Normalise any multiple of 90 into the canonical range
    ///
    /// `-90` becomes `Cw270` and `450` becomes `Cw90`. Anything that is not a
    /// multiple of 90 is rejected.
    pub fn from_degrees(degrees: i32) -> Result<Self> {
        if degrees % 90 != 0 {
            return Err(MageError::InvalidRotation(degrees));
        }
        match degrees.rem_euclid(360) {
            0 => Ok(Self::None),
            90 => Ok(Self::Cw90),
            180 => Ok(Self::Cw180),
            _ => Ok(Self::Cw270),
        }
    }

    pub fn degrees(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Cw90 => 90,
            Self::Cw180 => 180,
            Self::Cw270 => 270,
        }
    }

    /// Width and height trade places at 90 and 270 degrees
    pub fn swaps_dimensions(self) -> bool {
        matches!(self, Self::Cw90 | Self::Cw270)
    }

    /// Dimensions of a `(width, height)` source after this rotation
    pub fn apply_to_size(self, (width, height): (u32, u32)) -> (u32, u32) {
        if self.swaps_dimensions() {
            (height, width)
        } else {
            (width, height)
        }
    }
}

impl TryFrom<i32> for Rotation {
    type Error = MageError;

    fn try_from(degrees: i32) -> Result<Self> {
        Self::from_degrees(degrees)
    }
}

/// Background a rendering is composited onto
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheBackground {
    /// Solid packed RGBA color (0xRRGGBBAA)
    Color(u32),
    /// Checkerboard placeholder for transparent regions
    Checkered,
}

impl Default for CacheBackground {
    fn default() -> Self {
        Self::Color(0)
    }
}

/// Checkerboard parameters for [`CacheBackground::Checkered`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckerPattern {
    /// Edge length of one square in pixels
    pub size: u32,
    /// Packed RGBA colors of the even and odd squares
    pub colors: (u32, u32),
}

impl Default for CheckerPattern {
    fn default() -> Self {
        Self {
            size: 16,
            colors: (0x808080FF, 0xCCCCCCFF),
        }
    }
}

impl CheckerPattern {
    fn color_at(&self, x: u32, y: u32) -> [u8; 4] {
        let size = self.size.max(1);
        if ((x / size) + (y / size)) % 2 == 0 {
            unpack_rgba(self.colors.0)
        } else {
            unpack_rgba(self.colors.1)
        }
    }
}

/// Everything a rendering depends on besides the source pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderParams {
    pub rotation: Rotation,
    /// Final size after rotation
    pub size: (u32, u32),
    pub filter: ResizeFilter,
    pub background: CacheBackground,
    pub checker: CheckerPattern,
}

/// Split a packed 0xRRGGBBAA color into channels
pub fn unpack_rgba(color: u32) -> [u8; 4] {
    color.to_be_bytes()
}

/// Rotate clockwise by the given rotation
pub fn rotate(source: &RgbaImage, rotation: Rotation) -> RgbaImage {
    match rotation {
        Rotation::None => source.clone(),
        Rotation::Cw90 => imageops::rotate90(source),
        Rotation::Cw180 => imageops::rotate180(source),
        Rotation::Cw270 => imageops::rotate270(source),
    }
}

/// Blend one pixel over a background pixel (straight alpha, "over" operator)
fn blend_over(src: Rgba<u8>, bg: [u8; 4]) -> Rgba<u8> {
    let sa = src[3] as u32;
    if sa == 255 {
        return src;
    }

    let ba = bg[3] as u32;
    let weight = ba * (255 - sa);
    let den = sa * 255 + weight;
    if den == 0 {
        return Rgba([0, 0, 0, 0]);
    }

    let channel = |s: u8, b: u8| -> u8 {
        let num = s as u32 * sa * 255 + b as u32 * weight;
        ((num + den / 2) / den) as u8
    };

    Rgba([
        channel(src[0], bg[0]),
        channel(src[1], bg[1]),
        channel(src[2], bg[2]),
        ((den + 127) / 255) as u8,
    ])
}

/// Composite an image onto a solid color in place
pub fn apply_background(rgba: &mut RgbaImage, color: u32) {
    let bg = unpack_rgba(color);
    for pixel in rgba.pixels_mut() {
        *pixel = blend_over(*pixel, bg);
    }
}

/// Composite an image onto a checkerboard in place
pub fn apply_checkered(rgba: &mut RgbaImage, pattern: &CheckerPattern) {
    for (x, y, pixel) in rgba.enumerate_pixels_mut() {
        if pixel[3] < 255 {
            *pixel = blend_over(*pixel, pattern.color_at(x, y));
        }
    }
}

/// Build a rendering of `source` for the given parameters
///
/// The background is composited after colour conversion, so it is taken
/// as sRGB.
pub fn render(
    source: &Bitmap,
    params: &RenderParams,
    color: Option<&SrgbTransform>,
) -> Result<Bitmap> {
    let (width, height) = params.size;
    if width == 0 || height == 0 {
        return Err(MageError::InvalidSize { width, height });
    }

    let rotated = rotate(source.as_rgba(), params.rotation);
    let mut scaled = if rotated.dimensions() == params.size {
        rotated
    } else {
        resizer::resize_image(&rotated, width, height, params.filter)?
    };
    if let Some(color) = color {
        color.apply(&mut scaled);
    }

    if !source.has_alpha() {
        return Ok(Bitmap::with_alpha_flag(scaled, false));
    }

    match params.background {
        CacheBackground::Color(color) => apply_background(&mut scaled, color),
        CacheBackground::Checkered => apply_checkered(&mut scaled, &params.checker),
    }
    Ok(Bitmap::from_rgba(scaled))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(rotation: Rotation, size: (u32, u32)) -> RenderParams {
        RenderParams {
            rotation,
            size,
            filter: ResizeFilter::Triangle,
            background: CacheBackground::default(),
            checker: CheckerPattern::default(),
        }
    }

    /// 3x2 image with a distinct color per pixel
    fn marked_image() -> RgbaImage {
        let mut img = RgbaImage::new(3, 2);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            *pixel = Rgba([x as u8 * 10, y as u8 * 10, 0, 255]);
        }
        img
    }

    #[test]
    fn test_rotation_normalisation() {
        assert_eq!(Rotation::from_degrees(0).unwrap(), Rotation::None);
        assert_eq!(Rotation::from_degrees(90).unwrap(), Rotation::Cw90);
        assert_eq!(Rotation::from_degrees(-90).unwrap(), Rotation::Cw270);
        assert_eq!(Rotation::from_degrees(450).unwrap(), Rotation::Cw90);
        assert_eq!(Rotation::from_degrees(-360).unwrap(), Rotation::None);
        assert_eq!(Rotation::try_from(180).unwrap().degrees(), 180);
    }

    #[test]
    fn test_rotation_rejects_non_right_angles() {
        assert!(matches!(
            Rotation::from_degrees(45),
            Err(MageError::InvalidRotation(45))
        ));
        assert!(Rotation::from_degrees(-1).is_err());
        assert!(Rotation::from_degrees(271).is_err());
    }

    #[test]
    fn test_rotation_size() {
        assert_eq!(Rotation::Cw90.apply_to_size((3, 2)), (2, 3));
        assert_eq!(Rotation::Cw180.apply_to_size((3, 2)), (3, 2));
        assert_eq!(Rotation::Cw270.apply_to_size((3, 2)), (2, 3));
    }

    #[test]
    fn test_rotate_clockwise() {
        let img = marked_image();
        let rotated = rotate(&img, Rotation::Cw90);
        assert_eq!(rotated.dimensions(), (2, 3));
        // Bottom-left of the source becomes top-left after a clockwise turn
        assert_eq!(rotated.get_pixel(0, 0), img.get_pixel(0, 1));
        assert_eq!(rotated.get_pixel(1, 0), img.get_pixel(0, 0));

        let half = rotate(&img, Rotation::Cw180);
        assert_eq!(half.get_pixel(0, 0), img.get_pixel(2, 1));
    }

    #[test]
    fn test_apply_background_opaque_untouched() {
        let mut img = RgbaImage::from_pixel(1, 1, Rgba([255, 0, 0, 255]));
        apply_background(&mut img, 0xFFFFFFFF);
        assert_eq!(img.get_pixel(0, 0), &Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_apply_background_transparent_becomes_background() {
        let mut img = RgbaImage::from_pixel(1, 1, Rgba([255, 0, 0, 0]));
        apply_background(&mut img, 0x102030FF);
        assert_eq!(img.get_pixel(0, 0), &Rgba([0x10, 0x20, 0x30, 255]));
    }

    #[test]
    fn test_apply_background_half_alpha() {
        let mut img = RgbaImage::from_pixel(1, 1, Rgba([255, 0, 0, 128]));
        apply_background(&mut img, 0xFFFFFFFF);
        let pixel = img.get_pixel(0, 0);
        assert_eq!(pixel[0], 255);
        assert!(pixel[1] > 120 && pixel[1] < 135);
        assert_eq!(pixel[3], 255);
    }

    #[test]
    fn test_transparent_background_keeps_source() {
        let mut img = RgbaImage::from_pixel(1, 1, Rgba([40, 50, 60, 100]));
        apply_background(&mut img, 0);
        assert_eq!(img.get_pixel(0, 0), &Rgba([40, 50, 60, 100]));
    }

    #[test]
    fn test_checkered_pattern() {
        let pattern = CheckerPattern {
            size: 2,
            colors: (0x000000FF, 0xFFFFFFFF),
        };
        let mut img = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 0]));
        apply_checkered(&mut img, &pattern);
        assert_eq!(img.get_pixel(0, 0), &Rgba([0, 0, 0, 255]));
        assert_eq!(img.get_pixel(1, 1), &Rgba([0, 0, 0, 255]));
        assert_eq!(img.get_pixel(2, 0), &Rgba([255, 255, 255, 255]));
        assert_eq!(img.get_pixel(0, 3), &Rgba([255, 255, 255, 255]));
        assert_eq!(img.get_pixel(3, 3), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_render_rotates_then_scales() {
        let source = Bitmap::from_rgba(RgbaImage::from_pixel(40, 20, Rgba([9, 9, 9, 255])));
        let out = render(&source, &params(Rotation::Cw90, (10, 20)), None).unwrap();
        assert_eq!(out.dimensions(), (10, 20));
        assert!(!out.has_alpha());
    }

    #[test]
    fn test_render_skips_resize_at_natural_size() {
        let source = Bitmap::from_rgba(marked_image());
        let out = render(&source, &params(Rotation::Cw270, (2, 3)), None).unwrap();
        assert_eq!(out.as_rgba(), &rotate(source.as_rgba(), Rotation::Cw270));
    }

    #[test]
    fn test_render_composites_alpha_sources() {
        let source = Bitmap::from_rgba(RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 0])));
        let mut p = params(Rotation::None, (4, 4));
        p.background = CacheBackground::Color(0x00FF00FF);
        let out = render(&source, &p, None).unwrap();
        assert!(!out.has_alpha());
        assert_eq!(out.as_rgba().get_pixel(2, 2), &Rgba([0, 255, 0, 255]));

        p.background = CacheBackground::Checkered;
        let checkered = render(&source, &p, None).unwrap();
        assert_eq!(checkered.as_rgba().get_pixel(0, 0), &Rgba([0x80, 0x80, 0x80, 255]));
    }

    #[test]
    fn test_render_is_bit_identical() {
        let mut img = RgbaImage::new(33, 21);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            *pixel = Rgba([(x * 7) as u8, (y * 11) as u8, 3, (x * 5 + y) as u8]);
        }
        let source = Bitmap::from_rgba(img);
        let mut p = params(Rotation::Cw90, (9, 14));
        p.background = CacheBackground::Checkered;
        let a = render(&source, &p, None).unwrap();
        let b = render(&source, &p, None).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.pixels(), b.pixels());
    }

    #[test]
    fn test_render_converts_before_compositing() {
        let icc = crate::image_processor::color::tests::linear_rgb_icc();
        let color = SrgbTransform::from_icc(&icc).unwrap();
        let mut img = RgbaImage::from_pixel(4, 4, Rgba([64, 64, 64, 255]));
        img.put_pixel(0, 0, Rgba([0, 0, 0, 0]));
        let source = Bitmap::from_rgba(img);
        let mut p = params(Rotation::None, (4, 4));
        p.background = CacheBackground::Color(0x402010FF);

        let plain = render(&source, &p, None).unwrap();
        let managed = render(&source, &p, Some(&color)).unwrap();
        assert_eq!(plain.as_rgba().get_pixel(2, 2), &Rgba([64, 64, 64, 255]));
        assert!(managed.as_rgba().get_pixel(2, 2)[0] > 120);
        // background is not converted
        assert_eq!(managed.as_rgba().get_pixel(0, 0), &Rgba([0x40, 0x20, 0x10, 255]));
    }

    #[test]
    fn test_render_rejects_zero_size() {
        let source = Bitmap::from_rgba(RgbaImage::new(2, 2));
        assert!(matches!(
            render(&source, &params(Rotation::None, (0, 2)), None),
            Err(MageError::InvalidSize { .. })
        ));
    }
}
