//! Colour management for page renderings
//!
//! A page that embeds an ICC profile is converted to sRGB with lcms2 when
//! its cache is built. Thumbnails are made from the unconverted original.

use crate::utils::error::Result;
use image::RgbaImage;
use lcms2::{Intent, PixelFormat, Profile, Transform};

/// Conversion from an embedded profile to sRGB, alpha untouched
pub struct SrgbTransform {
    transform: Transform<[u8; 4], [u8; 4]>,
}

impl std::fmt::Debug for SrgbTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SrgbTransform").finish_non_exhaustive()
    }
}

impl SrgbTransform {
    /// Build a transform from raw ICC bytes
    ///
    /// Fails for data lcms2 cannot parse and for profiles whose colour
    /// space is not RGB (gray or CMYK profiles have no RGBA input form).
    pub fn from_icc(icc: &[u8]) -> Result<Self> {
        let profile = Profile::new_icc(icc)?;
        let transform = Transform::new(
            &profile,
            PixelFormat::RGBA_8,
            &Profile::new_srgb(),
            PixelFormat::RGBA_8,
            Intent::Perceptual,
        )?;
        Ok(Self { transform })
    }

    /// Convert every pixel in place
    pub fn apply(&self, image: &mut RgbaImage) {
        let mut pixels: Vec<[u8; 4]> = image.pixels().map(|p| p.0).collect();
        self.transform.transform_in_place(&mut pixels);
        for (pixel, [r, g, b, _]) in image.pixels_mut().zip(pixels) {
            pixel.0 = [r, g, b, pixel[3]];
        }
    }
}

/// Transform for an optional profile, skipping ones lcms2 rejects
pub fn srgb_transform(icc: Option<&[u8]>) -> Option<SrgbTransform> {
    let icc = icc?;
    match SrgbTransform::from_icc(icc) {
        Ok(transform) => Some(transform),
        Err(e) => {
            tracing::warn!("ICC profile ignored ({} bytes): {}", icc.len(), e);
            None
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::Rgba;
    use lcms2::{CIExyY, CIExyYTRIPLE, ToneCurve};

    /// sRGB primaries with a linear tone curve
    pub(crate) fn linear_rgb_icc() -> Vec<u8> {
        let white = CIExyY { x: 0.3127, y: 0.3290, Y: 1.0 };
        let primaries = CIExyYTRIPLE {
            Red: CIExyY { x: 0.64, y: 0.33, Y: 1.0 },
            Green: CIExyY { x: 0.30, y: 0.60, Y: 1.0 },
            Blue: CIExyY { x: 0.15, y: 0.06, Y: 1.0 },
        };
        let curve = ToneCurve::new(1.0);
        Profile::new_rgb(&white, &primaries, &[&*curve, &*curve, &*curve])
            .unwrap()
            .icc()
            .unwrap()
    }

    #[test]
    fn test_linear_profile_brightens_midtones() {
        let transform = SrgbTransform::from_icc(&linear_rgb_icc()).unwrap();
        let mut image = RgbaImage::from_pixel(2, 2, Rgba([64, 64, 64, 128]));
        transform.apply(&mut image);

        let pixel = image.get_pixel(1, 1);
        // linear 0.25 is about 0.54 in sRGB
        assert!(pixel[0] > 120 && pixel[0] < 150, "got {:?}", pixel);
        assert!(pixel[0].abs_diff(pixel[1]) <= 1 && pixel[1].abs_diff(pixel[2]) <= 1);
        assert_eq!(pixel[3], 128);
    }

    #[test]
    fn test_srgb_profile_keeps_pixels() {
        let srgb = Profile::new_srgb().icc().unwrap();
        let transform = SrgbTransform::from_icc(&srgb).unwrap();
        let mut image = RgbaImage::from_pixel(3, 1, Rgba([10, 128, 240, 255]));
        transform.apply(&mut image);
        for pixel in image.pixels() {
            for (got, want) in pixel.0.iter().zip([10u8, 128, 240]) {
                assert!(got.abs_diff(want) <= 2, "got {:?}", pixel);
            }
        }
    }

    #[test]
    fn test_unusable_profile_is_skipped() {
        assert!(srgb_transform(None).is_none());
        assert!(srgb_transform(Some(b"not an icc profile")).is_none());
        assert!(SrgbTransform::from_icc(&[]).is_err());
    }
}
