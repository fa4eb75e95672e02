///! Configuration for image containers
///!
///! Defaults can be overridden from the environment
use crate::image_processor::resizer::ResizeFilter;
use crate::image_processor::transform::CheckerPattern;
use std::str::FromStr;

const THUMBNAIL_SIZE_VAR: &str = "CBXMAGE_THUMBNAIL_SIZE";
const THUMBNAIL_FILTER_VAR: &str = "CBXMAGE_THUMBNAIL_FILTER";
const CHECKER_SIZE_VAR: &str = "CBXMAGE_CHECKER_SIZE";
const MAX_PIXELS_VAR: &str = "CBXMAGE_MAX_PIXELS";

/// Settings shared by every [`Mage`](crate::Mage) built from them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MageConfig {
    /// Maximum thumbnail width in pixels
    pub thumbnail_max_width: u32,

    /// Maximum thumbnail height in pixels
    pub thumbnail_max_height: u32,

    /// Resize algorithm for thumbnails
    /// Default: Triangle (fast path)
    pub thumbnail_filter: ResizeFilter,

    /// Resize algorithm a new container starts with
    pub default_filter: ResizeFilter,

    /// Checkerboard cell size in pixels
    pub checker_size: u32,

    /// Checkerboard colors (packed RGBA)
    pub checker_colors: (u32, u32),

    /// Decoded images above this many pixels are rejected (0 disables)
    pub max_decoded_pixels: u64,
}

impl Default for MageConfig {
    fn default() -> Self {
        let checker = CheckerPattern::default();
        Self {
            thumbnail_max_width: 128,
            thumbnail_max_height: 128,
            thumbnail_filter: ResizeFilter::Triangle,
            default_filter: ResizeFilter::Lanczos3,
            checker_size: checker.size,
            checker_colors: checker.colors,
            max_decoded_pixels: 256 * 1024 * 1024,
        }
    }
}

impl MageConfig {
    /// Defaults overlaid with `CBXMAGE_*` environment variables
    ///
    /// Missing or unparsable values keep the default.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some((width, height)) = read_setting(&lookup, THUMBNAIL_SIZE_VAR, parse_size) {
            config.thumbnail_max_width = width;
            config.thumbnail_max_height = height;
        }
        if let Some(filter) = read_setting(&lookup, THUMBNAIL_FILTER_VAR, |v| {
            ResizeFilter::from_str(v).ok()
        }) {
            config.thumbnail_filter = filter;
        }
        if let Some(size) = read_setting(&lookup, CHECKER_SIZE_VAR, |v| {
            v.parse::<u32>().ok().filter(|&s| s > 0)
        }) {
            config.checker_size = size;
        }
        if let Some(max) = read_setting(&lookup, MAX_PIXELS_VAR, |v| v.parse::<u64>().ok()) {
            config.max_decoded_pixels = max;
        }

        config
    }

    /// Checkerboard used for the checkered cache background
    pub fn checker(&self) -> CheckerPattern {
        CheckerPattern {
            size: self.checker_size,
            colors: self.checker_colors,
        }
    }
}

fn read_setting<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    let raw = lookup(key)?;
    let parsed = parse(raw.trim());
    if parsed.is_none() {
        tracing::debug!("Ignoring {}={:?}, keeping default", key, raw);
    }
    parsed
}

/// Parse `WxH` (also accepts `X` and `*` as separator)
fn parse_size(value: &str) -> Option<(u32, u32)> {
    let (width, height) = value.split_once(['x', 'X', '*'])?;
    let width = width.trim().parse::<u32>().ok()?;
    let height = height.trim().parse::<u32>().ok()?;
    if width == 0 || height == 0 {
        return None;
    }
    Some((width, height))
}
