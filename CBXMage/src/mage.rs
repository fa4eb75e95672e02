//! Page image container
//!
//! A [`Mage`] holds two layers:
//!
//! - the **original layer**: the decoded source bitmap, its animation frames
//!   and the metadata that came with them (exif, icc profile, declared
//!   background color, loop flag);
//! - the **derived layer**: a rotated, scaled and background-composited
//!   rendering of the original (and of every frame), built lazily on read.
//!
//! Every mutator documents what it releases. A derived bitmap is never
//! marked stale and kept around: when a parameter it was built from changes,
//! it is released on the spot. Writing a parameter's current value is a
//! no-op.

use crate::config::MageConfig;
use crate::image_processor::bitmap::Bitmap;
use crate::image_processor::color;
use crate::image_processor::decoder::{self, SourceInfo};
use crate::image_processor::magic::ImageFormat;
use crate::image_processor::metadata::{self, ExifMap};
use crate::image_processor::resizer::ResizeFilter;
use crate::image_processor::thumbnail::{self, ThumbnailConfig};
use crate::image_processor::transform::{self, CacheBackground, RenderParams, Rotation};
use crate::utils::error::{MageError, Result};

/// Counters for derived-layer activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Renderings synthesised (a frame sequence counts once)
    pub cache_builds: u64,
    /// Bitmaps released by the container, across both layers
    pub bitmaps_released: u64,
}

/// One decoded page image with its cached rendering
#[derive(Debug)]
pub struct Mage {
    config: MageConfig,

    original: Option<Bitmap>,
    info: SourceInfo,
    frames: Vec<(Bitmap, u32)>,
    looping: bool,
    background_color: u32,
    exif: ExifMap,

    cache: Option<Bitmap>,
    cache_frames: Option<Vec<(Bitmap, u32)>>,
    cache_background: CacheBackground,
    rotation: Rotation,
    filter: ResizeFilter,
    target_size: Option<(u32, u32)>,

    thumbnail: Option<Bitmap>,
    stats: CacheStats,
}

impl Default for Mage {
    fn default() -> Self {
        Self::new()
    }
}

impl Mage {
    pub fn new() -> Self {
        Self::with_config(MageConfig::default())
    }

    pub fn with_config(config: MageConfig) -> Self {
        Self {
            filter: config.default_filter,
            config,
            original: None,
            info: SourceInfo::default(),
            frames: Vec::new(),
            looping: false,
            background_color: 0,
            exif: ExifMap::new(),
            cache: None,
            cache_frames: None,
            cache_background: CacheBackground::default(),
            rotation: Rotation::None,
            target_size: None,
            thumbnail: None,
            stats: CacheStats::default(),
        }
    }

    pub fn config(&self) -> &MageConfig {
        &self.config
    }

    /// Decode `data` into the original layer
    ///
    /// With `enable_animation`, an animated source also fills the frame
    /// sequence, the loop flag and the declared background color. A failed
    /// load leaves the container exactly as it was.
    pub fn load(&mut self, data: &[u8], enable_animation: bool) -> Result<()> {
        let decoded = decoder::decode_image(data, enable_animation, self.config.max_decoded_pixels)?;

        self.set_image_with_info(decoded.image, decoded.info);
        if let Some(animation) = decoded.animation {
            self.frames = animation.frames;
            self.looping = animation.looping;
            self.background_color = animation.background.map(|b| b.pack()).unwrap_or(0);
        }

        tracing::debug!(
            "Loaded {:?} page: {:?}, {} frames, loop {}, background {:#010x}, {} exif tags",
            self.info.format,
            self.original.as_ref().map(Bitmap::dimensions),
            self.frames.len(),
            self.looping,
            self.background_color,
            self.exif.len()
        );
        Ok(())
    }

    /// The original bitmap
    pub fn image(&self) -> Result<&Bitmap> {
        self.original.as_ref().ok_or(MageError::NotLoaded)
    }

    pub fn is_loaded(&self) -> bool {
        self.original.is_some()
    }

    /// Replace the original with a bitmap that carries no metadata
    ///
    /// Same release rules as [`set_image_with_info`](Self::set_image_with_info).
    pub fn set_image(&mut self, image: Bitmap) {
        self.set_image_with_info(image, SourceInfo::default());
    }

    /// Replace the original layer
    ///
    /// Releases the derived layer, the thumbnail, the previous original and
    /// every frame, then reads exif and icc from `info`. The target size is
    /// reset to the new original's size in rendering orientation.
    pub fn set_image_with_info(&mut self, image: Bitmap, mut info: SourceInfo) {
        self.release_original_layer();

        self.exif = metadata::extract_exif(&mut info);
        self.info = info;
        self.target_size = Some(self.rotation.apply_to_size(image.dimensions()));
        self.original = Some(image);
    }

    /// Release both layers and the thumbnail
    pub fn clear(&mut self) {
        self.release_original_layer();
        self.target_size = None;
    }

    fn release_original_layer(&mut self) {
        self.purge_cache();
        self.purge_thumbnail();
        self.purge_frames();
        if let Some(original) = self.original.take() {
            self.release(original);
        }
        self.info = SourceInfo::default();
        self.exif.clear();
        self.looping = false;
        self.background_color = 0;
    }

    fn release(&mut self, bitmap: Bitmap) {
        self.stats.bitmaps_released += 1;
        bitmap.close();
    }

    fn release_all(&mut self, frames: Vec<(Bitmap, u32)>) {
        for (bitmap, _) in frames {
            self.release(bitmap);
        }
    }

    /// Animation frames with their durations in milliseconds
    pub fn frames(&self) -> &[(Bitmap, u32)] {
        &self.frames
    }

    /// Append a frame; the container takes ownership
    ///
    /// Cached frame renderings are released.
    pub fn add_frame(&mut self, bitmap: Bitmap, duration_ms: u32) {
        self.purge_cache_frames();
        self.frames.push((bitmap, duration_ms));
    }

    /// Release every frame, and cached frame renderings with them
    pub fn purge_frames(&mut self) {
        self.purge_cache_frames();
        let frames = std::mem::take(&mut self.frames);
        if !frames.is_empty() {
            tracing::debug!("Releasing {} frames", frames.len());
        }
        self.release_all(frames);
    }

    pub fn is_animated(&self) -> bool {
        !self.frames.is_empty()
    }

    pub fn loop_animation(&self) -> bool {
        self.looping
    }

    /// Packed background color declared by the source, 0 when none
    pub fn background_color(&self) -> u32 {
        self.background_color
    }

    pub fn icc_profile(&self) -> Option<&[u8]> {
        self.info.icc_profile.as_deref()
    }

    pub fn exif(&self) -> &ExifMap {
        &self.exif
    }

    pub fn format(&self) -> Option<ImageFormat> {
        self.info.format
    }

    pub fn source_info(&self) -> &SourceInfo {
        &self.info
    }

    pub fn original_size(&self) -> Result<(u32, u32)> {
        self.image().map(Bitmap::dimensions)
    }

    /// Size the cache is rendered at, after rotation
    pub fn size(&self) -> Option<(u32, u32)> {
        self.target_size
    }

    /// Set the rendering size; a different value releases the derived layer
    pub fn set_size(&mut self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(MageError::InvalidSize { width, height });
        }
        if self.target_size == Some((width, height)) {
            return Ok(());
        }
        self.purge_cache();
        self.target_size = Some((width, height));
        Ok(())
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    /// Set the rotation in degrees (any multiple of 90)
    ///
    /// Other values fail with `InvalidRotation` and change nothing.
    pub fn set_rotation(&mut self, degrees: i32) -> Result<()> {
        let rotation = Rotation::from_degrees(degrees)?;
        self.set_rotation_value(rotation);
        Ok(())
    }

    /// Set the rotation; a different value releases the derived layer
    ///
    /// Turning by a quarter swaps the target size.
    pub fn set_rotation_value(&mut self, rotation: Rotation) {
        if self.rotation == rotation {
            return;
        }
        self.purge_cache();
        if rotation.swaps_dimensions() != self.rotation.swaps_dimensions() {
            self.target_size = self.target_size.map(|(w, h)| (h, w));
        }
        self.rotation = rotation;
    }

    pub fn filter(&self) -> ResizeFilter {
        self.filter
    }

    /// Set the resampling filter; a different value releases the derived layer
    pub fn set_filter(&mut self, filter: ResizeFilter) {
        if self.filter == filter {
            return;
        }
        self.purge_cache();
        self.filter = filter;
    }

    pub fn cache_background(&self) -> CacheBackground {
        self.cache_background
    }

    /// Set the compositing background; a different value releases the derived layer
    pub fn set_cache_background(&mut self, background: CacheBackground) {
        if self.cache_background == background {
            return;
        }
        self.purge_cache();
        self.cache_background = background;
    }

    fn render_params(&self, original: &Bitmap) -> RenderParams {
        RenderParams {
            rotation: self.rotation,
            size: self
                .target_size
                .unwrap_or_else(|| self.rotation.apply_to_size(original.dimensions())),
            filter: self.filter,
            background: self.cache_background,
            checker: self.config.checker(),
        }
    }

    /// The rendering of the original, built on first read
    pub fn cache(&mut self) -> Result<&Bitmap> {
        if self.cache.is_none() {
            let original = self.original.as_ref().ok_or(MageError::NotLoaded)?;
            let params = self.render_params(original);
            let color = color::srgb_transform(self.info.icc_profile.as_deref());
            let rendered = transform::render(original, &params, color.as_ref())?;
            tracing::debug!(
                "Cache built: {:?} -> {:?} (rotation {}, {}, {:?}, icc {})",
                original.dimensions(),
                rendered.dimensions(),
                params.rotation.degrees(),
                params.filter.as_str(),
                params.background,
                color.is_some()
            );
            self.stats.cache_builds += 1;
            self.cache = Some(rendered);
        }
        self.cache.as_ref().ok_or(MageError::NotLoaded)
    }

    /// Renderings of every frame, built on first read
    ///
    /// Empty for a static image.
    pub fn cache_frames(&mut self) -> Result<&[(Bitmap, u32)]> {
        let original = self.original.as_ref().ok_or(MageError::NotLoaded)?;
        if self.cache_frames.is_none() && !self.frames.is_empty() {
            let params = self.render_params(original);
            let color = color::srgb_transform(self.info.icc_profile.as_deref());
            let rendered = self
                .frames
                .iter()
                .map(|(frame, duration)| {
                    transform::render(frame, &params, color.as_ref()).map(|bitmap| (bitmap, *duration))
                })
                .collect::<Result<Vec<_>>>()?;
            tracing::debug!(
                "Frame cache built: {} frames at {:?}",
                rendered.len(),
                params.size
            );
            self.stats.cache_builds += 1;
            self.cache_frames = Some(rendered);
        }
        Ok(self.cache_frames.as_deref().unwrap_or(&[]))
    }

    pub fn has_cache(&self) -> bool {
        self.cache.is_some()
    }

    /// Install a rendering made elsewhere
    ///
    /// Releases the previous cached bitmap only; cached frames are left
    /// alone. The bitmap's size becomes the target size.
    pub fn set_cache(&mut self, bitmap: Bitmap) {
        if let Some(previous) = self.cache.take() {
            self.release(previous);
        }
        self.target_size = Some(bitmap.dimensions());
        self.cache = Some(bitmap);
    }

    /// Install frame renderings made elsewhere, releasing the previous ones
    pub fn set_cache_frames(&mut self, frames: Vec<(Bitmap, u32)>) {
        self.purge_cache_frames();
        self.cache_frames = Some(frames);
    }

    /// Release the cached rendering and cached frames
    pub fn purge_cache(&mut self) {
        if let Some(cache) = self.cache.take() {
            tracing::debug!("Releasing cache {}", cache.id());
            self.release(cache);
        }
        self.purge_cache_frames();
    }

    fn purge_cache_frames(&mut self) {
        if let Some(frames) = self.cache_frames.take() {
            self.release_all(frames);
        }
    }

    /// The list-view thumbnail, built on first read with the configured bounds
    pub fn thumbnail(&mut self) -> Result<&Bitmap> {
        if self.thumbnail.is_none() {
            let config = self.thumbnail_config(
                self.config.thumbnail_max_width,
                self.config.thumbnail_max_height,
            );
            let original = self.original.as_ref().ok_or(MageError::NotLoaded)?;
            self.thumbnail = Some(thumbnail::create_thumbnail(original, &config)?);
        }
        self.thumbnail.as_ref().ok_or(MageError::NotLoaded)
    }

    /// Rebuild the thumbnail within the given bounds
    pub fn thumbnail_with_size(&mut self, max_width: u32, max_height: u32) -> Result<&Bitmap> {
        let config = self.thumbnail_config(max_width, max_height);
        let original = self.original.as_ref().ok_or(MageError::NotLoaded)?;
        let built = thumbnail::create_thumbnail(original, &config)?;
        self.purge_thumbnail();
        let thumbnail: &Bitmap = self.thumbnail.insert(built);
        Ok(thumbnail)
    }

    fn thumbnail_config(&self, max_width: u32, max_height: u32) -> ThumbnailConfig {
        ThumbnailConfig {
            max_width,
            max_height,
            resize_filter: self.config.thumbnail_filter,
            ..Default::default()
        }
    }

    pub fn purge_thumbnail(&mut self) {
        if let Some(thumbnail) = self.thumbnail.take() {
            self.release(thumbnail);
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

impl Drop for Mage {
    fn drop(&mut self) {
        self.clear();
    }
}
