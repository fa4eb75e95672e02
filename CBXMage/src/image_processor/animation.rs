//! Animation frame decoding
//!
//! Two routes, chosen by [`AnimationRoute`](super::magic::AnimationRoute):
//!
//! - **native**: the `image` crate's `AnimationDecoder` for GIF, APNG and
//!   WebP. Frames arrive fully composited.
//! - **composited**: the `gif` crate's raw frames, each covering only the
//!   region it changes. Every frame is drawn at its display offset onto a
//!   running canvas, disposal is applied, and the canvas is copied forward
//!   as that frame's bitmap.

use super::magic::ImageFormat;
use crate::utils::error::{MageError, Result};
use image::codecs::gif::GifDecoder;
use image::codecs::png::PngDecoder;
use image::codecs::webp::WebPDecoder;
use image::{AnimationDecoder, Frame, RgbaImage};
use std::io::Cursor;

/// One decoded frame and its display time in milliseconds
pub type RawFrame = (RgbaImage, u32);

/// Frames of an animation plus the repeat flag when the decoder knows it
#[derive(Debug)]
pub struct DecodedFrames {
    pub frames: Vec<RawFrame>,
    pub looping: Option<bool>,
}

fn frame_duration_ms(frame: &Frame) -> u32 {
    let (numer, denom) = frame.delay().numer_denom_ms();
    if denom == 0 {
        0
    } else {
        numer / denom
    }
}

fn collect(frames: Vec<Frame>) -> Vec<RawFrame> {
    frames
        .into_iter()
        .map(|frame| {
            let duration = frame_duration_ms(&frame);
            (frame.into_buffer(), duration)
        })
        .collect()
}

fn animation_error(e: image::ImageError) -> MageError {
    MageError::Decode(format!("Animation decode failed: {}", e))
}

/// Decode every frame through the primary decoder
pub fn decode_native(data: &[u8], format: ImageFormat) -> Result<DecodedFrames> {
    let frames = match format {
        ImageFormat::Gif => GifDecoder::new(Cursor::new(data))
            .and_then(|decoder| decoder.into_frames().collect_frames()),
        ImageFormat::Png => PngDecoder::new(Cursor::new(data))
            .and_then(|decoder| decoder.apng())
            .and_then(|decoder| decoder.into_frames().collect_frames()),
        ImageFormat::WebP => WebPDecoder::new(Cursor::new(data))
            .and_then(|decoder| decoder.into_frames().collect_frames()),
        other => {
            return Err(MageError::Decode(format!(
                "{} has no animation support",
                other.as_str()
            )))
        }
    }
    .map_err(animation_error)?;

    if frames.is_empty() {
        return Err(MageError::Decode("Animation has no frames".to_string()));
    }

    tracing::debug!(
        "Native animation decode: {} frames ({})",
        frames.len(),
        format.as_str()
    );
    Ok(DecodedFrames {
        frames: collect(frames),
        looping: None,
    })
}

/// Blit a frame's RGBA region onto the canvas at its offset
///
/// Fully transparent source pixels leave the canvas untouched.
fn blit(canvas: &mut RgbaImage, frame: &gif::Frame<'_>) {
    let (canvas_width, canvas_height) = canvas.dimensions();
    let width = frame.width as u32;
    let height = frame.height as u32;

    for (i, pixel) in frame.buffer.chunks_exact(4).enumerate() {
        let x = frame.left as u32 + i as u32 % width.max(1);
        let y = frame.top as u32 + i as u32 / width.max(1);
        if y >= frame.top as u32 + height || x >= canvas_width || y >= canvas_height {
            continue;
        }
        if pixel[3] != 0 {
            canvas.put_pixel(x, y, image::Rgba([pixel[0], pixel[1], pixel[2], pixel[3]]));
        }
    }
}

fn clear_region(canvas: &mut RgbaImage, frame: &gif::Frame<'_>) {
    let (canvas_width, canvas_height) = canvas.dimensions();
    let right = (frame.left as u32 + frame.width as u32).min(canvas_width);
    let bottom = (frame.top as u32 + frame.height as u32).min(canvas_height);
    for y in frame.top as u32..bottom {
        for x in frame.left as u32..right {
            canvas.put_pixel(x, y, image::Rgba([0, 0, 0, 0]));
        }
    }
}

/// Rebuild GIF frames on a running canvas
///
/// Frame delays are accumulated into a timeline; each frame keeps its own
/// delay (in milliseconds) as its duration.
pub fn decode_composited(data: &[u8]) -> Result<DecodedFrames> {
    let mut options = gif::DecodeOptions::new();
    options.set_color_output(gif::ColorOutput::RGBA);
    let mut decoder = options
        .read_info(Cursor::new(data))
        .map_err(|e| MageError::Decode(format!("GIF header rejected: {}", e)))?;

    let mut canvas = RgbaImage::new(decoder.width() as u32, decoder.height() as u32);
    let mut frames = Vec::new();
    let mut timeline_ms = 0u64;

    while let Some(frame) = decoder
        .read_next_frame()
        .map_err(|e| MageError::Decode(format!("GIF frame {} rejected: {}", frames.len(), e)))?
    {
        let previous = match frame.dispose {
            gif::DisposalMethod::Previous => Some(canvas.clone()),
            _ => None,
        };

        blit(&mut canvas, frame);

        // delay is in hundredths of a second
        let delay_ms = frame.delay as u32 * 10;
        timeline_ms += delay_ms as u64;
        frames.push((canvas.clone(), delay_ms));

        match frame.dispose {
            gif::DisposalMethod::Background => clear_region(&mut canvas, frame),
            gif::DisposalMethod::Previous => {
                if let Some(previous) = previous {
                    canvas = previous;
                }
            }
            _ => {}
        }
    }

    if frames.is_empty() {
        return Err(MageError::Decode("GIF has no frames".to_string()));
    }

    tracing::debug!(
        "Composited GIF decode: {} frames over {} ms",
        frames.len(),
        timeline_ms
    );
    Ok(DecodedFrames {
        frames,
        looping: Some(!matches!(decoder.repeat(), gif::Repeat::Finite(0))),
    })
}
