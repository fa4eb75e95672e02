//! Container-level metadata that decoders do not surface
//!
//! The `image` crate decodes pixels and frames but drops a few header
//! fields a page viewer needs: whether the file is animated at all, how
//! often the animation repeats and which background color it declares.
//! These are read straight from the RIFF (WebP), chunk (PNG) and logical
//! screen (GIF) structures.

use super::magic::ImageFormat;
use std::io::Cursor;

/// Background color as declared by the source format
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackgroundDecl {
    /// Color components, most significant first
    Tuple(Vec<u16>),
    /// Palette index or gray level, kept as declared
    Index(u32),
}

impl BackgroundDecl {
    /// Pack into a single integer
    ///
    /// Tuple components are written as two hex digits each, high to low,
    /// and the concatenation is read back as one number. Values that do not
    /// fit in 32 bits pack to 0.
    pub fn pack(&self) -> u32 {
        match self {
            Self::Index(index) => *index,
            Self::Tuple(components) => {
                let hex: String = components.iter().map(|c| format!("{:02x}", c)).collect();
                if hex.is_empty() {
                    return 0;
                }
                u32::from_str_radix(&hex, 16).unwrap_or_else(|_| {
                    tracing::debug!("Background color {} does not fit 32 bits", hex);
                    0
                })
            }
        }
    }
}

/// Animation header fields read from the container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnimationHeader {
    /// The file carries more than one frame
    pub animated: bool,
    /// Declared frame count when the container states one
    pub frame_count: Option<u32>,
    /// The animation repeats
    pub looping: bool,
    pub background: Option<BackgroundDecl>,
}

fn read_u16_le(data: &[u8], at: usize) -> Option<u16> {
    Some(u16::from_le_bytes([*data.get(at)?, *data.get(at + 1)?]))
}

fn read_u16_be(data: &[u8], at: usize) -> Option<u16> {
    Some(u16::from_be_bytes([*data.get(at)?, *data.get(at + 1)?]))
}

fn read_u32_be(data: &[u8], at: usize) -> Option<u32> {
    let bytes = data.get(at..at + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_u32_le(data: &[u8], at: usize) -> Option<u32> {
    let bytes = data.get(at..at + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Iterate PNG chunks as (type, body) pairs, stopping at IEND or bad framing
fn png_chunks(data: &[u8]) -> impl Iterator<Item = ([u8; 4], &[u8])> {
    let mut cursor = 8usize;
    std::iter::from_fn(move || {
        let length = read_u32_be(data, cursor)? as usize;
        let kind: [u8; 4] = data.get(cursor + 4..cursor + 8)?.try_into().ok()?;
        let body_end = length.checked_add(8).and_then(|n| cursor.checked_add(n))?;
        let body = data.get(cursor + 8..body_end)?;
        if &kind == b"IEND" {
            return None;
        }
        // body is followed by the crc
        cursor = body_end.checked_add(4)?;
        Some((kind, body))
    })
}

/// Iterate RIFF sub-chunks of a WebP file as (fourcc, body) pairs
fn riff_chunks(data: &[u8]) -> impl Iterator<Item = ([u8; 4], &[u8])> {
    let mut cursor = 12usize;
    std::iter::from_fn(move || {
        let kind: [u8; 4] = data.get(cursor..cursor + 4)?.try_into().ok()?;
        let length = read_u32_le(data, cursor + 4)? as usize;
        let body_end = length.checked_add(8).and_then(|n| cursor.checked_add(n))?;
        let body = data.get(cursor + 8..body_end)?;
        // chunks are padded to even length
        cursor = body_end.checked_add(length & 1)?;
        Some((kind, body))
    })
}

fn png_header(data: &[u8]) -> AnimationHeader {
    let mut header = AnimationHeader::default();
    let mut colour_type = None;

    for (kind, body) in png_chunks(data) {
        match &kind {
            b"IHDR" => colour_type = body.get(9).copied(),
            b"acTL" => {
                let frames = read_u32_be(body, 0).unwrap_or(0);
                let plays = read_u32_be(body, 4).unwrap_or(1);
                header.frame_count = Some(frames);
                header.animated = frames > 1;
                // 0 plays means forever
                header.looping = plays != 1;
            }
            b"bKGD" => {
                header.background = match (colour_type, body.len()) {
                    (Some(3), 1) => Some(BackgroundDecl::Index(body[0] as u32)),
                    (_, 2) => read_u16_be(body, 0).map(|g| BackgroundDecl::Index(g as u32)),
                    (_, 6) => Some(BackgroundDecl::Tuple(vec![
                        read_u16_be(body, 0).unwrap_or(0),
                        read_u16_be(body, 2).unwrap_or(0),
                        read_u16_be(body, 4).unwrap_or(0),
                    ])),
                    _ => None,
                };
            }
            b"IDAT" => break,
            _ => {}
        }
    }
    header
}

fn webp_header(data: &[u8]) -> AnimationHeader {
    let mut header = AnimationHeader::default();
    let mut frames = 0u32;

    for (kind, body) in riff_chunks(data) {
        match &kind {
            b"VP8X" => {
                // animation flag
                header.animated = body.first().is_some_and(|flags| flags & 0x02 != 0);
            }
            b"ANIM" => {
                // background is stored as B, G, R, A
                if let Some(bgra) = body.get(0..4) {
                    header.background = Some(BackgroundDecl::Tuple(vec![
                        bgra[2] as u16,
                        bgra[1] as u16,
                        bgra[0] as u16,
                        bgra[3] as u16,
                    ]));
                }
                let loops = read_u16_le(body, 4).unwrap_or(0);
                header.looping = loops != 1;
            }
            b"ANMF" => frames += 1,
            _ => {}
        }
    }

    if frames > 0 {
        header.frame_count = Some(frames);
        header.animated = header.animated && frames > 1;
    }
    header
}

fn gif_header(data: &[u8]) -> AnimationHeader {
    let mut header = AnimationHeader::default();
    // logical screen descriptor: width, height, packed flags, background index
    if let Some(&index) = data.get(11) {
        header.background = Some(BackgroundDecl::Index(index as u32));
    }

    // frames are only counted, their LZW data is left compressed
    let mut options = gif::DecodeOptions::new();
    options.set_color_output(gif::ColorOutput::Indexed);
    options.skip_frame_decoding(true);
    let Ok(mut decoder) = options.read_info(Cursor::new(data)) else {
        return header;
    };

    let mut frames = 0u32;
    while let Ok(Some(_)) = decoder.read_next_frame() {
        frames += 1;
    }
    header.frame_count = Some(frames);
    header.animated = frames > 1;
    header.looping = !matches!(decoder.repeat(), gif::Repeat::Finite(0));
    header
}

/// Read animation fields for a sniffed format
///
/// Formats without animation support report a default (static) header.
pub fn read_animation_header(data: &[u8], format: ImageFormat) -> AnimationHeader {
    match format {
        ImageFormat::Png => png_header(data),
        ImageFormat::WebP => webp_header(data),
        ImageFormat::Gif => gif_header(data),
        _ => AnimationHeader::default(),
    }
}

/// Text chunks of a PNG file as (keyword, text) pairs
///
/// Covers tEXt, zTXt and iTXt chunks ahead of the image data. Chunks that
/// fail to decompress are skipped.
pub fn png_text_chunks(data: &[u8]) -> Vec<(String, String)> {
    let mut decoder = png::Decoder::new(Cursor::new(data));
    decoder.set_ignore_text_chunk(false);
    let reader = match decoder.read_info() {
        Ok(reader) => reader,
        Err(e) => {
            tracing::debug!("PNG text chunks unavailable: {}", e);
            return Vec::new();
        }
    };

    let info = reader.info();
    let mut chunks = Vec::new();
    for chunk in &info.uncompressed_latin1_text {
        chunks.push((chunk.keyword.clone(), chunk.text.clone()));
    }
    for chunk in &info.compressed_latin1_text {
        if let Ok(text) = chunk.get_text() {
            chunks.push((chunk.keyword.clone(), text));
        }
    }
    for chunk in &info.utf8_text {
        if let Ok(text) = chunk.get_text() {
            chunks.push((chunk.keyword.clone(), text));
        }
    }
    chunks
}
