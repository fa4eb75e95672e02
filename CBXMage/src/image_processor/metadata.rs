//! EXIF extraction
//!
//! Native path: the raw EXIF block reported by the decoder, parsed with
//! kamadak-exif. Legacy path: PNG files written by ImageMagick and friends
//! carry EXIF as a hex dump in a `Raw profile type exif` text chunk. That
//! dump is validated, decoded back into the source info's raw EXIF slot,
//! and the native path is tried again.
//!
//! Corrupt metadata never fails a load; every problem ends in an empty map.

use super::decoder::SourceInfo;
use std::collections::BTreeMap;

/// EXIF tag number to value, primary image IFD only
pub type ExifMap = BTreeMap<u16, exif::Value>;

const RAW_PROFILE_KEYWORD: &str = "Raw profile type exif";
const EXIF_HEADER: &[u8] = b"Exif\0\0";

fn parse_exif(raw: &[u8]) -> ExifMap {
    let tiff = raw.strip_prefix(EXIF_HEADER).unwrap_or(raw);
    match exif::Reader::new().read_raw(tiff.to_vec()) {
        Ok(parsed) => parsed
            .fields()
            .filter(|field| field.ifd_num == exif::In::PRIMARY)
            .map(|field| (field.tag.number(), field.value.clone()))
            .collect(),
        Err(e) => {
            tracing::debug!("EXIF block rejected: {}", e);
            ExifMap::new()
        }
    }
}

fn native_exif(info: &SourceInfo) -> ExifMap {
    info.exif.as_deref().map(parse_exif).unwrap_or_default()
}

fn hex_value(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        _ => None,
    }
}

fn decode_hex(digits: &str) -> Option<Vec<u8>> {
    let digits = digits.as_bytes();
    if digits.len() % 2 != 0 {
        return None;
    }
    digits
        .chunks_exact(2)
        .map(|pair| Some(hex_value(pair[0])? << 4 | hex_value(pair[1])?))
        .collect()
}

/// Decode a raw profile text block
///
/// Layout: a blank first line, the profile name, the decimal byte count,
/// then lines of hex digits.
pub(crate) fn decode_raw_profile(text: &str) -> Option<Vec<u8>> {
    let mut lines = text.lines();
    let _blank = lines.next()?;
    let name = lines.next()?;
    let size = lines.next()?;

    if name.trim() != "exif" {
        tracing::debug!("Raw profile is labelled {:?}, not exif", name);
        return None;
    }
    let size: usize = size.trim().parse().ok()?;

    let digits: String = lines.map(str::trim).collect();
    let data = decode_hex(&digits)?;
    if data.len() != size {
        tracing::debug!(
            "Raw exif profile size mismatch: declared {}, decoded {}",
            size,
            data.len()
        );
        return None;
    }
    Some(data)
}

/// Extract EXIF tags from a decoded source
///
/// On a successful legacy decode the bytes are stored in `info.exif`.
pub fn extract_exif(info: &mut SourceInfo) -> ExifMap {
    let exif = native_exif(info);
    if !exif.is_empty() {
        return exif;
    }

    let Some(text) = info
        .text
        .iter()
        .find(|(keyword, _)| keyword == RAW_PROFILE_KEYWORD)
        .map(|(_, text)| text.as_str())
    else {
        return ExifMap::new();
    };

    let Some(data) = decode_raw_profile(text) else {
        return ExifMap::new();
    };

    info.exif = Some(data);
    native_exif(info)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Little-endian TIFF block with one IFD0 entry: Orientation (0x0112) = 6
    pub(crate) fn orientation_tiff() -> Vec<u8> {
        let mut data = b"II\x2A\x00".to_vec();
        data.extend_from_slice(&8u32.to_le_bytes());
        data.extend_from_slice(&1u16.to_le_bytes());
        // tag, type SHORT, count 1, value 6
        data.extend_from_slice(&0x0112u16.to_le_bytes());
        data.extend_from_slice(&3u16.to_le_bytes());
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&6u16.to_le_bytes());
        data.extend_from_slice(&[0, 0]);
        // no next IFD
        data.extend_from_slice(&0u32.to_le_bytes());
        data
    }

    /// Text in ImageMagick's raw profile layout
    pub(crate) fn raw_profile(label: &str, data: &[u8], declared: usize) -> String {
        let hex: String = data.iter().map(|b| format!("{:02x}", b)).collect();
        let mut text = format!("\n{}\n{:8}\n", label, declared);
        for line in hex.as_bytes().chunks(72) {
            text.push_str(std::str::from_utf8(line).unwrap());
            text.push('\n');
        }
        text
    }

    fn info_with_text(text: String) -> SourceInfo {
        SourceInfo {
            text: vec![(RAW_PROFILE_KEYWORD.to_string(), text)],
            ..SourceInfo::default()
        }
    }

    #[test]
    fn test_native_exif() {
        let mut info = SourceInfo {
            exif: Some(orientation_tiff()),
            ..SourceInfo::default()
        };
        let exif = extract_exif(&mut info);
        assert_eq!(exif.len(), 1);
        assert_eq!(exif.get(&0x0112).and_then(|v| v.get_uint(0)), Some(6));
    }

    #[test]
    fn test_native_exif_with_app1_header() {
        let mut raw = EXIF_HEADER.to_vec();
        raw.extend(orientation_tiff());
        let mut info = SourceInfo {
            exif: Some(raw),
            ..SourceInfo::default()
        };
        assert!(extract_exif(&mut info).contains_key(&0x0112));
    }

    #[test]
    fn test_legacy_profile_is_reinjected() {
        let tiff = orientation_tiff();
        let mut info = info_with_text(raw_profile("exif", &tiff, tiff.len()));

        let exif = extract_exif(&mut info);
        assert_eq!(exif.get(&0x0112).and_then(|v| v.get_uint(0)), Some(6));
        assert_eq!(info.exif.as_deref(), Some(tiff.as_slice()));
    }

    #[test]
    fn test_legacy_profile_wrong_label() {
        let tiff = orientation_tiff();
        let mut info = info_with_text(raw_profile("iptc", &tiff, tiff.len()));
        assert!(extract_exif(&mut info).is_empty());
        assert!(info.exif.is_none());
    }

    #[test]
    fn test_legacy_profile_size_mismatch() {
        let tiff = orientation_tiff();
        let mut info = info_with_text(raw_profile("exif", &tiff, tiff.len() + 1));
        assert!(extract_exif(&mut info).is_empty());
    }

    #[test]
    fn test_legacy_profile_bad_hex() {
        let mut info = info_with_text("\nexif\n       2\nzz00\n".to_string());
        assert!(extract_exif(&mut info).is_empty());

        let mut odd = info_with_text("\nexif\n       1\nabc\n".to_string());
        assert!(extract_exif(&mut odd).is_empty());
    }

    #[test]
    fn test_legacy_profile_too_short() {
        let mut info = info_with_text("\nexif".to_string());
        assert!(extract_exif(&mut info).is_empty());
    }

    #[test]
    fn test_legacy_profile_valid_hex_but_not_tiff() {
        let mut info = info_with_text(raw_profile("exif", b"garbage!", 8));
        assert!(extract_exif(&mut info).is_empty());
    }

    #[test]
    fn test_no_metadata() {
        let mut info = SourceInfo::default();
        assert!(extract_exif(&mut info).is_empty());
    }

    #[test]
    fn test_decode_hex() {
        assert_eq!(decode_hex("00ff10Ab"), Some(vec![0x00, 0xFF, 0x10, 0xAB]));
        assert_eq!(decode_hex(""), Some(vec![]));
        assert_eq!(decode_hex("0"), None);
        assert_eq!(decode_hex("0g"), None);
    }
}
