//! Conversion of interleaved PCM bytes to f32 samples.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use cadence_core::{Error, Format, Result};

/// Whether [`to_f32`] understands `format`.
pub const fn is_supported(format: &Format) -> bool {
    if format.floating_point {
        format.bits == 32
    } else {
        matches!(format.bits, 8 | 16 | 24 | 32)
    }
}

/// Append the samples in `bytes` to `output` as f32 in [-1, 1].
///
/// Integer PCM is little-endian and signed, except 8-bit which is unsigned.
/// 24-bit samples sit in the low bytes of 32-bit containers.
pub fn to_f32(format: &Format, bytes: &[u8], output: &mut Vec<f32>) -> Result<()> {
    if !is_supported(format) {
        return Err(Error::UnsupportedFormat(format!("PCM {format}")));
    }

    let sample_bytes = format.bytes_per_sample();
    output.reserve(bytes.len() / sample_bytes);

    match (format.floating_point, format.bits) {
        (true, _) => output.extend(
            bytes
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
        ),
        (false, 8) => output.extend(bytes.iter().map(|&b| (f32::from(b) - 128.0) / 128.0)),
        (false, 16) => output.extend(
            bytes
                .chunks_exact(2)
                .map(|b| f32::from(i16::from_le_bytes([b[0], b[1]])) / 32_768.0),
        ),
        (false, 24) => output.extend(bytes.chunks_exact(4).map(|b| {
            // Sign-extend from bit 23.
            let raw = i32::from_le_bytes([b[0], b[1], b[2], b[3]]);
            ((raw << 8) >> 8) as f32 / 8_388_608.0
        })),
        _ => output.extend(
            bytes
                .chunks_exact(4)
                .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f32 / 2_147_483_648.0),
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert(format: Format, bytes: &[u8]) -> Vec<f32> {
        let mut out = Vec::new();
        to_f32(&format, bytes, &mut out).unwrap();
        out
    }

    #[test]
    fn test_s16() {
        let mut bytes = Vec::new();
        for s in [0i16, i16::MIN, 16_384] {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        assert_eq!(convert(Format::new(16, 44_100, 1), &bytes), vec![0.0, -1.0, 0.5]);
    }

    #[test]
    fn test_s24_sign_extension() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0x00FF_FFFFu32.to_le_bytes()); // -1
        bytes.extend_from_slice(&0x0040_0000u32.to_le_bytes()); // 2^22
        let out = convert(Format::new(24, 48_000, 2), &bytes);
        assert!((out[0] + 1.0 / 8_388_608.0).abs() < 1e-9);
        assert!((out[1] - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_f32_passthrough() {
        let mut bytes = Vec::new();
        for s in [0.25f32, -0.75] {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        assert_eq!(convert(Format::float(48_000, 2), &bytes), vec![0.25, -0.75]);
    }

    #[test]
    fn test_u8() {
        assert_eq!(convert(Format::new(8, 8_000, 1), &[128, 0]), vec![0.0, -1.0]);
    }

    #[test]
    fn test_unsupported() {
        let mut out = Vec::new();
        let double = Format {
            bits: 64,
            floating_point: true,
            ..Format::float(48_000, 2)
        };
        assert!(matches!(
            to_f32(&double, &[0; 8], &mut out),
            Err(Error::UnsupportedFormat(_))
        ));
        assert!(!is_supported(&Format::new(12, 48_000, 2)));
    }
}
