//! PCM format descriptor.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Describes the PCM data a decoder produces and a renderer consumes.
///
/// The all-zero default is the "not configured yet" sentinel. Renderers
/// ignore it.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Format {
    /// Bits per sample (16, 24, 32).
    pub bits: u32,
    /// Sample rate in Hz.
    pub rate: u32,
    /// Number of interleaved channels.
    pub num_channels: u32,
    /// Samples per channel in one codec packet (0 when variable/unknown).
    pub frames_per_packet: u32,
    /// Samples are IEEE floats rather than signed integers.
    pub floating_point: bool,
}

impl Format {
    pub const fn new(bits: u32, rate: u32, num_channels: u32) -> Self {
        Self {
            bits,
            rate,
            num_channels,
            frames_per_packet: 0,
            floating_point: false,
        }
    }

    /// 32-bit float samples.
    pub const fn float(rate: u32, num_channels: u32) -> Self {
        Self {
            bits: 32,
            rate,
            num_channels,
            frames_per_packet: 0,
            floating_point: true,
        }
    }

    pub const fn with_frames_per_packet(mut self, frames_per_packet: u32) -> Self {
        self.frames_per_packet = frames_per_packet;
        self
    }

    /// Whether a renderer can be configured with this format.
    pub const fn is_configured(&self) -> bool {
        self.rate > 0 && self.num_channels > 0
    }

    /// Bytes used to store one sample of one channel.
    ///
    /// 24-bit samples are stored in 32-bit containers.
    pub const fn bytes_per_sample(&self) -> usize {
        match self.bits {
            0 => 0,
            1..=8 => 1,
            9..=16 => 2,
            _ => 4,
        }
    }

    /// Bytes used by one sample of every channel.
    pub const fn frame_size(&self) -> usize {
        self.bytes_per_sample() * self.num_channels as usize
    }

    pub const fn bytes_per_second(&self) -> usize {
        self.frame_size() * self.rate as usize
    }

    /// Playback duration in seconds of `bytes` bytes of PCM in this format.
    pub fn duration_of(&self, bytes: usize) -> f64 {
        let per_second = self.bytes_per_second();
        if per_second == 0 {
            return 0.0;
        }
        bytes as f64 / per_second as f64
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-bit {} {} Hz, {} channels",
            self.bits,
            if self.floating_point { "float" } else { "int" },
            self.rate,
            self.num_channels
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_sentinel() {
        assert!(!Format::default().is_configured());
        assert!(!Format::new(16, 0, 2).is_configured());
        assert!(!Format::new(16, 44100, 0).is_configured());
        assert!(Format::new(16, 44100, 2).is_configured());
    }

    #[test]
    fn test_sizes() {
        let cd = Format::new(16, 44100, 2);
        assert_eq!(cd.frame_size(), 4);
        assert_eq!(cd.bytes_per_second(), 176_400);
        assert!((cd.duration_of(176_400 / 2) - 0.5).abs() < f64::EPSILON);

        let packed24 = Format::new(24, 48000, 2);
        assert_eq!(packed24.bytes_per_sample(), 4);

        let float = Format::float(48000, 1);
        assert_eq!(float.frame_size(), 4);
        assert!(float.floating_point);
    }

    #[test]
    fn test_equality() {
        let a = Format::float(48000, 2).with_frames_per_packet(1152);
        let b = Format::float(48000, 2).with_frames_per_packet(1152);
        assert_eq!(a, b);
        assert_ne!(a, Format::float(44100, 2).with_frames_per_packet(1152));
        assert_ne!(Format::new(32, 48000, 2), Format::float(48000, 2));
    }

    #[test]
    fn test_duration_of_unconfigured() {
        assert!(Format::default().duration_of(1000).abs() < f64::EPSILON);
    }
}
