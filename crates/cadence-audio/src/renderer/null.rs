//! Renderer without a device.
//!
//! Staged audio drains in real time against a monotonic clock, so the
//! engine paces and reports progress exactly as it would with hardware.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::time::{Duration, Instant};

use cadence_core::{EngineConfig, Error, Format, Frame, Result};
use tracing::debug;

use super::{Renderer, VolumeControl};

/// Staging capacity never drops below this many bytes.
const MIN_CAPACITY: usize = 64 * 1024;

/// Device-less renderer that plays silence at real-time speed.
pub struct NullRenderer {
    format: Format,
    volume: VolumeControl,
    buffer_secs: f64,
    capacity: usize,
    /// Bytes staged and not yet "played".
    queued: f64,
    /// End PTS of the last queued frame.
    last_pts: f64,
    /// Set while the clock runs.
    started_at: Option<Instant>,
    paused: bool,
}

impl NullRenderer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            format: Format::default(),
            volume: VolumeControl::new(config.initial_volume),
            buffer_secs: config.buffer_secs,
            capacity: MIN_CAPACITY,
            queued: 0.0,
            last_pts: 0.0,
            started_at: None,
            paused: false,
        }
    }

    /// Bytes still staged once the elapsed wall-clock time is accounted for.
    fn remaining(&self) -> f64 {
        match self.started_at {
            Some(start) => {
                let played = start.elapsed().as_secs_f64() * self.format.bytes_per_second() as f64;
                (self.queued - played).max(0.0)
            }
            None => self.queued,
        }
    }

    /// Fold elapsed time into `queued` and restart the clock.
    fn settle(&mut self) {
        self.queued = self.remaining();
        if self.started_at.is_some() {
            self.started_at = Some(Instant::now());
        }
    }
}

impl Renderer for NullRenderer {
    fn set_format(&mut self, format: Format) -> Result<()> {
        if !format.is_configured() || format == self.format {
            return Ok(());
        }

        self.stop(false)?;
        self.format = format;
        self.capacity =
            ((self.buffer_secs * format.bytes_per_second() as f64) as usize).max(MIN_CAPACITY);
        debug!("Null renderer configured for {format}");
        Ok(())
    }

    fn format(&self) -> Format {
        self.format
    }

    fn play(&mut self) -> Result<()> {
        if !self.format.is_configured() {
            return Err(Error::FormatNotSet);
        }
        self.settle();
        self.started_at = Some(Instant::now());
        self.paused = false;
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.settle();
        self.started_at = None;
        self.paused = true;
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        if self.paused {
            self.play()?;
        }
        Ok(())
    }

    fn stop(&mut self, drain: bool) -> Result<()> {
        if drain && self.started_at.is_some() {
            std::thread::sleep(Duration::from_secs_f64(
                self.buffer_duration().min(self.buffer_secs),
            ));
        }
        self.queued = 0.0;
        self.last_pts = 0.0;
        self.started_at = None;
        self.paused = false;
        Ok(())
    }

    fn set_volume(&mut self, volume: u32) {
        self.volume.set_volume(volume);
    }

    fn volume(&self) -> u32 {
        self.volume.volume()
    }

    fn set_mute(&mut self, mute: bool) {
        self.volume.set_mute(mute);
    }

    fn is_muted(&self) -> bool {
        self.volume.is_muted()
    }

    fn is_playing(&self) -> bool {
        self.started_at.is_some()
    }

    fn has_buffer_space(&self, size: usize) -> bool {
        !self.paused && self.remaining() + size as f64 <= self.capacity as f64
    }

    fn buffer_duration(&self) -> f64 {
        self.format.duration_of(self.remaining() as usize)
    }

    fn flush_buffers(&mut self) -> Result<()> {
        self.settle();
        Ok(())
    }

    fn queue_frame(&mut self, frame: &Frame) -> Result<()> {
        if !self.format.is_configured() {
            return Err(Error::FormatNotSet);
        }

        self.settle();
        let free = self.capacity.saturating_sub(self.queued.ceil() as usize);
        if frame.data_size() > free {
            return Err(Error::BufferOverflow {
                requested: frame.data_size(),
                free,
            });
        }

        self.queued += frame.data_size() as f64;
        self.last_pts = frame.pts() + self.format.duration_of(frame.data_size());
        Ok(())
    }

    fn current_pts(&self) -> f64 {
        (self.last_pts - self.buffer_duration()).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn renderer() -> NullRenderer {
        let config = EngineConfig {
            backend: "null".to_string(),
            buffer_secs: 0.5,
            ..EngineConfig::default()
        };
        NullRenderer::new(&config)
    }

    /// Half a second of 8 kHz mono 16-bit audio.
    fn half_second(pts: f64) -> Frame {
        Frame::from_data(vec![0; 8_000], pts)
    }

    #[test]
    fn test_queue_requires_format() {
        let mut renderer = renderer();
        assert!(matches!(
            renderer.queue_frame(&half_second(0.0)),
            Err(Error::FormatNotSet)
        ));
        assert!(matches!(renderer.play(), Err(Error::FormatNotSet)));
    }

    #[test]
    fn test_sentinel_format_ignored() {
        let mut renderer = renderer();
        renderer.set_format(Format::default()).unwrap();
        assert!(!renderer.format().is_configured());
    }

    #[test]
    fn test_pts_accounts_for_buffered_audio() {
        let mut renderer = renderer();
        renderer.set_format(Format::new(16, 8_000, 1)).unwrap();

        renderer.queue_frame(&half_second(3.0)).unwrap();
        assert!((renderer.buffer_duration() - 0.5).abs() < 1e-9);
        assert!((renderer.current_pts() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_paused_has_no_space() {
        let mut renderer = renderer();
        renderer.set_format(Format::new(16, 8_000, 1)).unwrap();
        assert!(renderer.has_buffer_space(1024));

        renderer.play().unwrap();
        renderer.pause().unwrap();
        assert!(!renderer.has_buffer_space(1024));
        assert!(!renderer.is_playing());

        renderer.resume().unwrap();
        assert!(renderer.is_playing());
    }

    #[test]
    fn test_overflow_rejected() {
        let mut renderer = renderer();
        renderer.set_format(Format::new(16, 8_000, 1)).unwrap();

        // Capacity is the 64 KiB floor, 4 seconds at this rate.
        for i in 0..8 {
            renderer.queue_frame(&half_second(f64::from(i) * 0.5)).unwrap();
        }
        assert!(!renderer.has_buffer_space(8_000));
        assert!(matches!(
            renderer.queue_frame(&half_second(4.0)),
            Err(Error::BufferOverflow { requested: 8_000, .. })
        ));
    }

    #[test]
    fn test_playback_drains_in_real_time() {
        let mut renderer = renderer();
        renderer.set_format(Format::new(16, 8_000, 1)).unwrap();
        renderer.queue_frame(&half_second(0.0)).unwrap();
        renderer.play().unwrap();

        std::thread::sleep(Duration::from_millis(100));
        renderer.flush_buffers().unwrap();
        assert!(renderer.buffer_duration() < 0.45);
        assert!(renderer.current_pts() > 0.05);
    }

    #[test]
    fn test_stop_drops_audio() {
        let mut renderer = renderer();
        renderer.set_format(Format::new(16, 8_000, 1)).unwrap();
        renderer.queue_frame(&half_second(1.0)).unwrap();

        renderer.stop(false).unwrap();
        assert!(renderer.buffer_duration().abs() < f64::EPSILON);
        assert!(renderer.current_pts().abs() < f64::EPSILON);
    }
}
