//! Sample rate conversion for devices that cannot run at a track's rate.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use cadence_core::{Error, Result};
use rubato::{FftFixedIn, Resampler};
use tracing::debug;

/// Input frames per conversion chunk.
const CHUNK_FRAMES: usize = 1024;

/// Streaming converter over interleaved f32 samples.
///
/// Input is collected per channel until a full chunk is available, so
/// output lags input by up to one chunk.
pub struct RateConverter {
    inner: FftFixedIn<f32>,
    input_rate: u32,
    output_rate: u32,
    channels: usize,
    pending: Vec<Vec<f32>>,
}

impl RateConverter {
    pub fn new(input_rate: u32, output_rate: u32, channels: usize) -> Result<Self> {
        if channels == 0 {
            return Err(Error::InvalidArgument(
                "rate converter needs at least one channel".to_string(),
            ));
        }

        let inner = FftFixedIn::new(
            input_rate as usize,
            output_rate as usize,
            CHUNK_FRAMES,
            2,
            channels,
        )
        .map_err(|e| Error::AudioOutput(format!("Failed to create resampler: {e}")))?;

        debug!("Converting {input_rate}Hz -> {output_rate}Hz, {channels} channels");

        Ok(Self {
            inner,
            input_rate,
            output_rate,
            channels,
            pending: vec![Vec::with_capacity(CHUNK_FRAMES * 2); channels],
        })
    }

    pub const fn input_rate(&self) -> u32 {
        self.input_rate
    }

    pub const fn output_rate(&self) -> u32 {
        self.output_rate
    }

    /// Input frames held back waiting for a full chunk.
    pub fn pending_frames(&self) -> usize {
        self.pending[0].len()
    }

    /// Convert `input`, appending every completed chunk to `output`.
    pub fn process(&mut self, input: &[f32], output: &mut Vec<f32>) -> Result<()> {
        for frame in input.chunks_exact(self.channels) {
            for (channel, sample) in self.pending.iter_mut().zip(frame) {
                channel.push(*sample);
            }
        }

        while self.pending_frames() >= CHUNK_FRAMES {
            let chunk: Vec<Vec<f32>> = self
                .pending
                .iter_mut()
                .map(|channel| channel.drain(..CHUNK_FRAMES).collect())
                .collect();
            self.convert_chunk(&chunk, usize::MAX, output)?;
        }

        Ok(())
    }

    /// Convert whatever is held back, padding the last chunk with silence.
    pub fn finish(&mut self, output: &mut Vec<f32>) -> Result<()> {
        let remaining = self.pending_frames();
        if remaining == 0 {
            return Ok(());
        }

        let chunk: Vec<Vec<f32>> = self
            .pending
            .iter_mut()
            .map(|channel| {
                let mut data = std::mem::take(channel);
                data.resize(CHUNK_FRAMES, 0.0);
                data
            })
            .collect();

        let frames = (remaining as f64 * f64::from(self.output_rate) / f64::from(self.input_rate))
            .round() as usize;
        self.convert_chunk(&chunk, frames, output)
    }

    /// Drop held back input and filter state.
    pub fn reset(&mut self) {
        self.inner.reset();
        self.pending.iter_mut().for_each(Vec::clear);
    }

    fn convert_chunk(
        &mut self,
        chunk: &[Vec<f32>],
        max_frames: usize,
        output: &mut Vec<f32>,
    ) -> Result<()> {
        let converted = self
            .inner
            .process(chunk, None)
            .map_err(|e| Error::AudioOutput(format!("Resample failed: {e}")))?;

        let frames = converted.first().map_or(0, Vec::len).min(max_frames);
        output.reserve(frames * self.channels);
        for frame in 0..frames {
            for channel in &converted {
                output.push(channel[frame]);
            }
        }
        Ok(())
    }
}
