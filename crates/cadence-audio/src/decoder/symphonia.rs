//! Audio decoding using symphonia.

use cadence_core::types::track::uri_extension;
use cadence_core::{Error, Format, Frame, Result};
use symphonia::core::{
    audio::{AudioBuffer, AudioBufferRef, Signal},
    codecs::{Decoder as CodecDecoder, DecoderOptions, CODEC_TYPE_NULL},
    conv::IntoSample,
    errors::Error as SymphoniaError,
    formats::{FormatOptions, FormatReader, SeekMode, SeekTo},
    io::{MediaSourceStream, MediaSourceStreamOptions},
    meta::MetadataOptions,
    probe::Hint,
    sample::Sample,
    units::{Time, TimeBase},
};
use tracing::{debug, warn};

use super::Decoder;
use crate::reader::{open_reader, ReaderSource};

/// Bytes per output sample (f32).
const SAMPLE_BYTES: usize = 4;

/// Decoder for every codec and container symphonia supports.
///
/// Produces interleaved 32-bit float little-endian PCM.
pub struct SymphoniaDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn CodecDecoder>,
    track_id: u32,
    sample_rate: u32,
    channels: u32,
    frames_per_packet: u32,
    time_base: Option<TimeBase>,
    n_frames: Option<u64>,
    /// Timestamp (in track time base units) of the end of the last packet.
    position_ts: u64,
    /// Output before this timestamp is dropped after an accurate seek.
    skip_until_ts: Option<u64>,
    last_frame_size: usize,
}

impl SymphoniaDecoder {
    /// Open `uri` through [`open_reader`] and probe its container.
    pub fn open(uri: &str) -> Result<Self> {
        let source = ReaderSource::new(open_reader(uri)?);
        let mss = MediaSourceStream::new(Box::new(source), MediaSourceStreamOptions::default());

        let mut hint = Hint::new();
        if let Some(extension) = uri_extension(uri) {
            hint.with_extension(&extension);
        }

        let format_opts = FormatOptions {
            enable_gapless: true,
            ..Default::default()
        };

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &format_opts, &MetadataOptions::default())
            .map_err(|e| Error::UnsupportedFormat(format!("{uri}: {e}")))?;
        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::AudioDecode(format!("{uri}: no audio tracks found")))?;

        let params = &track.codec_params;
        let sample_rate = params
            .sample_rate
            .ok_or_else(|| Error::UnsupportedFormat(format!("{uri}: unknown sample rate")))?;
        let channels = params.channels.map_or(2, |c| c.count() as u32);

        let decoder = symphonia::default::get_codecs()
            .make(params, &DecoderOptions::default())
            .map_err(|e| Error::UnsupportedFormat(format!("{uri}: {e}")))?;

        debug!(
            "Audio track: id={}, sample_rate={sample_rate}, channels={channels}",
            track.id
        );

        Ok(Self {
            track_id: track.id,
            sample_rate,
            channels,
            frames_per_packet: params.max_frames_per_packet.unwrap_or(0) as u32,
            time_base: params.time_base,
            n_frames: params.n_frames,
            format,
            decoder,
            position_ts: 0,
            skip_until_ts: None,
            last_frame_size: 0,
        })
    }

    fn ts_to_seconds(&self, ts: u64) -> f64 {
        ts_seconds(self.time_base, self.sample_rate, ts)
    }
}

fn ts_seconds(time_base: Option<TimeBase>, sample_rate: u32, ts: u64) -> f64 {
    match time_base {
        Some(time_base) => {
            let time = time_base.calc_time(ts);
            time.seconds as f64 + time.frac
        }
        None => ts as f64 / f64::from(sample_rate),
    }
}

/// Sample frames between two timestamps. Container time bases are not
/// necessarily `1/sample_rate` (Matroska counts milliseconds).
fn frames_between(time_base: Option<TimeBase>, sample_rate: u32, from: u64, to: u64) -> usize {
    let secs = ts_seconds(time_base, sample_rate, to) - ts_seconds(time_base, sample_rate, from);
    (secs * f64::from(sample_rate)).round().max(0.0) as usize
}

impl Decoder for SymphoniaDecoder {
    fn decode_frame(&mut self, frame: &mut Frame) -> Result<bool> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Ok(false);
                }
                Err(SymphoniaError::ResetRequired) => {
                    debug!("Track list changed mid-stream, ending track");
                    return Ok(false);
                }
                Err(e) => {
                    return Err(Error::AudioDecode(format!("Failed to read packet: {e}")));
                }
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let packet_end = packet.ts() + packet.dur();
            if self.skip_until_ts.is_some_and(|target| packet_end <= target) {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Decode error (skipping packet): {e}");
                    continue;
                }
                Err(e) => return Err(Error::AudioDecode(format!("Decode failed: {e}"))),
            };

            let buffer = frame.buffer_mut();
            buffer.clear();
            append_f32_le(&decoded, buffer);
            frame.set_pts(self.ts_to_seconds(packet.ts()));

            if let Some(target) = self.skip_until_ts.take() {
                if packet.ts() < target {
                    let frames =
                        frames_between(self.time_base, self.sample_rate, packet.ts(), target);
                    frame.offset_data(frames * self.channels as usize * SAMPLE_BYTES);
                    frame.set_pts(self.ts_to_seconds(target));
                }
            }

            self.position_ts = packet_end;
            self.last_frame_size = frame.data_size();
            return Ok(true);
        }
    }

    fn seek_absolute(&mut self, seconds: f64) -> Result<()> {
        let duration = self.duration();
        if !seconds.is_finite() || seconds < 0.0 || (duration > 0.0 && seconds > duration) {
            return Err(Error::InvalidSeek(seconds));
        }

        let seeked = self
            .format
            .seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time: Time::from(seconds),
                    track_id: Some(self.track_id),
                },
            )
            .map_err(|e| Error::AudioDecode(format!("Seek failed: {e}")))?;

        self.decoder.reset();
        self.position_ts = seeked.required_ts;
        self.skip_until_ts = Some(seeked.required_ts);
        debug!("Seeked to {seconds:.2}s (ts {})", seeked.required_ts);
        Ok(())
    }

    fn seek_relative(&mut self, offset: f64) -> Result<()> {
        let target = (self.ts_to_seconds(self.position_ts) + offset).max(0.0);
        let duration = self.duration();
        self.seek_absolute(if duration > 0.0 {
            target.min(duration)
        } else {
            target
        })
    }

    fn audio_format(&self) -> Format {
        Format::float(self.sample_rate, self.channels).with_frames_per_packet(self.frames_per_packet)
    }

    fn duration(&self) -> f64 {
        self.n_frames.map_or(0.0, |n| self.ts_to_seconds(n))
    }

    fn progress(&self) -> f64 {
        let duration = self.duration();
        if duration <= 0.0 {
            return 0.0;
        }
        (self.ts_to_seconds(self.position_ts) / duration).clamp(0.0, 1.0)
    }

    fn frame_size(&self) -> usize {
        self.last_frame_size
    }
}

/// Append a decoded buffer as interleaved f32 little-endian bytes.
fn append_f32_le(buffer: &AudioBufferRef<'_>, output: &mut Vec<u8>) {
    match buffer {
        AudioBufferRef::U8(buf) => interleave(buf, output),
        AudioBufferRef::U16(buf) => interleave(buf, output),
        AudioBufferRef::U24(buf) => interleave(buf, output),
        AudioBufferRef::U32(buf) => interleave(buf, output),
        AudioBufferRef::S8(buf) => interleave(buf, output),
        AudioBufferRef::S16(buf) => interleave(buf, output),
        AudioBufferRef::S24(buf) => interleave(buf, output),
        AudioBufferRef::S32(buf) => interleave(buf, output),
        AudioBufferRef::F32(buf) => interleave(buf, output),
        AudioBufferRef::F64(buf) => interleave(buf, output),
    }
}

fn interleave<S: Sample + IntoSample<f32>>(buffer: &AudioBuffer<S>, output: &mut Vec<u8>) {
    let planes = buffer.planes();
    let channel_planes = planes.planes();
    output.reserve(buffer.frames() * channel_planes.len() * SAMPLE_BYTES);

    for frame in 0..buffer.frames() {
        for plane in channel_planes {
            let sample: f32 = plane[frame].into_sample();
            output.extend_from_slice(&sample.to_le_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use symphonia::core::audio::{Channels, SignalSpec};

    #[test]
    fn test_interleave_converts_to_f32() {
        let spec = SignalSpec::new(8_000, Channels::FRONT_LEFT | Channels::FRONT_RIGHT);
        let mut buffer = AudioBuffer::<i16>::new(2, spec);
        buffer.render_reserved(Some(2));
        buffer.chan_mut(0).copy_from_slice(&[i16::MAX, 0]);
        buffer.chan_mut(1).copy_from_slice(&[i16::MIN, 0]);

        let mut bytes = Vec::new();
        append_f32_le(&AudioBufferRef::S16(std::borrow::Cow::Borrowed(&buffer)), &mut bytes);

        let samples: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        assert_eq!(samples.len(), 4);
        assert!((samples[0] - 1.0).abs() < 1e-3);
        assert!((samples[1] + 1.0).abs() < 1e-3);
        assert!(samples[2].abs() < f32::EPSILON);
    }

    #[test]
    fn test_trim_frames_follow_time_base() {
        // Millisecond ticks at 48 kHz: 20 ticks are 960 frames.
        let millis = Some(TimeBase::new(1, 1_000));
        assert_eq!(frames_between(millis, 48_000, 1_000, 1_020), 960);

        let samples = Some(TimeBase::new(1, 44_100));
        assert_eq!(frames_between(samples, 44_100, 4_410, 4_500), 90);
        assert_eq!(frames_between(None, 8_000, 100, 350), 250);
        assert_eq!(frames_between(millis, 48_000, 30, 10), 0);
    }

    #[test]
    fn test_open_missing_file() {
        assert!(SymphoniaDecoder::open("/definitely/not/here.flac").is_err());
    }

    #[test]
    fn test_open_garbage_is_unsupported() {
        let path = std::env::temp_dir().join(format!("cadence-garbage-{}.mp3", std::process::id()));
        std::fs::write(&path, [0u8; 512]).unwrap();
        let result = SymphoniaDecoder::open(&path.display().to_string());
        let _ = std::fs::remove_file(&path);
        assert!(matches!(
            result,
            Err(Error::UnsupportedFormat(_) | Error::AudioDecode(_))
        ));
    }
}
