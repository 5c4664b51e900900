//! Audio output using cpal.
//!
//! `cpal::Stream` is not `Send`, so every stream lives on a dedicated
//! device thread owned by the renderer. The renderer talks to it over a
//! channel and shares the sample ring buffer plus a few atomics with the
//! output callback.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use cadence_core::{EngineConfig, Error, Format, Frame, Result};
use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    Device, SampleFormat, SampleRate, Stream, StreamConfig, SupportedStreamConfig,
};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use tracing::{debug, error, info, warn};

use super::pcm;
use super::resample::RateConverter;
use super::{Renderer, VolumeControl};
use crate::buffer::{shared_ring_buffer, SharedRingBuffer};

/// Samples moved per ring read inside the output callback.
const CALLBACK_CHUNK: usize = 512;

/// Poll interval while draining on stop.
const DRAIN_POLL: Duration = Duration::from_millis(10);

/// State shared with the output callback.
#[derive(Debug)]
struct CallbackShared {
    /// The callback outputs silence while false.
    running: AtomicBool,
    /// f32 gain stored as bits.
    gain: AtomicU32,
    underruns: AtomicU64,
    /// Set by the stream error callback.
    failed: AtomicBool,
    /// Staged samples are to be dropped. The callback owns `read_pos`, so
    /// it performs the discard and clears the flag; nothing is written to
    /// the ring until then.
    discard: AtomicBool,
}

impl CallbackShared {
    fn new(gain: f32) -> Self {
        Self {
            running: AtomicBool::new(false),
            gain: AtomicU32::new(gain.to_bits()),
            underruns: AtomicU64::new(0),
            failed: AtomicBool::new(false),
            discard: AtomicBool::new(false),
        }
    }

    fn discard_pending(&self) -> bool {
        self.discard.load(Ordering::Acquire)
    }

    fn set_gain(&self, gain: f32) {
        self.gain.store(gain.to_bits(), Ordering::Relaxed);
    }
}

/// A stream opened on the device thread.
struct OpenedStream {
    rate: u32,
    channels: u16,
    ring: SharedRingBuffer<f32>,
}

enum DeviceCommand {
    Open {
        rate: u32,
        channels: u16,
        buffer_secs: f64,
        reply: Sender<Result<OpenedStream>>,
    },
    Shutdown,
}

/// Output stream negotiated for the current track format.
struct ActiveOutput {
    rate: u32,
    channels: usize,
    ring: SharedRingBuffer<f32>,
    converter: Option<RateConverter>,
}

impl ActiveOutput {
    /// Device-rate samples needed for `bytes` of track PCM.
    fn samples_for(&self, format: &Format, bytes: usize) -> usize {
        let samples = bytes / format.bytes_per_sample().max(1);
        match &self.converter {
            Some(converter) => {
                let ratio = f64::from(converter.output_rate()) / f64::from(converter.input_rate());
                (samples as f64 * ratio).ceil() as usize + self.channels
            }
            None => samples,
        }
    }
}

/// Renderer playing through the system audio host.
pub struct CpalRenderer {
    buffer_secs: f64,
    device_name: String,
    format: Format,
    volume: VolumeControl,
    shared: Arc<CallbackShared>,
    commands: Sender<DeviceCommand>,
    thread: Option<JoinHandle<()>>,
    output: Option<ActiveOutput>,
    /// Converted samples that did not fit the ring yet.
    overflow: Vec<f32>,
    scratch: Vec<f32>,
    /// End PTS of the last queued frame.
    last_pts: f64,
    playing: bool,
    paused: bool,
}

impl CpalRenderer {
    /// Open the configured device (or the host default) on a new device
    /// thread.
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let volume = VolumeControl::new(config.initial_volume);
        let shared = Arc::new(CallbackShared::new(volume.gain()));
        let (commands, command_rx) = unbounded();
        let (ready_tx, ready_rx) = bounded(1);

        let wanted = config.device.clone();
        let callback_shared = Arc::clone(&shared);
        let thread = std::thread::Builder::new()
            .name("cadence-device".to_string())
            .spawn(move || match select_device(wanted.as_deref()) {
                Ok((device, name)) => {
                    let _ = ready_tx.send(Ok(name));
                    run_device(&device, &command_rx, &callback_shared);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| Error::AudioOutput(format!("Failed to spawn device thread: {e}")))?;

        let device_name = ready_rx
            .recv()
            .map_err(|_| Error::AudioOutput("Device thread exited during startup".to_string()))??;
        info!("Using audio output device: {device_name}");

        Ok(Self {
            buffer_secs: config.buffer_secs,
            device_name,
            format: Format::default(),
            volume,
            shared,
            commands,
            thread: Some(thread),
            output: None,
            overflow: Vec::new(),
            scratch: Vec::new(),
            last_pts: 0.0,
            playing: false,
            paused: false,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    fn open_stream(&mut self, format: Format) -> Result<()> {
        let channels = u16::try_from(format.num_channels)
            .map_err(|_| Error::UnsupportedFormat(format!("{} channels", format.num_channels)))?;

        let (reply, reply_rx) = bounded(1);
        self.commands
            .send(DeviceCommand::Open {
                rate: format.rate,
                channels,
                buffer_secs: self.buffer_secs,
                reply,
            })
            .map_err(|_| Error::AudioOutput("Device thread is gone".to_string()))?;
        let opened = reply_rx
            .recv()
            .map_err(|_| Error::AudioOutput("Device thread is gone".to_string()))??;

        let converter = if opened.rate == format.rate {
            None
        } else {
            Some(RateConverter::new(
                format.rate,
                opened.rate,
                usize::from(opened.channels),
            )?)
        };

        self.output = Some(ActiveOutput {
            rate: opened.rate,
            channels: usize::from(opened.channels),
            ring: opened.ring,
            converter,
        });
        self.overflow.clear();
        // The new ring starts empty.
        self.shared.discard.store(false, Ordering::Release);
        self.shared.failed.store(false, Ordering::Release);
        Ok(())
    }

    /// Move overflow samples into the ring.
    fn push_overflow(&mut self) {
        if self.shared.discard_pending() {
            return;
        }
        if let Some(output) = &self.output {
            let written = output.ring.write(&self.overflow);
            self.overflow.drain(..written);
        }
    }

    /// Drop staged audio. The ring itself is emptied by the callback.
    fn discard_staged(&mut self) {
        if let Some(output) = &mut self.output {
            self.shared.discard.store(true, Ordering::Release);
            if let Some(converter) = &mut output.converter {
                converter.reset();
            }
        }
        self.overflow.clear();
    }

    /// Block until staged audio has played or the expected time ran out.
    fn drain(&mut self) -> Result<()> {
        if let Some(output) = &mut self.output {
            if let Some(converter) = &mut output.converter {
                converter.finish(&mut self.overflow)?;
            }
        }

        let deadline = Instant::now() + Duration::from_secs_f64(self.buffer_duration() + 0.5);
        while Instant::now() < deadline {
            self.push_overflow();
            let empty = self.output.as_ref().map_or(true, |o| o.ring.is_empty());
            if empty && self.overflow.is_empty() {
                break;
            }
            std::thread::sleep(DRAIN_POLL);
        }
        Ok(())
    }
}

impl Renderer for CpalRenderer {
    fn set_format(&mut self, format: Format) -> Result<()> {
        if !format.is_configured() || format == self.format {
            return Ok(());
        }
        if !pcm::is_supported(&format) {
            return Err(Error::UnsupportedFormat(format!("PCM {format}")));
        }

        self.stop(false)?;
        self.output = None;
        self.format = Format::default();
        self.open_stream(format)?;
        self.format = format;
        debug!("Renderer configured for {format}");
        Ok(())
    }

    fn format(&self) -> Format {
        self.format
    }

    fn play(&mut self) -> Result<()> {
        if self.output.is_none() {
            return Err(Error::FormatNotSet);
        }
        self.shared.running.store(true, Ordering::Release);
        self.playing = true;
        self.paused = false;
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.shared.running.store(false, Ordering::Release);
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
        if drain && self.is_playing() {
            self.drain()?;
        }
        self.shared.running.store(false, Ordering::Release);
        self.discard_staged();
        self.last_pts = 0.0;
        self.playing = false;
        self.paused = false;
        Ok(())
    }

    fn set_volume(&mut self, volume: u32) {
        self.volume.set_volume(volume);
        self.shared.set_gain(self.volume.gain());
    }

    fn volume(&self) -> u32 {
        self.volume.volume()
    }

    fn set_mute(&mut self, mute: bool) {
        self.volume.set_mute(mute);
        self.shared.set_gain(self.volume.gain());
    }

    fn is_muted(&self) -> bool {
        self.volume.is_muted()
    }

    fn is_playing(&self) -> bool {
        self.playing && !self.paused
    }

    fn has_buffer_space(&self, size: usize) -> bool {
        if self.paused || !self.overflow.is_empty() || self.shared.discard_pending() {
            return false;
        }
        self.output
            .as_ref()
            .is_some_and(|o| o.ring.free() >= o.samples_for(&self.format, size))
    }

    fn buffer_duration(&self) -> f64 {
        let Some(output) = &self.output else {
            return 0.0;
        };
        if self.shared.discard_pending() {
            return 0.0;
        }
        let staged = output.ring.available() + self.overflow.len();
        let mut secs = staged as f64 / (f64::from(output.rate) * output.channels as f64);
        if let Some(converter) = &output.converter {
            secs += converter.pending_frames() as f64 / f64::from(converter.input_rate());
        }
        secs
    }

    fn flush_buffers(&mut self) -> Result<()> {
        if self.shared.failed.swap(false, Ordering::AcqRel) {
            warn!("Audio stream failed, reopening {}", self.device_name);
            let format = self.format;
            let running = self.shared.running.load(Ordering::Acquire);
            self.output = None;
            self.overflow.clear();
            self.open_stream(format)?;
            self.shared.running.store(running, Ordering::Release);
            return Ok(());
        }

        let underruns = self.shared.underruns.swap(0, Ordering::Relaxed);
        if underruns > 0 && self.is_playing() {
            warn!("Audio buffer underrun ({underruns} callbacks short)");
        }

        self.push_overflow();
        Ok(())
    }

    fn queue_frame(&mut self, frame: &Frame) -> Result<()> {
        let Some(output) = &mut self.output else {
            return Err(Error::FormatNotSet);
        };

        let needed = output.samples_for(&self.format, frame.data_size());
        let free = if self.shared.discard_pending() {
            0
        } else {
            output.ring.free()
        };
        if !self.overflow.is_empty() || needed > free {
            return Err(Error::BufferOverflow {
                requested: frame.data_size(),
                free: free * self.format.bytes_per_sample(),
            });
        }

        self.scratch.clear();
        pcm::to_f32(&self.format, frame.data(), &mut self.scratch)?;

        match &mut output.converter {
            Some(converter) => {
                let mut converted = Vec::with_capacity(needed);
                converter.process(&self.scratch, &mut converted)?;
                let written = output.ring.write(&converted);
                self.overflow.extend_from_slice(&converted[written..]);
            }
            None => {
                let written = output.ring.write(&self.scratch);
                self.overflow.extend_from_slice(&self.scratch[written..]);
            }
        }

        self.last_pts = frame.pts() + self.format.duration_of(frame.data_size());
        Ok(())
    }

    fn current_pts(&self) -> f64 {
        (self.last_pts - self.buffer_duration()).max(0.0)
    }
}

impl Drop for CpalRenderer {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::Release);
        let _ = self.commands.send(DeviceCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Audio device thread panicked");
            }
        }
    }
}

/// Pick the output device named `wanted`, or the host default.
fn select_device(wanted: Option<&str>) -> Result<(Device, String)> {
    let host = cpal::default_host();

    if let Some(wanted) = wanted {
        let devices = host
            .output_devices()
            .map_err(|e| Error::AudioOutput(format!("Failed to list devices: {e}")))?;
        for device in devices {
            if device.name().is_ok_and(|name| name == wanted) {
                return Ok((device, wanted.to_string()));
            }
        }
        warn!("Output device {wanted:?} not found, using the default device");
    }

    let device = host
        .default_output_device()
        .ok_or_else(|| Error::AudioOutput("No output device found".to_string()))?;
    let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    Ok((device, name))
}

/// List available output devices.
pub fn list_output_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();

    let devices: Vec<String> = host
        .output_devices()
        .map_err(|e| Error::AudioOutput(format!("Failed to list devices: {e}")))?
        .filter_map(|d| d.name().ok())
        .collect();

    Ok(devices)
}

/// Device thread body: owns the current stream until shutdown.
fn run_device(device: &Device, commands: &Receiver<DeviceCommand>, shared: &Arc<CallbackShared>) {
    let mut stream: Option<Stream> = None;

    while let Ok(command) = commands.recv() {
        match command {
            DeviceCommand::Open {
                rate,
                channels,
                buffer_secs,
                reply,
            } => {
                // Only one stream at a time per device.
                stream = None;
                let result = match start_stream(device, rate, channels, buffer_secs, shared) {
                    Ok((opened_stream, opened)) => {
                        stream = Some(opened_stream);
                        Ok(opened)
                    }
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }
            DeviceCommand::Shutdown => break,
        }
    }

    drop(stream);
    debug!("Audio device thread stopped");
}

/// Choose a stream config with `channels` channels, at `rate` if the
/// device can do it, otherwise at the device's highest rate.
fn negotiate(device: &Device, rate: u32, channels: u16) -> Result<SupportedStreamConfig> {
    let ranges = device
        .supported_output_configs()
        .map_err(|e| Error::AudioOutput(format!("Failed to query output configs: {e}")))?;

    let mut fallback = None;
    for range in ranges.filter(|r| r.channels() == channels) {
        if range.min_sample_rate().0 <= rate && rate <= range.max_sample_rate().0 {
            return Ok(range.with_sample_rate(SampleRate(rate)));
        }
        if fallback.is_none() {
            fallback = Some(range.with_max_sample_rate());
        }
    }

    fallback.ok_or_else(|| {
        Error::UnsupportedFormat(format!("device has no {channels}-channel output"))
    })
}

fn start_stream(
    device: &Device,
    rate: u32,
    channels: u16,
    buffer_secs: f64,
    shared: &Arc<CallbackShared>,
) -> Result<(Stream, OpenedStream)> {
    let supported = negotiate(device, rate, channels)?;
    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.into();

    debug!(
        "Output config: {}Hz, {} channels, {sample_format:?}",
        config.sample_rate.0, config.channels
    );

    let capacity = (buffer_secs * f64::from(config.sample_rate.0)) as usize * usize::from(channels);
    let ring = shared_ring_buffer(capacity);

    let stream = match sample_format {
        SampleFormat::F32 => build_stream::<f32>(device, &config, &ring, shared)?,
        SampleFormat::I16 => build_stream::<i16>(device, &config, &ring, shared)?,
        SampleFormat::U16 => build_stream::<u16>(device, &config, &ring, shared)?,
        SampleFormat::I32 => build_stream::<i32>(device, &config, &ring, shared)?,
        _ => {
            return Err(Error::AudioOutput(format!(
                "Unsupported sample format: {sample_format:?}"
            )));
        }
    };

    stream
        .play()
        .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {e}")))?;

    Ok((
        stream,
        OpenedStream {
            rate: config.sample_rate.0,
            channels: config.channels,
            ring,
        },
    ))
}

fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
    device: &Device,
    config: &StreamConfig,
    ring: &SharedRingBuffer<f32>,
    shared: &Arc<CallbackShared>,
) -> Result<Stream> {
    let ring = Arc::clone(ring);
    let callback_shared = Arc::clone(shared);
    let error_shared = Arc::clone(shared);

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                fill_output(data, &ring, &callback_shared);
            },
            move |err| {
                error!("Audio stream error: {err}");
                error_shared.failed.store(true, Ordering::Release);
            },
            None,
        )
        .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {e}")))?;

    Ok(stream)
}

/// Output callback body. Never allocates.
fn fill_output<T: cpal::SizedSample + cpal::FromSample<f32>>(
    data: &mut [T],
    ring: &SharedRingBuffer<f32>,
    shared: &CallbackShared,
) {
    let silence = T::from_sample(0.0f32);

    if shared.discard_pending() {
        ring.skip(ring.available());
        shared.discard.store(false, Ordering::Release);
    }

    if !shared.running.load(Ordering::Acquire) {
        data.fill(silence);
        return;
    }

    let gain = f32::from_bits(shared.gain.load(Ordering::Relaxed));
    let mut scratch = [0.0f32; CALLBACK_CHUNK];
    let mut filled = 0;

    while filled < data.len() {
        let wanted = (data.len() - filled).min(CALLBACK_CHUNK);
        let read = ring.read(&mut scratch[..wanted]);
        for (out, sample) in data[filled..filled + read].iter_mut().zip(&scratch[..read]) {
            *out = T::from_sample(sample * gain);
        }
        filled += read;
        if read < wanted {
            break;
        }
    }

    if filled < data.len() {
        data[filled..].fill(silence);
        if filled > 0 {
            shared.underruns.fetch_add(1, Ordering::Relaxed);
        }
    }
}
