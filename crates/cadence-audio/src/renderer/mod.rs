//! Audio renderers: the device side of the playback pipeline.
//!
//! A renderer accepts decoded [`Frame`]s, stages them and plays them out.
//! The engine paces decoding against [`Renderer::has_buffer_space`] and
//! reads the playback position back through [`Renderer::current_pts`].

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

pub mod null;
pub mod output;
pub mod pcm;
pub mod resample;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use cadence_core::{EngineConfig, Error, Format, Frame, Result};
use tracing::debug;

pub use null::NullRenderer;
pub use output::CpalRenderer;

/// Called with the new volume when a renderer's volume changes outside
/// of [`Renderer::set_volume`] (for example from a system mixer).
pub type VolumeListener = Arc<dyn Fn(u32) + Send + Sync>;

/// Highest volume a renderer accepts.
pub const MAX_VOLUME: u32 = 100;

/// Playout device capability.
pub trait Renderer: Send {
    /// Configure the PCM format of subsequent frames.
    ///
    /// Unchanged formats and the unconfigured sentinel are ignored.
    fn set_format(&mut self, format: Format) -> Result<()>;

    /// Current format (the sentinel until one was set).
    fn format(&self) -> Format;

    /// Start output from whatever is staged.
    fn play(&mut self) -> Result<()>;

    /// Halt output, keeping staged audio.
    fn pause(&mut self) -> Result<()>;

    /// Continue after [`Renderer::pause`].
    fn resume(&mut self) -> Result<()>;

    /// Halt output. With `drain` staged audio plays out first, otherwise it
    /// is dropped.
    fn stop(&mut self, drain: bool) -> Result<()>;

    fn set_volume(&mut self, volume: u32);

    fn volume(&self) -> u32;

    fn set_mute(&mut self, mute: bool);

    fn is_muted(&self) -> bool;

    /// Whether the device is actually producing sound.
    fn is_playing(&self) -> bool;

    /// Whether `size` more bytes can be queued. Always false while paused.
    fn has_buffer_space(&self, size: usize) -> bool;

    /// Seconds of staged audio not yet played.
    fn buffer_duration(&self) -> f64;

    /// Push internally staged audio toward the device and recover from
    /// underruns.
    fn flush_buffers(&mut self) -> Result<()>;

    /// Stage a frame for output.
    ///
    /// Fails with [`Error::FormatNotSet`] before a format was configured and
    /// with [`Error::BufferOverflow`] when the frame does not fit.
    fn queue_frame(&mut self, frame: &Frame) -> Result<()>;

    /// Track position currently heard: the end of the last queued frame
    /// minus the staged delay, never negative.
    fn current_pts(&self) -> f64;

    /// Install a listener for externally driven volume changes.
    fn set_volume_listener(&mut self, _listener: VolumeListener) {}
}

/// Volume and mute bookkeeping shared by renderer implementations.
///
/// Muting keeps the reported volume; only the applied gain drops to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeControl {
    volume: u32,
    muted: bool,
}

impl Default for VolumeControl {
    fn default() -> Self {
        Self::new(MAX_VOLUME)
    }
}

impl VolumeControl {
    pub fn new(volume: u32) -> Self {
        Self {
            volume: volume.min(MAX_VOLUME),
            muted: false,
        }
    }

    /// Set the volume, clamped to [`MAX_VOLUME`]. Returns the stored value.
    pub fn set_volume(&mut self, volume: u32) -> u32 {
        self.volume = volume.min(MAX_VOLUME);
        self.volume
    }

    pub const fn volume(&self) -> u32 {
        self.volume
    }

    pub fn set_mute(&mut self, mute: bool) {
        self.muted = mute;
    }

    pub const fn is_muted(&self) -> bool {
        self.muted
    }

    /// Linear gain to apply to samples.
    pub fn gain(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            self.volume as f32 / MAX_VOLUME as f32
        }
    }
}

/// Builds a renderer from the engine configuration.
pub type RendererConstructor =
    Arc<dyn Fn(&EngineConfig) -> Result<Box<dyn Renderer>> + Send + Sync>;

/// Maps backend names to renderer constructors.
///
/// Names are matched case-insensitively.
#[derive(Clone, Default)]
pub struct RendererRegistry {
    backends: HashMap<String, RendererConstructor>,
}

impl RendererRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the `cpal` and `null` backends.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("cpal", |config: &EngineConfig| {
            Ok(Box::new(CpalRenderer::new(config)?) as Box<dyn Renderer>)
        });
        registry.register("null", |config: &EngineConfig| {
            Ok(Box::new(NullRenderer::new(config)) as Box<dyn Renderer>)
        });
        registry
    }

    pub fn register<F>(&mut self, name: &str, constructor: F)
    where
        F: Fn(&EngineConfig) -> Result<Box<dyn Renderer>> + Send + Sync + 'static,
    {
        self.backends
            .insert(name.to_ascii_lowercase(), Arc::new(constructor));
    }

    pub fn supports(&self, name: &str) -> bool {
        self.backends.contains_key(&name.to_ascii_lowercase())
    }

    /// Registered backend names, sorted.
    pub fn backends(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }

    /// Build the renderer named by `config.backend`.
    pub fn create(&self, config: &EngineConfig) -> Result<Box<dyn Renderer>> {
        let name = config.backend.to_ascii_lowercase();
        let constructor = self
            .backends
            .get(&name)
            .ok_or_else(|| Error::UnsupportedBackend(config.backend.clone()))?;

        debug!("Creating {name} renderer");
        let mut renderer = constructor(config)?;
        renderer.set_volume(config.initial_volume);
        Ok(renderer)
    }
}

impl fmt::Debug for RendererRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RendererRegistry")
            .field("backends", &self.backends())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_clamps() {
        let mut volume = VolumeControl::default();
        assert_eq!(volume.set_volume(150), 100);
        assert_eq!(volume.set_volume(30), 30);
        assert!((volume.gain() - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_mute_keeps_volume() {
        let mut volume = VolumeControl::new(60);
        volume.set_mute(true);
        assert_eq!(volume.volume(), 60);
        assert!(volume.gain().abs() < f32::EPSILON);

        volume.set_mute(false);
        assert!((volume.gain() - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_registry_lookup_is_case_insensitive() {
        let registry = RendererRegistry::with_defaults();
        assert!(registry.supports("NULL"));
        assert!(registry.supports("cpal"));
        assert_eq!(registry.backends(), vec!["cpal", "null"]);

        let config = EngineConfig {
            backend: "Null".to_string(),
            initial_volume: 40,
            ..EngineConfig::default()
        };
        let renderer = registry.create(&config).unwrap();
        assert_eq!(renderer.volume(), 40);
    }

    #[test]
    fn test_registry_rejects_unknown_backend() {
        let config = EngineConfig {
            backend: "OpenAL".to_string(),
            ..EngineConfig::default()
        };
        let result = RendererRegistry::with_defaults().create(&config);
        assert!(matches!(result, Err(Error::UnsupportedBackend(name)) if name == "OpenAL"));
    }
}
