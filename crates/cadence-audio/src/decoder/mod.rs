//! Decoders turn an encoded source into PCM [`Frame`]s.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

pub mod symphonia;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use cadence_core::types::track::uri_extension;
use cadence_core::{Error, Format, Frame, Result};
use tracing::debug;

pub use self::symphonia::SymphoniaDecoder;

/// Extensions routed to [`SymphoniaDecoder`] by [`DecoderRegistry::with_defaults`].
pub const SYMPHONIA_EXTENSIONS: &[&str] = &[
    "mp3", "flac", "ogg", "oga", "opus", "wav", "m4a", "mp4", "aac", "aiff", "caf", "mka", "webm",
];

/// Codec capability. One instance decodes one track.
pub trait Decoder: Send {
    /// Decode the next chunk of audio into `frame`.
    ///
    /// Returns `Ok(false)` at the end of the stream; no further frames follow.
    fn decode_frame(&mut self, frame: &mut Frame) -> Result<bool>;

    /// Reposition to `seconds` from the start of the track.
    fn seek_absolute(&mut self, seconds: f64) -> Result<()>;

    /// Reposition by `offset` seconds from the current position.
    fn seek_relative(&mut self, offset: f64) -> Result<()>;

    /// PCM format of the produced frames.
    fn audio_format(&self) -> Format;

    /// Track length in seconds, 0 when unknown.
    fn duration(&self) -> f64;

    /// Fraction of the track decoded so far, in [0, 1].
    fn progress(&self) -> f64;

    /// Size in bytes of the last decoded frame.
    fn frame_size(&self) -> usize;
}

/// Builds a decoder for a URI.
pub type DecoderConstructor = Arc<dyn Fn(&str) -> Result<Box<dyn Decoder>> + Send + Sync>;

/// Maps file extensions to decoder constructors.
#[derive(Clone, Default)]
pub struct DecoderRegistry {
    by_extension: HashMap<String, DecoderConstructor>,
    fallback: Option<DecoderConstructor>,
}

impl DecoderRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Symphonia for every extension it handles, and as the fallback.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let constructor: DecoderConstructor =
            Arc::new(|uri: &str| Ok(Box::new(SymphoniaDecoder::open(uri)?) as Box<dyn Decoder>));

        for extension in SYMPHONIA_EXTENSIONS {
            registry
                .by_extension
                .insert((*extension).to_string(), Arc::clone(&constructor));
        }
        registry.fallback = Some(constructor);
        registry
    }

    pub fn register<F>(&mut self, extension: &str, constructor: F)
    where
        F: Fn(&str) -> Result<Box<dyn Decoder>> + Send + Sync + 'static,
    {
        self.by_extension
            .insert(extension.to_ascii_lowercase(), Arc::new(constructor));
    }

    /// Constructor used when no extension matches.
    pub fn set_fallback<F>(&mut self, constructor: F)
    where
        F: Fn(&str) -> Result<Box<dyn Decoder>> + Send + Sync + 'static,
    {
        self.fallback = Some(Arc::new(constructor));
    }

    pub fn supports(&self, extension: &str) -> bool {
        self.by_extension
            .contains_key(&extension.to_ascii_lowercase())
    }

    /// Build a decoder for `uri`.
    pub fn create(&self, uri: &str) -> Result<Box<dyn Decoder>> {
        let extension = uri_extension(uri);
        let constructor = extension
            .as_deref()
            .and_then(|ext| self.by_extension.get(ext))
            .or(self.fallback.as_ref())
            .ok_or_else(|| {
                Error::UnsupportedFormat(format!(
                    "no decoder for {}",
                    extension.as_deref().unwrap_or(uri)
                ))
            })?;

        debug!("Creating decoder for {uri}");
        constructor(uri)
    }
}

impl fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut extensions: Vec<&String> = self.by_extension.keys().collect();
        extensions.sort();
        f.debug_struct("DecoderRegistry")
            .field("extensions", &extensions)
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Silence;

    impl Decoder for Silence {
        fn decode_frame(&mut self, _frame: &mut Frame) -> Result<bool> {
            Ok(false)
        }
        fn seek_absolute(&mut self, _seconds: f64) -> Result<()> {
            Ok(())
        }
        fn seek_relative(&mut self, _offset: f64) -> Result<()> {
            Ok(())
        }
        fn audio_format(&self) -> Format {
            Format::new(16, 44_100, 2)
        }
        fn duration(&self) -> f64 {
            0.0
        }
        fn progress(&self) -> f64 {
            0.0
        }
        fn frame_size(&self) -> usize {
            0
        }
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let registry = DecoderRegistry::new();
        assert!(matches!(
            registry.create("/music/track.xyz"),
            Err(Error::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_lookup_by_extension() {
        let mut registry = DecoderRegistry::new();
        registry.register("SIL", |_uri: &str| Ok(Box::new(Silence) as Box<dyn Decoder>));

        assert!(registry.supports("sil"));
        let decoder = registry.create("http://host/a/track.SIL?token=1").unwrap();
        assert_eq!(decoder.audio_format(), Format::new(16, 44_100, 2));
    }

    #[test]
    fn test_fallback_used_without_match() {
        let mut registry = DecoderRegistry::new();
        registry.set_fallback(|_uri: &str| Ok(Box::new(Silence) as Box<dyn Decoder>));
        assert!(registry.create("/music/no-extension").is_ok());
    }

    #[test]
    fn test_defaults_cover_common_formats() {
        let registry = DecoderRegistry::with_defaults();
        for ext in ["mp3", "flac", "ogg", "wav", "m4a"] {
            assert!(registry.supports(ext), "{ext}");
        }
        // The fallback still has to open the file.
        assert!(registry.create("/definitely/not/here.mp3").is_err());
    }
}
