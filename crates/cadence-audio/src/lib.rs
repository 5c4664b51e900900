//! # cadence-audio
//!
//! Playback engine for Cadence.
//!
//! Features:
//! - Background decode/render loop with transport control and events
//! - Symphonia-based decoding for local files and HTTP streams
//! - Low-latency cpal output over a lock-free ring buffer

pub mod buffer;
pub mod decoder;
pub mod engine;
pub mod events;
pub mod playlist;
pub mod reader;
pub mod renderer;

pub use decoder::{Decoder, DecoderRegistry, SymphoniaDecoder};
pub use engine::Playback;
pub use events::{EventKind, Observers, PlaybackEvent, SubscriptionId};
pub use playlist::{Playlist, QueuePlaylist};
pub use reader::{open_reader, Reader};
pub use renderer::{CpalRenderer, NullRenderer, Renderer, RendererRegistry};
