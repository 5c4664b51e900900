//! Core domain types for Cadence.

pub mod format;
pub mod frame;
pub mod state;
pub mod track;

pub use format::Format;
pub use frame::Frame;
pub use state::{AvailableActions, PlaybackAction, PlaybackState};
pub use track::Track;
