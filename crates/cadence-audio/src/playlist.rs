//! Source of tracks for the playback engine.

use std::collections::VecDeque;

use cadence_core::Track;
use parking_lot::Mutex;

/// Supplies tracks to the engine.
///
/// The engine only ever dequeues; adding tracks is up to the owner.
pub trait Playlist: Send + Sync {
    fn dequeue_next_track(&self) -> Option<Track>;

    /// Tracks still waiting to be played.
    fn number_of_tracks(&self) -> usize;
}

/// First-in first-out playlist.
#[derive(Debug, Default)]
pub struct QueuePlaylist {
    tracks: Mutex<VecDeque<Track>>,
}

impl QueuePlaylist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_track(&self, track: Track) {
        self.tracks.lock().push_back(track);
    }

    /// Append several tracks in order.
    pub fn extend(&self, tracks: impl IntoIterator<Item = Track>) {
        self.tracks.lock().extend(tracks);
    }

    pub fn clear(&self) {
        self.tracks.lock().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.lock().is_empty()
    }
}

impl FromIterator<Track> for QueuePlaylist {
    fn from_iter<I: IntoIterator<Item = Track>>(iter: I) -> Self {
        Self {
            tracks: Mutex::new(iter.into_iter().collect()),
        }
    }
}

impl Playlist for QueuePlaylist {
    fn dequeue_next_track(&self) -> Option<Track> {
        self.tracks.lock().pop_front()
    }

    fn number_of_tracks(&self) -> usize {
        self.tracks.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let playlist: QueuePlaylist = ["a.mp3", "b.mp3"].into_iter().map(Track::new).collect();
        playlist.add_track(Track::new("c.mp3"));
        assert_eq!(playlist.number_of_tracks(), 3);

        let order: Vec<String> = std::iter::from_fn(|| playlist.dequeue_next_track())
            .map(|t| t.uri().to_string())
            .collect();
        assert_eq!(order, ["a.mp3", "b.mp3", "c.mp3"]);
        assert!(playlist.is_empty());
    }

    #[test]
    fn test_extend_and_clear() {
        let playlist = QueuePlaylist::new();
        playlist.extend([Track::new("x.flac"), Track::new("y.flac")]);
        assert_eq!(playlist.number_of_tracks(), 2);

        playlist.clear();
        assert_eq!(playlist.dequeue_next_track(), None);
    }
}
