//! Playback state and transport actions.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Playback state of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stopped => "Stopped",
            Self::Playing => "Playing",
            Self::Paused => "Paused",
        })
    }
}

/// Transport action a UI may offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PlaybackAction {
    Play,
    Pause,
    Stop,
    Prev,
    Next,
}

impl fmt::Display for PlaybackAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Play => "Play",
            Self::Pause => "Pause",
            Self::Stop => "Stop",
            Self::Prev => "Previous",
            Self::Next => "Next",
        })
    }
}

/// Set of actions that make sense in the current state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableActions(BTreeSet<PlaybackAction>);

impl AvailableActions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Actions offered in `state`.
    ///
    /// `track_loaded` tells whether a track was ever started, `tracks_queued`
    /// whether the playlist still has entries.
    pub fn for_state(state: PlaybackState, track_loaded: bool, tracks_queued: bool) -> Self {
        let mut actions = BTreeSet::new();
        match state {
            PlaybackState::Playing => {
                actions.insert(PlaybackAction::Stop);
                actions.insert(PlaybackAction::Pause);
                if tracks_queued {
                    actions.insert(PlaybackAction::Next);
                }
            }
            PlaybackState::Paused => {
                actions.insert(PlaybackAction::Stop);
                actions.insert(PlaybackAction::Play);
            }
            PlaybackState::Stopped => {
                if track_loaded {
                    actions.insert(PlaybackAction::Play);
                }
            }
        }
        Self(actions)
    }

    pub fn contains(&self, action: PlaybackAction) -> bool {
        self.0.contains(&action)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = PlaybackAction> + '_ {
        self.0.iter().copied()
    }

    pub fn is_subset(&self, other: &Self) -> bool {
        self.0.is_subset(&other.0)
    }
}

impl FromIterator<PlaybackAction> for AvailableActions {
    fn from_iter<I: IntoIterator<Item = PlaybackAction>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for AvailableActions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_playback_state_default() {
        assert_eq!(PlaybackState::default(), PlaybackState::Stopped);
    }

    #[test]
    fn test_playing_actions() {
        let actions = AvailableActions::for_state(PlaybackState::Playing, true, true);
        assert_eq!(
            actions,
            [PlaybackAction::Stop, PlaybackAction::Pause, PlaybackAction::Next]
                .into_iter()
                .collect()
        );

        let last_track = AvailableActions::for_state(PlaybackState::Playing, true, false);
        assert!(!last_track.contains(PlaybackAction::Next));
        assert_eq!(last_track.len(), 2);
    }

    #[test]
    fn test_paused_actions() {
        let actions = AvailableActions::for_state(PlaybackState::Paused, true, true);
        assert_eq!(
            actions,
            [PlaybackAction::Stop, PlaybackAction::Play].into_iter().collect()
        );
    }

    #[test]
    fn test_stopped_actions() {
        assert!(AvailableActions::for_state(PlaybackState::Stopped, false, true).is_empty());
        let actions = AvailableActions::for_state(PlaybackState::Stopped, true, false);
        assert_eq!(actions, [PlaybackAction::Play].into_iter().collect());
    }

    fn any_state() -> impl Strategy<Value = PlaybackState> {
        prop_oneof![
            Just(PlaybackState::Stopped),
            Just(PlaybackState::Playing),
            Just(PlaybackState::Paused),
        ]
    }

    proptest! {
        #[test]
        fn prop_actions_never_offer_current_transition(
            state in any_state(),
            track_loaded in any::<bool>(),
            tracks_queued in any::<bool>(),
        ) {
            let actions = AvailableActions::for_state(state, track_loaded, tracks_queued);
            prop_assert!(!actions.contains(PlaybackAction::Prev));
            match state {
                PlaybackState::Playing => prop_assert!(!actions.contains(PlaybackAction::Play)),
                PlaybackState::Paused => prop_assert!(!actions.contains(PlaybackAction::Pause)),
                PlaybackState::Stopped => prop_assert!(!actions.contains(PlaybackAction::Stop)),
            }
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(PlaybackAction::Prev.to_string(), "Previous");
        let actions = AvailableActions::for_state(PlaybackState::Paused, true, false);
        assert_eq!(actions.to_string(), "[Play, Stop]");
    }
}
