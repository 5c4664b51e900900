//! Engine events and their subscribers.
//!
//! Delivery is synchronous on the thread raising the event. Progress,
//! new-track and loop-driven state changes arrive on the playback thread;
//! transport-driven state changes and volume changes on the caller's
//! thread. Handlers therefore must be `Send + Sync`.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::fmt;
use std::sync::Arc;

use cadence_core::{AvailableActions, PlaybackState, Track};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::RwLock;
use tracing::trace;
use uuid::Uuid;

/// Events emitted by the playback engine.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    /// Playback state changed.
    StateChanged(PlaybackState),
    /// The set of sensible transport actions changed.
    AvailableActionsChanged(AvailableActions),
    /// Position in the current track, whole seconds.
    ProgressChanged(f64),
    /// Volume (0 to 100).
    VolumeChanged(u32),
    /// A track started decoding.
    NewTrackStarted(Track),
}

impl PlaybackEvent {
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::StateChanged(_) => EventKind::StateChanged,
            Self::AvailableActionsChanged(_) => EventKind::AvailableActionsChanged,
            Self::ProgressChanged(_) => EventKind::ProgressChanged,
            Self::VolumeChanged(_) => EventKind::VolumeChanged,
            Self::NewTrackStarted(_) => EventKind::NewTrackStarted,
        }
    }
}

/// Discriminant of [`PlaybackEvent`], used to filter subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    StateChanged,
    AvailableActionsChanged,
    ProgressChanged,
    VolumeChanged,
    NewTrackStarted,
}

/// Handle returned by a subscription, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

type Handler = Arc<dyn Fn(&PlaybackEvent) + Send + Sync>;

#[derive(Clone)]
enum Sink {
    Handler(Handler),
    Channel(Sender<PlaybackEvent>),
}

struct Subscriber {
    id: SubscriptionId,
    kind: Option<EventKind>,
    sink: Sink,
}

/// Subscription list for engine events.
#[derive(Default)]
pub struct Observers {
    subscribers: RwLock<Vec<Subscriber>>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Call `handler` for every event of `kind`.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&PlaybackEvent) + Send + Sync + 'static,
    {
        self.add(Some(kind), Sink::Handler(Arc::new(handler)))
    }

    /// Call `handler` for every event.
    pub fn subscribe_all<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&PlaybackEvent) + Send + Sync + 'static,
    {
        self.add(None, Sink::Handler(Arc::new(handler)))
    }

    /// Forward every event into a channel.
    ///
    /// The subscription ends with the first event emitted after the
    /// receiver is dropped.
    pub fn channel(&self) -> (SubscriptionId, Receiver<PlaybackEvent>) {
        let (tx, rx) = unbounded();
        (self.add(None, Sink::Channel(tx)), rx)
    }

    /// Returns false when `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        subscribers.len() != before
    }

    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.read().is_empty()
    }

    /// Deliver `event` to matching subscribers, in subscription order.
    ///
    /// Handlers run without the list lock held and may subscribe or
    /// unsubscribe.
    pub fn emit(&self, event: &PlaybackEvent) {
        let kind = event.kind();
        let sinks: Vec<(SubscriptionId, Sink)> = self
            .subscribers
            .read()
            .iter()
            .filter(|s| s.kind.map_or(true, |k| k == kind))
            .map(|s| (s.id, s.sink.clone()))
            .collect();

        trace!("Emitting {event:?} to {} subscribers", sinks.len());
        let mut disconnected = Vec::new();
        for (id, sink) in sinks {
            match sink {
                Sink::Handler(handler) => handler(event),
                Sink::Channel(tx) => {
                    if tx.send(event.clone()).is_err() {
                        disconnected.push(id);
                    }
                }
            }
        }

        if !disconnected.is_empty() {
            trace!("Dropping {} disconnected channels", disconnected.len());
            self.subscribers
                .write()
                .retain(|s| !disconnected.contains(&s.id));
        }
    }

    fn add(&self, kind: Option<EventKind>, sink: Sink) -> SubscriptionId {
        let id = SubscriptionId(Uuid::new_v4());
        self.subscribers.write().push(Subscriber { id, kind, sink });
        id
    }
}

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("subscribers", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_kind_filter() {
        let observers = Observers::new();
        let volume_events = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&volume_events);
        observers.subscribe(EventKind::VolumeChanged, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        observers.emit(&PlaybackEvent::VolumeChanged(40));
        observers.emit(&PlaybackEvent::ProgressChanged(3.0));
        assert_eq!(volume_events.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe() {
        let observers = Observers::new();
        let (id, rx) = observers.channel();

        observers.emit(&PlaybackEvent::StateChanged(PlaybackState::Playing));
        assert!(observers.unsubscribe(id));
        assert!(!observers.unsubscribe(id));
        observers.emit(&PlaybackEvent::StateChanged(PlaybackState::Stopped));

        let received: Vec<PlaybackEvent> = rx.try_iter().collect();
        assert_eq!(
            received,
            vec![PlaybackEvent::StateChanged(PlaybackState::Playing)]
        );
        assert!(observers.is_empty());
    }

    #[test]
    fn test_dropped_channel_is_removed() {
        let observers = Observers::new();
        let (_, kept) = observers.channel();
        let (_, dropped) = observers.channel();
        assert_eq!(observers.len(), 2);

        drop(dropped);
        observers.emit(&PlaybackEvent::VolumeChanged(70));

        assert_eq!(observers.len(), 1);
        assert_eq!(kept.try_recv().unwrap(), PlaybackEvent::VolumeChanged(70));
    }

    #[test]
    fn test_handler_may_unsubscribe_itself() {
        let observers = Arc::new(Observers::new());
        let slot: Arc<parking_lot::Mutex<Option<SubscriptionId>>> = Arc::default();

        let inner_observers = Arc::clone(&observers);
        let inner_slot = Arc::clone(&slot);
        let id = observers.subscribe_all(move |_| {
            if let Some(id) = *inner_slot.lock() {
                inner_observers.unsubscribe(id);
            }
        });
        *slot.lock() = Some(id);

        observers.emit(&PlaybackEvent::VolumeChanged(10));
        assert!(observers.is_empty());
    }
}
