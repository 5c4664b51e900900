//! Playback engine: transport control over a background decode/render loop.
//!
//! One engine owns one renderer for its whole lifetime and one decoder per
//! track. Transport calls may come from any thread; decoding and queueing
//! happen on a dedicated playback thread.
//!
//! Two locks guard the shared state. The playback lock (`Shared::core`)
//! covers the renderer and everything the transport surface reports. The
//! decode lock (`Shared::decoder`) serializes decoding against seeking.
//! When both are needed the playback lock is taken first.
//!
//! Operations that raise events hold the delivery lock (`Shared::delivery`)
//! from before they take the playback lock until their events have been
//! delivered, so observers see events in the order the state changed. It
//! is reentrant: a handler may call back into the engine. It is never
//! taken while the playback or decode lock is held.

mod worker;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use cadence_core::{
    AvailableActions, EngineConfig, Error, PlaybackState, Result, Track,
};
use crossbeam_channel::Receiver;
use parking_lot::{Condvar, Mutex, ReentrantMutex};
use tracing::{debug, error, warn};

use crate::decoder::{Decoder, DecoderRegistry};
use crate::events::{EventKind, Observers, PlaybackEvent, SubscriptionId};
use crate::playlist::Playlist;
use crate::renderer::{Renderer, RendererRegistry};

/// Volume reported when sound is disabled.
const DEFAULT_VOLUME: u32 = 100;

/// State guarded by the playback lock.
struct Core {
    renderer: Option<Box<dyn Renderer>>,
    state: PlaybackState,
    actions: AvailableActions,
    current_track: Option<Track>,
    duration: f64,
    /// Last reported position in the current track.
    current_pts: f64,
    /// A seek happened while paused; the next play restarts the renderer.
    seek_occurred: bool,
    /// Set by `play` while stopped, consumed by the playback thread.
    start_requested: bool,
}

/// State shared between the engine handle and its playback thread.
struct Shared {
    playlist: Arc<dyn Playlist>,
    decoders: DecoderRegistry,
    config: EngineConfig,
    delivery: ReentrantMutex<()>,
    core: Mutex<Core>,
    wake: Condvar,
    decoder: Mutex<Option<Box<dyn Decoder>>>,
    destroy: AtomicBool,
    stop: AtomicBool,
    skip: AtomicBool,
    /// Progress is held back until the renderer reports the new track.
    new_track_started: AtomicBool,
    /// Bumped by every seek; frames decoded under an older value are dropped.
    seek_generation: AtomicU64,
    observers: Observers,
}

impl Shared {
    /// Move to `state`, queueing the resulting events. No-op when unchanged.
    fn transition(&self, core: &mut Core, state: PlaybackState, events: &mut Vec<PlaybackEvent>) {
        if core.state == state {
            return;
        }

        debug!("State changed: {} -> {state}", core.state);
        core.state = state;
        core.actions = AvailableActions::for_state(
            state,
            core.current_track.is_some(),
            self.playlist.number_of_tracks() > 0,
        );
        events.push(PlaybackEvent::StateChanged(state));
        events.push(PlaybackEvent::AvailableActionsChanged(core.actions.clone()));
    }

    fn emit_all(&self, events: &[PlaybackEvent]) {
        for event in events {
            self.observers.emit(event);
        }
    }

    /// Halt the renderer and go to Stopped. With `drain` queued audio plays
    /// out first.
    fn stop_playback(&self, drain: bool) {
        let _delivery = self.delivery.lock();
        let mut events = Vec::new();
        {
            let mut core = self.core.lock();
            let Some(renderer) = core.renderer.as_mut() else {
                return;
            };

            self.stop.store(true, Ordering::Release);
            if let Err(e) = renderer.stop(drain) {
                warn!("Failed to stop renderer: {e}");
            }

            core.start_requested = false;
            core.current_pts = 0.0;
            core.seek_occurred = false;
            self.new_track_started.store(false, Ordering::Release);
            self.transition(&mut core, PlaybackState::Stopped, &mut events);
        }
        self.emit_all(&events);
    }

    /// Report the renderer position when it moved to another whole second.
    fn send_progress_if_needed(&self) {
        let _delivery = self.delivery.lock();
        let progress = {
            let mut core = self.core.lock();
            let Some(renderer) = core.renderer.as_ref() else {
                return;
            };
            let pts = renderer.current_pts();

            // Until the renderer reports a position near the start, it is
            // still reporting the previous track.
            if pts <= worker::NEW_TRACK_WINDOW_SECS {
                self.new_track_started.store(false, Ordering::Release);
            }

            if pts as i64 == 0 || self.new_track_started.load(Ordering::Acquire) {
                return;
            }
            if pts as i64 == core.current_pts as i64 {
                return;
            }

            core.current_pts = pts;
            pts
        };

        self.observers
            .emit(&PlaybackEvent::ProgressChanged(progress));
    }
}

/// Playback engine.
///
/// Dropping the engine stops playback and joins the playback thread.
pub struct Playback {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl Playback {
    /// Create an engine with the renderer named by `config.backend` and the
    /// default decoders.
    ///
    /// When the renderer cannot be created the engine still works, with
    /// sound disabled: transport calls become no-ops.
    pub fn new(playlist: Arc<dyn Playlist>, config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let renderer = match RendererRegistry::with_defaults().create(&config) {
            Ok(renderer) => Some(renderer),
            Err(e) => {
                error!("Failed to create audio renderer, sound is disabled: {e}");
                None
            }
        };

        Self::with_components(playlist, renderer, DecoderRegistry::with_defaults(), config)
    }

    /// Create an engine from explicit components.
    pub fn with_components(
        playlist: Arc<dyn Playlist>,
        renderer: Option<Box<dyn Renderer>>,
        decoders: DecoderRegistry,
        config: EngineConfig,
    ) -> Result<Self> {
        let shared = Arc::new(Shared {
            playlist,
            decoders,
            config,
            delivery: ReentrantMutex::new(()),
            core: Mutex::new(Core {
                renderer,
                state: PlaybackState::Stopped,
                actions: AvailableActions::new(),
                current_track: None,
                duration: 0.0,
                current_pts: 0.0,
                seek_occurred: false,
                start_requested: false,
            }),
            wake: Condvar::new(),
            decoder: Mutex::new(None),
            destroy: AtomicBool::new(false),
            stop: AtomicBool::new(false),
            skip: AtomicBool::new(false),
            new_track_started: AtomicBool::new(false),
            seek_generation: AtomicU64::new(0),
            observers: Observers::new(),
        });

        if let Some(renderer) = shared.core.lock().renderer.as_mut() {
            let weak = Arc::downgrade(&shared);
            renderer.set_volume_listener(Arc::new(move |volume| {
                if let Some(shared) = weak.upgrade() {
                    let _delivery = shared.delivery.lock();
                    shared
                        .observers
                        .emit(&PlaybackEvent::VolumeChanged(volume));
                }
            }));
        }

        let worker_shared = Arc::clone(&shared);
        let thread = std::thread::Builder::new()
            .name("cadence-playback".to_string())
            .spawn(move || worker::run(&worker_shared))
            .map_err(|e| Error::Internal(format!("Failed to spawn playback thread: {e}")))?;

        Ok(Self {
            shared,
            thread: Some(thread),
        })
    }

    /// Start pulling tracks when stopped, resume when paused.
    pub fn play(&self) {
        let _delivery = self.shared.delivery.lock();
        let mut events = Vec::new();
        {
            let mut core = self.shared.core.lock();
            let core = &mut *core;
            let Some(renderer) = core.renderer.as_mut() else {
                return;
            };

            match core.state {
                PlaybackState::Playing => return,
                PlaybackState::Stopped => {
                    core.start_requested = true;
                    self.shared.wake.notify_all();
                }
                PlaybackState::Paused => {
                    let result = if std::mem::take(&mut core.seek_occurred) {
                        renderer.play()
                    } else {
                        renderer.resume()
                    };
                    if let Err(e) = result {
                        warn!("Failed to restart renderer: {e}");
                    }
                }
            }

            self.shared
                .transition(core, PlaybackState::Playing, &mut events);
        }
        self.shared.emit_all(&events);
    }

    /// Pause output. Only acts while playing.
    pub fn pause(&self) {
        let _delivery = self.shared.delivery.lock();
        let mut events = Vec::new();
        {
            let mut core = self.shared.core.lock();
            let core = &mut *core;
            if core.state != PlaybackState::Playing {
                return;
            }
            let Some(renderer) = core.renderer.as_mut() else {
                return;
            };

            if let Err(e) = renderer.pause() {
                warn!("Failed to pause renderer: {e}");
            }
            self.shared
                .transition(core, PlaybackState::Paused, &mut events);
        }
        self.shared.emit_all(&events);
    }

    /// Drop queued audio and stop. Idempotent.
    pub fn stop(&self) {
        self.shared.stop_playback(false);
    }

    /// Skip to the next playlist entry.
    pub fn next(&self) {
        let _delivery = self.shared.delivery.lock();
        let mut events = Vec::new();
        {
            let mut core = self.shared.core.lock();
            let core = &mut *core;
            if self.shared.skip.load(Ordering::Acquire) || core.state == PlaybackState::Stopped {
                return;
            }
            let Some(renderer) = core.renderer.as_mut() else {
                return;
            };

            self.shared.skip.store(true, Ordering::Release);
            if let Err(e) = renderer.stop(false) {
                warn!("Failed to stop renderer: {e}");
            }
            if let Err(e) = renderer.flush_buffers() {
                warn!("Failed to flush renderer: {e}");
            }
            self.shared
                .transition(core, PlaybackState::Playing, &mut events);
            core.current_pts = 0.0;
        }
        self.shared.emit_all(&events);
    }

    /// Track history is not kept, so there is nothing to go back to.
    pub fn prev(&self) {
        debug!("Previous track requested, not supported");
    }

    /// Jump to `seconds` in the current track.
    ///
    /// Ignored while stopped, and without a decoder or a renderer.
    pub fn seek(&self, seconds: f64) {
        let mut core = self.shared.core.lock();
        let core = &mut *core;
        // The decoder outlives `stop` until the playback thread notices.
        if core.state == PlaybackState::Stopped {
            debug!("Seek to {seconds:.2}s ignored while stopped");
            return;
        }
        let paused = core.state == PlaybackState::Paused;
        let Some(renderer) = core.renderer.as_mut() else {
            return;
        };

        {
            let mut decoder = self.shared.decoder.lock();
            let Some(decoder) = decoder.as_mut() else {
                return;
            };

            if let Err(e) = renderer.stop(false) {
                warn!("Failed to stop renderer: {e}");
            }
            if let Err(e) = renderer.flush_buffers() {
                warn!("Failed to flush renderer: {e}");
            }

            self.shared.seek_generation.fetch_add(1, Ordering::AcqRel);
            match decoder.seek_absolute(seconds) {
                Ok(()) => core.current_pts = seconds,
                Err(e) => warn!("Seek to {seconds:.2}s failed: {e}"),
            }
        }

        if paused {
            core.seek_occurred = true;
        } else if let Err(e) = renderer.play() {
            warn!("Failed to restart renderer after seek: {e}");
        }

        self.shared
            .new_track_started
            .store(false, Ordering::Release);
    }

    /// Position in the current track, in seconds.
    pub fn current_time(&self) -> f64 {
        self.shared.core.lock().current_pts
    }

    /// Length of the current track in seconds, 0 when unknown.
    pub fn duration(&self) -> f64 {
        self.shared.core.lock().duration
    }

    pub fn state(&self) -> PlaybackState {
        self.shared.core.lock().state
    }

    pub fn set_volume(&self, volume: u32) {
        let _delivery = self.shared.delivery.lock();
        let volume = {
            let mut core = self.shared.core.lock();
            let Some(renderer) = core.renderer.as_mut() else {
                return;
            };
            renderer.set_volume(volume);
            renderer.volume()
        };
        self.shared
            .observers
            .emit(&PlaybackEvent::VolumeChanged(volume));
    }

    pub fn volume(&self) -> u32 {
        self.shared
            .core
            .lock()
            .renderer
            .as_ref()
            .map_or(DEFAULT_VOLUME, |r| r.volume())
    }

    pub fn set_mute(&self, mute: bool) {
        // A renderer may report the change through its volume listener.
        let _delivery = self.shared.delivery.lock();
        if let Some(renderer) = self.shared.core.lock().renderer.as_mut() {
            renderer.set_mute(mute);
        }
    }

    pub fn is_muted(&self) -> bool {
        self.shared
            .core
            .lock()
            .renderer
            .as_ref()
            .is_some_and(|r| r.is_muted())
    }

    /// Whether the renderer is producing sound right now.
    pub fn is_playing(&self) -> bool {
        self.shared
            .core
            .lock()
            .renderer
            .as_ref()
            .is_some_and(|r| r.is_playing())
    }

    /// The track started last, if any.
    pub fn track(&self) -> Option<Track> {
        self.shared.core.lock().current_track.clone()
    }

    pub fn available_actions(&self) -> AvailableActions {
        self.shared.core.lock().actions.clone()
    }

    /// Call `handler` for every event of `kind`.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&PlaybackEvent) + Send + Sync + 'static,
    {
        self.shared.observers.subscribe(kind, handler)
    }

    pub fn subscribe_all<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&PlaybackEvent) + Send + Sync + 'static,
    {
        self.shared.observers.subscribe_all(handler)
    }

    /// Receive every event through a channel.
    pub fn events(&self) -> (SubscriptionId, Receiver<PlaybackEvent>) {
        self.shared.observers.channel()
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.observers.unsubscribe(id)
    }
}

impl Drop for Playback {
    fn drop(&mut self) {
        self.stop();

        {
            let _core = self.shared.core.lock();
            self.shared.destroy.store(true, Ordering::Release);
            self.shared.wake.notify_all();
        }

        if let Some(thread) = self.thread.take() {
            debug!("Waiting for playback thread");
            if thread.join().is_err() {
                error!("Playback thread panicked");
            }
        }
    }
}
