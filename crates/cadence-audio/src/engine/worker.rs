//! The playback thread: pulls tracks, decodes frames and feeds the renderer.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;

use cadence_core::{Frame, PlaybackState, Result};
use tracing::{debug, error, info, warn};

use super::Shared;
use crate::events::PlaybackEvent;

/// A renderer position at or below this many seconds belongs to the track
/// that was just started.
pub(super) const NEW_TRACK_WINDOW_SECS: f64 = 2.0;

/// Thread body. Idles until `play` requests a session, then runs it.
pub(super) fn run(shared: &Shared) {
    debug!("Playback thread started");

    loop {
        {
            let mut core = shared.core.lock();
            while !core.start_requested && !shared.destroy.load(Ordering::Acquire) {
                shared.wake.wait(&mut core);
            }
            if shared.destroy.load(Ordering::Acquire) {
                break;
            }

            core.start_requested = false;
            shared.stop.store(false, Ordering::Release);
            shared.skip.store(false, Ordering::Release);
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| Session::new(shared).run()));
        match outcome {
            Ok(Ok(())) => debug!("Playback session finished"),
            Ok(Err(e)) => {
                error!("Playback failed: {e}");
                shared.stop_playback(false);
            }
            Err(_) => {
                error!("Playback session panicked");
                shared.stop_playback(false);
            }
        }

        *shared.decoder.lock() = None;
    }

    debug!("Playback thread exiting");
}

/// One run of the decode/render loop, from `play` until the playlist runs
/// out or playback is stopped.
struct Session<'a> {
    shared: &'a Shared,
    frame: Frame,
    /// The renderer has not been started for the current track yet.
    first_frame: bool,
    /// Frames were queued since the current track started.
    queued: bool,
}

impl<'a> Session<'a> {
    fn new(shared: &'a Shared) -> Self {
        Self {
            shared,
            frame: Frame::new(),
            first_frame: true,
            queued: false,
        }
    }

    fn stop_requested(&self) -> bool {
        self.shared.stop.load(Ordering::Acquire)
    }

    fn skip_requested(&self) -> bool {
        self.shared.skip.load(Ordering::Acquire)
    }

    fn run(&mut self) -> Result<()> {
        if !self.start_new_track() {
            return Ok(());
        }

        while !self.stop_requested() {
            let end_of_stream = self.fill_renderer()?;

            if self.skip_requested() {
                if !self.start_new_track() {
                    return Ok(());
                }
                continue;
            }
            if self.stop_requested() {
                break;
            }

            if self.first_frame && self.queued {
                self.first_frame = false;
                self.start_renderer();
            }

            self.shared.send_progress_if_needed();

            if end_of_stream && !self.start_new_track() {
                return Ok(());
            }

            self.flush_and_wait();
        }

        Ok(())
    }

    /// Dequeue tracks until one opens. Returns false when the session is
    /// over, either because playback was stopped or the playlist ran out.
    fn start_new_track(&mut self) -> bool {
        let shared = self.shared;

        loop {
            if self.stop_requested() {
                return false;
            }

            let Some(track) = shared.playlist.dequeue_next_track() else {
                info!("Playlist finished");
                self.wait_for_drain();
                if !self.stop_requested() {
                    shared.stop_playback(true);
                }
                return false;
            };

            let (format, duration) = {
                let mut slot = shared.decoder.lock();
                *slot = None;
                match shared.decoders.create(track.uri()) {
                    Ok(decoder) => {
                        let info = (decoder.audio_format(), decoder.duration());
                        *slot = Some(decoder);
                        info
                    }
                    Err(e) if e.is_skippable() => {
                        warn!("Skipping {track}: {e}");
                        continue;
                    }
                    Err(e) => {
                        error!("Failed to open {track}: {e}");
                        continue;
                    }
                }
            };

            let _delivery = shared.delivery.lock();
            {
                let mut core = shared.core.lock();
                let Some(renderer) = core.renderer.as_mut() else {
                    return false;
                };
                if let Err(e) = renderer.set_format(format) {
                    error!("Renderer rejected {format} for {track}: {e}");
                    drop(core);
                    *shared.decoder.lock() = None;
                    continue;
                }

                core.current_pts = 0.0;
                if duration > 0.0 {
                    core.duration = duration;
                }
                core.current_track = Some(track.clone());
                shared.skip.store(false, Ordering::Release);
                shared.new_track_started.store(true, Ordering::Release);
            }

            info!("Playing {track} ({format})");
            self.first_frame = true;
            self.queued = false;
            self.frame.clear();
            shared.observers.emit(&PlaybackEvent::NewTrackStarted(track));
            return true;
        }
    }

    /// Let staged audio play out, taking the playback lock only to poll.
    fn wait_for_drain(&self) {
        let shared = self.shared;

        while !self.stop_requested() {
            let pause = {
                let mut core = shared.core.lock();
                let state = core.state;
                let Some(renderer) = core.renderer.as_mut() else {
                    return;
                };
                if let Err(e) = renderer.flush_buffers() {
                    warn!("Failed to flush renderer: {e}");
                }

                let remaining = renderer.buffer_duration();
                match state {
                    // Staged audio waits for `play`.
                    PlaybackState::Paused => shared.config.pacing_sleep(remaining),
                    PlaybackState::Playing if remaining > 0.0 && renderer.is_playing() => {
                        shared.config.pacing_sleep(remaining)
                    }
                    _ => return,
                }
            };

            std::thread::sleep(pause);
        }
    }

    /// Decode and queue frames while the renderer has room.
    ///
    /// Returns true when the decoder reached the end of the track.
    fn fill_renderer(&mut self) -> Result<bool> {
        let shared = self.shared;

        loop {
            if self.stop_requested() || self.skip_requested() {
                return Ok(false);
            }

            {
                let core = shared.core.lock();
                if core.state == PlaybackState::Paused {
                    return Ok(false);
                }
                let Some(renderer) = core.renderer.as_ref() else {
                    return Ok(false);
                };
                if !renderer.has_buffer_space(self.frame.data_size()) {
                    return Ok(false);
                }
            }

            let (decoded, generation) = {
                let mut decoder = shared.decoder.lock();
                let generation = shared.seek_generation.load(Ordering::Acquire);
                let decoded = match decoder.as_mut() {
                    Some(decoder) => decoder.decode_frame(&mut self.frame).unwrap_or_else(|e| {
                        warn!("Decoding failed, ending track: {e}");
                        false
                    }),
                    None => false,
                };
                (decoded, generation)
            };

            if !decoded {
                return Ok(true);
            }

            let mut core = shared.core.lock();
            if core.state == PlaybackState::Paused || self.stop_requested() || self.skip_requested() {
                return Ok(false);
            }
            // Decoded before a seek: the position it belongs to is gone.
            if shared.seek_generation.load(Ordering::Acquire) != generation {
                continue;
            }
            if let Some(renderer) = core.renderer.as_mut() {
                renderer.queue_frame(&self.frame)?;
                self.queued = true;
            }
        }
    }

    fn start_renderer(&self) {
        let mut core = self.shared.core.lock();
        if core.state != PlaybackState::Playing {
            return;
        }
        if let Some(renderer) = core.renderer.as_mut() {
            if let Err(e) = renderer.play() {
                warn!("Failed to start renderer: {e}");
            }
        }
    }

    /// Push staged audio to the device, then wait for it to drain a little.
    fn flush_and_wait(&self) {
        let shared = self.shared;
        let pause = {
            let mut core = shared.core.lock();
            let playing = core.state == PlaybackState::Playing;
            let Some(renderer) = core.renderer.as_mut() else {
                return;
            };

            if let Err(e) = renderer.flush_buffers() {
                warn!("Failed to flush renderer: {e}");
            }

            if playing && !renderer.is_playing() {
                debug!("Renderer idle while playing, restarting it");
                if let Err(e) = renderer.play() {
                    warn!("Failed to restart renderer: {e}");
                }
                shared.config.pacing_sleep(0.0)
            } else {
                shared.config.pacing_sleep(renderer.buffer_duration())
            }
        };

        std::thread::sleep(pause);
    }
}
