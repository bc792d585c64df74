//! Render node facade: track loading, media server binding and playback control.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use audio_player::status::OutputStatusState;
use spotifice_types::{RenderStatus, TrackInfo};

use crate::engine::{ChunkFn, EndedHook, PlaybackEngine};
use crate::error::RenderError;
use crate::source::{ChunkSource, SourceConnector};

/// Claim value meaning no session holds the player.
const FREE: u64 = 0;

pub struct RenderService {
    render_id: String,
    engine: PlaybackEngine,
    connector: Box<dyn SourceConnector>,
    source: RwLock<Option<Arc<dyn ChunkSource>>>,
    track: RwLock<Option<TrackInfo>>,
    /// Token of the session owning the player, or [`FREE`].
    claim: Arc<AtomicU64>,
    next_claim: AtomicU64,
    /// Serializes opening and closing of this renderer's remote stream.
    gate: Arc<Mutex<()>>,
    confirm_timeout: Duration,
    output: Option<Arc<Mutex<OutputStatusState>>>,
}

impl RenderService {
    pub fn new(
        render_id: impl Into<String>,
        engine: PlaybackEngine,
        connector: Box<dyn SourceConnector>,
        confirm_timeout: Duration,
    ) -> Self {
        Self {
            render_id: render_id.into(),
            engine,
            connector,
            source: RwLock::new(None),
            track: RwLock::new(None),
            claim: Arc::new(AtomicU64::new(FREE)),
            next_claim: AtomicU64::new(1),
            gate: Arc::new(Mutex::new(())),
            confirm_timeout,
            output: None,
        }
    }

    /// Report device details from the sink's shared output status.
    pub fn with_output_status(mut self, output: Arc<Mutex<OutputStatusState>>) -> Self {
        self.output = Some(output);
        self
    }

    pub fn render_id(&self) -> &str {
        &self.render_id
    }

    pub fn engine(&self) -> &PlaybackEngine {
        &self.engine
    }

    fn source(&self) -> Option<Arc<dyn ChunkSource>> {
        self.source
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn current_track(&self) -> Option<TrackInfo> {
        self.track
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Bind to the media server at `server` after checking that it answers.
    pub fn bind_source(&self, server: &str) -> Result<(), RenderError> {
        let unreachable = |reason: String| RenderError::Unreachable {
            server: server.to_string(),
            reason,
        };
        let source = self
            .connector
            .connect(server)
            .map_err(|e| unreachable(e.to_string()))?;
        source.ping().map_err(|e| unreachable(e.to_string()))?;
        tracing::info!(server = %source.describe(), "bound to media server");
        *self.source.write().unwrap_or_else(PoisonError::into_inner) = Some(source);
        Ok(())
    }

    /// Forget the bound media server, stopping any playback that reads from it.
    pub fn unbind_source(&self) -> Result<(), RenderError> {
        if self.source().is_none() {
            return Ok(());
        }
        if self.engine.is_playing() || self.claim.load(Ordering::SeqCst) != FREE {
            self.stop()?;
        }
        *self.source.write().unwrap_or_else(PoisonError::into_inner) = None;
        tracing::info!("unbound media server");
        Ok(())
    }

    pub fn load(&self, track_id: &str) -> Result<TrackInfo, RenderError> {
        let source = self.source().ok_or(RenderError::NoSource)?;
        if self.engine.is_playing() || self.claim.load(Ordering::SeqCst) != FREE {
            return Err(RenderError::Busy);
        }
        let info = match source.track_info(track_id) {
            Ok(info) => info,
            Err(e) => {
                tracing::error!(track_id, error = %e, "error setting track");
                return Err(e.into());
            }
        };
        tracing::info!(track_id = %info.id, title = %info.title, "current track set");
        *self.track.write().unwrap_or_else(PoisonError::into_inner) = Some(info.clone());
        Ok(info)
    }

    /// Open the loaded track on the media server and start pulling it.
    pub fn play(&self) -> Result<(), RenderError> {
        let source = self.source().ok_or(RenderError::NoSource)?;
        let track = self.current_track().ok_or(RenderError::NoTrack)?;

        let token = self.next_claim.fetch_add(1, Ordering::Relaxed);
        if self
            .claim
            .compare_exchange(FREE, token, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(RenderError::Busy);
        }
        if self.engine.is_playing() {
            self.claim.store(FREE, Ordering::SeqCst);
            return Err(RenderError::Busy);
        }

        let opened = {
            let _gate = lock(&self.gate);
            source.start_stream(&track.id, &self.render_id)
        };
        if let Err(e) = opened {
            self.claim.store(FREE, Ordering::SeqCst);
            tracing::warn!(track_id = %track.id, error = %e, "failed to open remote stream");
            return Err(e.into());
        }

        let closer = StreamCloser {
            source: source.clone(),
            render_id: self.render_id.clone(),
            claim: self.claim.clone(),
            gate: self.gate.clone(),
            token,
        };
        let hook_closer = closer.clone();
        let ended: EndedHook = Box::new(move || hook_closer.close("session ended"));

        let configured = self
            .engine
            .configure(remote_chunks(source, self.render_id.clone()), Some(ended));
        if configured.is_none() || !self.engine.confirm_play_starts(self.confirm_timeout) {
            self.engine.stop(self.confirm_timeout);
            closer.close("playback not confirmed");
            return Err(RenderError::PlayNotConfirmed);
        }
        tracing::info!(track_id = %track.id, title = %track.title, "playing");
        Ok(())
    }

    /// Close the remote stream, if any, and stop the player. Idempotent.
    pub fn stop(&self) -> Result<(), RenderError> {
        let held = self.claim.load(Ordering::SeqCst);
        if let Some(source) = self.source() {
            let _gate = lock(&self.gate);
            if let Err(e) = source.stop_stream(&self.render_id) {
                tracing::warn!(error = %e, "failed to close remote stream");
            }
        }
        if !self.engine.stop(self.confirm_timeout) {
            return Err(RenderError::StopNotConfirmed);
        }
        if held != FREE {
            let _ = self
                .claim
                .compare_exchange(held, FREE, Ordering::SeqCst, Ordering::SeqCst);
        }
        tracing::info!("stopped");
        Ok(())
    }

    pub fn pause(&self) -> Result<(), RenderError> {
        self.engine.pause()?;
        Ok(())
    }

    pub fn resume(&self) -> Result<(), RenderError> {
        self.engine.resume()?;
        Ok(())
    }

    pub fn status(&self) -> RenderStatus {
        let stats = self.engine.stats();
        let mut status = RenderStatus {
            render_id: self.render_id.clone(),
            state: self.engine.state(),
            server: self.source().map(|s| s.describe()),
            track: self.current_track(),
            chunks: stats.chunks,
            bytes: stats.bytes,
            ..RenderStatus::default()
        };
        if let Some(output) = &self.output {
            let snap = output
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .snapshot();
            status.device = snap.device;
            status.sample_rate = snap.sample_rate;
            status.channels = snap.channels;
            status.elapsed_ms = snap.elapsed_ms;
            status.underrun_frames = snap.underrun_frames;
        }
        status
    }

    /// Stop playback and the engine worker.
    pub fn shutdown(&self) {
        if self.engine.is_playing() {
            if let Err(e) = self.stop() {
                tracing::warn!(error = %e, "stop on shutdown failed");
            }
        }
        self.engine.shutdown();
    }
}

/// Releases one session's claim and closes its remote stream, at most once.
#[derive(Clone)]
struct StreamCloser {
    source: Arc<dyn ChunkSource>,
    render_id: String,
    claim: Arc<AtomicU64>,
    gate: Arc<Mutex<()>>,
    token: u64,
}

impl StreamCloser {
    fn close(&self, why: &str) {
        let _gate = lock(&self.gate);
        if self.claim.load(Ordering::SeqCst) != self.token {
            return;
        }
        if let Err(e) = self.source.stop_stream(&self.render_id) {
            tracing::warn!(error = %e, reason = why, "failed to close remote stream");
        }
        let _ = self
            .claim
            .compare_exchange(self.token, FREE, Ordering::SeqCst, Ordering::SeqCst);
        tracing::debug!(reason = why, "session released");
    }
}

/// Pull chunks of this renderer's stream; an empty reply ends the session.
fn remote_chunks(source: Arc<dyn ChunkSource>, render_id: String) -> ChunkFn {
    Box::new(move |size| {
        let chunk = source.get_audio_chunk(&render_id, size)?;
        Ok((!chunk.is_empty()).then_some(chunk))
    })
}

fn lock(gate: &Mutex<()>) -> MutexGuard<'_, ()> {
    gate.lock().unwrap_or_else(PoisonError::into_inner)
}
