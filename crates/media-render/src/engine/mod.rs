//! Playback engine.
//!
//! One worker thread owns every sink transition. Callers enqueue commands and, when
//! they need to know the outcome, block on the play/stop confirmations with a timeout.
//! The sink pulls data on its own thread through the handler installed for the active
//! session; exhaustion and pipeline errors are turned into session-tagged stop
//! commands on the same queue, so the worker stays the only place that tears sinks down.

mod command;
mod confirm;
mod stats;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use audio_player::{PipelineState, Sink, SinkEvent, SinkEventHandler};
use crossbeam_channel::{Receiver, Sender};
use spotifice_types::PlaybackState;

pub use command::{ChunkFn, EndedHook, SessionId};
pub use stats::{EngineStats, StatsSnapshot};

use command::{Command, SessionSpec};
use confirm::Confirmations;
use stats::RateMeter;

/// Pull size used when the sink gives no length hint.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Default wait for play/stop confirmations.
pub const DEFAULT_CONFIRM_TIMEOUT: Duration = Duration::from_secs(2);

/// Builds a fresh sink for every session.
pub type SinkFactory = Box<dyn Fn() -> Result<Box<dyn Sink>> + Send>;

type SinkSlot = Arc<Mutex<Option<Box<dyn Sink>>>>;

#[derive(Debug)]
pub enum EngineError {
    /// Pause/resume without a confirmed play.
    NotPlaying,
    /// The sink rejected a state change.
    Sink(anyhow::Error),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::NotPlaying => f.write_str("not playing"),
            EngineError::Sink(e) => write!(f, "sink error: {e:#}"),
        }
    }
}

impl std::error::Error for EngineError {}

#[derive(Clone, Copy, Debug, Default)]
pub struct EngineOptions {
    /// Log per-chunk throughput at info level instead of debug.
    pub verbose_stats: bool,
}

pub struct PlaybackEngine {
    cmd_tx: Sender<Command>,
    confirm: Arc<Confirmations>,
    sink: SinkSlot,
    stats: Arc<EngineStats>,
    /// Next session id; held while a configure is enqueued so ids reach the worker in order.
    next_session: Mutex<SessionId>,
    closed: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl PlaybackEngine {
    /// Spawn the engine worker.
    pub fn new(factory: SinkFactory, options: EngineOptions) -> Result<Self> {
        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
        let confirm = Arc::new(Confirmations::new());
        let sink: SinkSlot = Arc::new(Mutex::new(None));
        let stats = Arc::new(EngineStats::default());

        let worker = Worker {
            factory,
            options,
            cmd_tx: cmd_tx.clone(),
            confirm: confirm.clone(),
            sink: sink.clone(),
            stats: stats.clone(),
            active: None,
            applied: 0,
        };
        let handle = thread::Builder::new()
            .name("playback-engine".into())
            .spawn(move || worker.run(cmd_rx))
            .context("spawn playback engine worker")?;

        Ok(Self {
            cmd_tx,
            confirm,
            sink,
            stats,
            next_session: Mutex::new(1),
            closed: AtomicBool::new(false),
            worker: Mutex::new(Some(handle)),
        })
    }

    fn sink_slot(&self) -> MutexGuard<'_, Option<Box<dyn Sink>>> {
        self.sink.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a new session pulling from `chunk_fn`.
    ///
    /// Returns the session id, or `None` once the engine has been shut down.
    pub fn configure(&self, chunk_fn: ChunkFn, ended_hook: Option<EndedHook>) -> Option<SessionId> {
        if self.closed.load(Ordering::SeqCst) {
            tracing::warn!("configure ignored: engine shut down");
            return None;
        }
        let mut next = self
            .next_session
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let id = *next;
        *next += 1;
        self.confirm.begin_pending(id);
        let spec = SessionSpec {
            id,
            chunk_fn,
            ended_hook,
        };
        if self.cmd_tx.send(Command::Configured(spec)).is_err() {
            tracing::warn!(session = id, "configure ignored: engine worker gone");
            self.confirm.close();
            return None;
        }
        drop(next);
        tracing::debug!(session = id, "session configured");
        Some(id)
    }

    /// Stop the active session and wait for confirmation.
    ///
    /// Returns `true` at once when the engine is idle with no session queued. A stop
    /// that times out stays queued.
    pub fn stop(&self, timeout: Duration) -> bool {
        if self.confirm.is_stopped() {
            return true;
        }
        if self.cmd_tx.send(Command::StopRequested { session: None }).is_err() {
            self.confirm.close();
            return true;
        }
        let confirmed = self.confirm.wait_stop(timeout);
        tracing::debug!(confirmed, "stop confirmation");
        confirmed
    }

    pub fn pause(&self) -> Result<(), EngineError> {
        self.set_live_state(PipelineState::Paused)
    }

    pub fn resume(&self) -> Result<(), EngineError> {
        self.set_live_state(PipelineState::Playing)
    }

    fn set_live_state(&self, state: PipelineState) -> Result<(), EngineError> {
        if !self.confirm.is_playing() {
            return Err(EngineError::NotPlaying);
        }
        let mut slot = self.sink_slot();
        let sink = slot.as_mut().ok_or(EngineError::NotPlaying)?;
        sink.set_state(state).map_err(EngineError::Sink)?;
        tracing::info!(state = ?state, "playback state changed");
        Ok(())
    }

    /// Wait until the last configured session is playing, or settles as stopped.
    pub fn confirm_play_starts(&self, timeout: Duration) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        let confirmed = self.confirm.wait_play(timeout);
        tracing::debug!(confirmed, "play confirmation");
        confirmed
    }

    pub fn is_playing(&self) -> bool {
        self.confirm.is_playing()
    }

    pub fn state(&self) -> PlaybackState {
        match self.sink_slot().as_ref().map(|s| s.state()) {
            Some(PipelineState::Playing) => PlaybackState::Playing,
            Some(PipelineState::Paused) => PlaybackState::Paused,
            Some(PipelineState::Null) | None => PlaybackState::Stopped,
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Stop if playing, then stop the worker and join it. Idempotent.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let Some(handle) = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return;
        };
        if self.is_playing() {
            self.stop(DEFAULT_CONFIRM_TIMEOUT);
        }
        let _ = self.cmd_tx.send(Command::ShutdownRequested);
        if handle.join().is_err() {
            tracing::error!("playback engine worker panicked");
        }
        tracing::info!("playback engine shut down");
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct ActiveSession {
    id: SessionId,
    ended_hook: Option<EndedHook>,
}

struct Worker {
    factory: SinkFactory,
    options: EngineOptions,
    cmd_tx: Sender<Command>,
    confirm: Arc<Confirmations>,
    sink: SinkSlot,
    stats: Arc<EngineStats>,
    active: Option<ActiveSession>,
    /// Last session id taken off the queue.
    applied: SessionId,
}

impl Worker {
    fn run(mut self, cmd_rx: Receiver<Command>) {
        while let Ok(cmd) = cmd_rx.recv() {
            tracing::debug!(command = ?cmd, "engine command");
            match cmd {
                Command::Configured(spec) => self.start_session(spec),
                Command::StopRequested { session } => {
                    let active_id = self.active.as_ref().map(|a| a.id);
                    if session.is_some() && session != active_id {
                        tracing::debug!(session = ?session, active = ?active_id, "stale stop ignored");
                        continue;
                    }
                    self.end_session(session.is_some());
                    self.confirm.confirm_stopped(self.applied);
                }
                Command::ShutdownRequested => break,
            }
        }
        self.end_session(false);
        self.confirm.close();
    }

    fn start_session(&mut self, spec: SessionSpec) {
        self.applied = spec.id;
        if self.active.is_some() {
            tracing::info!(session = spec.id, "replacing active session");
            self.end_session(false);
        }

        let SessionSpec {
            id,
            chunk_fn,
            ended_hook,
        } = spec;

        let handler = self.data_handler(id, chunk_fn);
        match self.build_sink(handler) {
            Ok(sink) => {
                *self.sink.lock().unwrap_or_else(PoisonError::into_inner) = Some(sink);
                self.active = Some(ActiveSession { id, ended_hook });
                self.confirm.confirm_playing(id);
                tracing::info!(session = id, "playing");
            }
            Err(e) => {
                tracing::warn!(session = id, error = %format!("{e:#}"), "failed to start sink");
                self.confirm.confirm_stopped(id);
                if let Some(hook) = ended_hook {
                    spawn_ended_hook(id, hook);
                }
            }
        }
    }

    fn build_sink(&self, handler: SinkEventHandler) -> Result<Box<dyn Sink>> {
        let mut sink = (self.factory)().context("create sink")?;
        sink.connect(handler);
        if let Err(e) = sink.set_state(PipelineState::Playing) {
            sink.disconnect();
            let _ = sink.set_state(PipelineState::Null);
            return Err(e).context("start sink");
        }
        Ok(sink)
    }

    /// Tear down the live sink, if any, and schedule the session's ended hook.
    ///
    /// `ended_itself` lets the sink play out what it buffered after end-of-stream.
    fn end_session(&mut self, ended_itself: bool) {
        self.confirm.revoke_play();
        let sink = self
            .sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut sink) = sink {
            sink.disconnect();
            let stopped = if ended_itself {
                sink.finish()
            } else {
                sink.set_state(PipelineState::Null)
            };
            if let Err(e) = stopped {
                tracing::warn!(error = %format!("{e:#}"), "sink stop failed");
            }
        }
        if let Some(active) = self.active.take() {
            tracing::info!(session = active.id, "stopped");
            if let Some(hook) = active.ended_hook {
                spawn_ended_hook(active.id, hook);
            }
        }
    }

    fn data_handler(&self, session: SessionId, chunk_fn: ChunkFn) -> SinkEventHandler {
        let cmd_tx = self.cmd_tx.clone();
        let stats = self.stats.clone();
        let mut meter = RateMeter::new(self.options.verbose_stats);
        let mut ended = false;

        Box::new(move |event, feed| {
            if ended {
                return;
            }
            match event {
                SinkEvent::NeedData { length } => {
                    let size = if length == 0 { DEFAULT_CHUNK_SIZE } else { length };
                    match chunk_fn(size) {
                        Ok(Some(bytes)) if bytes.is_empty() => {}
                        Ok(Some(bytes)) => {
                            stats.record(bytes.len());
                            meter.record(bytes.len());
                            feed.push(&bytes);
                        }
                        Ok(None) => {
                            tracing::info!(session, "stream exhausted");
                            ended = true;
                        }
                        Err(e) => {
                            tracing::warn!(session, error = %format!("{e:#}"), "chunk pull failed");
                            ended = true;
                        }
                    }
                    if ended {
                        feed.end_of_stream();
                        let _ = cmd_tx.send(Command::StopRequested {
                            session: Some(session),
                        });
                    }
                }
                SinkEvent::Error { message } => {
                    tracing::warn!(session, error = %message, "sink error");
                    ended = true;
                    let _ = cmd_tx.send(Command::StopRequested {
                        session: Some(session),
                    });
                }
            }
        })
    }
}

fn spawn_ended_hook(session: SessionId, hook: EndedHook) {
    let spawned = thread::Builder::new()
        .name("session-ended".into())
        .spawn(hook);
    if let Err(e) = spawned {
        tracing::error!(session, error = %e, "failed to run ended hook");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{SinkProbe, fake_factory, wait_until};
    use std::sync::atomic::AtomicUsize;

    const WAIT: Duration = Duration::from_secs(2);

    fn engine(probe: &Arc<SinkProbe>) -> PlaybackEngine {
        PlaybackEngine::new(fake_factory(probe.clone()), EngineOptions::default()).unwrap()
    }

    /// Source of `chunks` chunks of the requested size, then exhaustion.
    fn finite_source(chunks: usize, sizes: Arc<Mutex<Vec<usize>>>) -> ChunkFn {
        let served = AtomicUsize::new(0);
        Box::new(move |size| {
            sizes.lock().unwrap().push(size);
            if served.fetch_add(1, Ordering::SeqCst) < chunks {
                Ok(Some(vec![1u8; size]))
            } else {
                Ok(None)
            }
        })
    }

    fn endless_source(calls: Arc<AtomicUsize>) -> ChunkFn {
        Box::new(move |size| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(vec![0u8; size]))
        })
    }

    fn ended_signal() -> (EndedHook, Receiver<()>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let hook: EndedHook = Box::new(move || {
            let _ = tx.send(());
        });
        (hook, rx)
    }

    fn counting_hook(count: Arc<AtomicUsize>) -> EndedHook {
        Box::new(move || {
            count.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn stop_without_configure_is_immediate() {
        let probe = Arc::new(SinkProbe::default());
        let engine = engine(&probe);
        for _ in 0..3 {
            assert!(engine.stop(Duration::from_millis(1)));
        }
        assert_eq!(engine.state(), PlaybackState::Stopped);
        assert_eq!(probe.created.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn finite_source_ends_session_by_itself() {
        let probe = Arc::new(SinkProbe::default());
        let engine = engine(&probe);
        let sizes = Arc::new(Mutex::new(Vec::new()));
        let hook_calls = Arc::new(AtomicUsize::new(0));

        let session = engine.configure(
            finite_source(3, sizes.clone()),
            Some(counting_hook(hook_calls.clone())),
        );
        assert!(session.is_some());
        assert!(engine.confirm_play_starts(WAIT));

        assert!(wait_until(WAIT, || hook_calls.load(Ordering::SeqCst) == 1));
        assert!(wait_until(WAIT, || !engine.is_playing()));
        assert!(engine.stop(Duration::from_millis(1)));
        assert_eq!(engine.state(), PlaybackState::Stopped);
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(hook_calls.load(Ordering::SeqCst), 1);

        let stats = engine.stats();
        assert_eq!(stats.chunks, 3);
        assert_eq!(stats.bytes, 3 * DEFAULT_CHUNK_SIZE as u64);
        assert!(sizes.lock().unwrap().iter().all(|s| *s == DEFAULT_CHUNK_SIZE));
        assert_eq!(probe.live(), 0);
    }

    #[test]
    fn pause_and_resume_require_confirmed_play() {
        let probe = Arc::new(SinkProbe::default());
        let engine = engine(&probe);
        assert!(matches!(engine.pause(), Err(EngineError::NotPlaying)));
        assert!(matches!(engine.resume(), Err(EngineError::NotPlaying)));
    }

    #[test]
    fn pause_and_resume_flip_live_sink() {
        let probe = Arc::new(SinkProbe::default());
        let engine = engine(&probe);
        let calls = Arc::new(AtomicUsize::new(0));
        engine.configure(endless_source(calls), None);
        assert!(engine.confirm_play_starts(WAIT));

        engine.pause().unwrap();
        assert_eq!(engine.state(), PlaybackState::Paused);
        engine.resume().unwrap();
        assert_eq!(engine.state(), PlaybackState::Playing);

        assert!(engine.stop(WAIT));
        assert!(matches!(engine.pause(), Err(EngineError::NotPlaying)));
    }

    #[test]
    fn back_to_back_configure_keeps_a_single_sink() {
        let probe = Arc::new(SinkProbe::default());
        let engine = engine(&probe);
        let (first_hook, first_ended) = ended_signal();
        let (second_hook, second_ended) = ended_signal();

        engine.configure(endless_source(Arc::new(AtomicUsize::new(0))), Some(first_hook));
        engine.configure(endless_source(Arc::new(AtomicUsize::new(0))), Some(second_hook));
        assert!(engine.confirm_play_starts(WAIT));

        first_ended.recv_timeout(WAIT).unwrap();
        assert!(wait_until(WAIT, || {
            probe.created.load(Ordering::SeqCst) == 2 && engine.is_playing()
        }));
        assert_eq!(probe.max_live.load(Ordering::SeqCst), 1);

        assert!(engine.stop(WAIT));
        second_ended.recv_timeout(WAIT).unwrap();
        assert_eq!(probe.live(), 0);
    }

    #[test]
    fn stop_mid_stream_prevents_further_pulls() {
        let probe = Arc::new(SinkProbe::default());
        let engine = engine(&probe);
        let calls = Arc::new(AtomicUsize::new(0));
        let (hook, ended) = ended_signal();

        engine.configure(endless_source(calls.clone()), Some(hook));
        assert!(engine.confirm_play_starts(WAIT));
        assert!(wait_until(WAIT, || calls.load(Ordering::SeqCst) >= 5));

        assert!(engine.stop(WAIT));
        let after_stop = calls.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(calls.load(Ordering::SeqCst), after_stop);
        ended.recv_timeout(WAIT).unwrap();
        assert_eq!(probe.live(), 0);
    }

    #[test]
    fn shutdown_while_playing_stops_and_disables_configure() {
        let probe = Arc::new(SinkProbe::default());
        let engine = engine(&probe);
        let (hook, ended) = ended_signal();

        engine.configure(endless_source(Arc::new(AtomicUsize::new(0))), Some(hook));
        assert!(engine.confirm_play_starts(WAIT));

        engine.shutdown();
        ended.recv_timeout(WAIT).unwrap();
        assert!(!engine.is_playing());
        assert_eq!(probe.live(), 0);

        let created = probe.created.load(Ordering::SeqCst);
        assert!(engine.configure(endless_source(Arc::new(AtomicUsize::new(0))), None).is_none());
        assert!(!engine.confirm_play_starts(Duration::from_millis(50)));
        assert_eq!(probe.created.load(Ordering::SeqCst), created);

        engine.shutdown();
    }

    #[test]
    fn failed_sink_start_confirms_negatively() {
        let probe = Arc::new(SinkProbe::default());
        probe.fail_start.store(true, Ordering::SeqCst);
        let engine = engine(&probe);
        let (hook, ended) = ended_signal();

        engine.configure(endless_source(Arc::new(AtomicUsize::new(0))), Some(hook));
        assert!(!engine.confirm_play_starts(WAIT));
        ended.recv_timeout(WAIT).unwrap();
        assert!(engine.stop(Duration::from_millis(1)));
        assert_eq!(engine.state(), PlaybackState::Stopped);
    }

    #[test]
    fn failed_pull_ends_session_like_exhaustion() {
        let probe = Arc::new(SinkProbe::default());
        let engine = engine(&probe);
        let (hook, ended) = ended_signal();
        let served = AtomicUsize::new(0);
        let chunk_fn: ChunkFn = Box::new(move |size| {
            if served.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(Some(vec![0u8; size]))
            } else {
                Err(anyhow::anyhow!("connection reset"))
            }
        });

        engine.configure(chunk_fn, Some(hook));
        assert!(engine.confirm_play_starts(WAIT));
        ended.recv_timeout(WAIT).unwrap();
        assert!(wait_until(WAIT, || !engine.is_playing()));
        assert_eq!(engine.stats().chunks, 1);
    }

    #[test]
    fn empty_chunks_are_retried_without_ending() {
        let probe = Arc::new(SinkProbe::default());
        let engine = engine(&probe);
        let (hook, ended) = ended_signal();
        let calls = AtomicUsize::new(0);
        let chunk_fn: ChunkFn = Box::new(move |size| match calls.fetch_add(1, Ordering::SeqCst) {
            0..=2 => Ok(Some(Vec::new())),
            3 => Ok(Some(vec![0u8; size])),
            _ => Ok(None),
        });

        engine.configure(chunk_fn, Some(hook));
        assert!(engine.confirm_play_starts(WAIT));
        ended.recv_timeout(WAIT).unwrap();
        assert_eq!(engine.stats().chunks, 1);
    }

    #[test]
    fn late_stop_of_earlier_session_does_not_settle_the_next_one() {
        let probe = Arc::new(SinkProbe::default());
        let engine = engine(&probe);
        let (first_hook, first_ended) = ended_signal();

        probe.hold_factory.store(true, Ordering::SeqCst);
        engine.configure(endless_source(Arc::new(AtomicUsize::new(0))), Some(first_hook));
        assert!(!engine.stop(Duration::from_millis(10)));

        let calls = Arc::new(AtomicUsize::new(0));
        engine.configure(endless_source(calls.clone()), None);
        probe.hold_factory.store(false, Ordering::SeqCst);

        first_ended.recv_timeout(WAIT).unwrap();
        assert!(engine.confirm_play_starts(WAIT));
        assert!(wait_until(WAIT, || calls.load(Ordering::SeqCst) > 0));
        assert_eq!(engine.state(), PlaybackState::Playing);

        assert!(engine.stop(WAIT));
        assert!(!engine.is_playing());
        assert_eq!(engine.state(), PlaybackState::Stopped);
        assert_eq!(probe.live(), 0);
        assert_eq!(probe.max_live.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn self_posted_stop_racing_shutdown_ends_cleanly() {
        for _ in 0..20 {
            let probe = Arc::new(SinkProbe::default());
            let engine = engine(&probe);
            let hook_calls = Arc::new(AtomicUsize::new(0));
            let sizes = Arc::new(Mutex::new(Vec::new()));

            engine.configure(finite_source(1, sizes), Some(counting_hook(hook_calls.clone())));
            assert!(engine.confirm_play_starts(WAIT));
            engine.shutdown();

            assert!(wait_until(WAIT, || hook_calls.load(Ordering::SeqCst) == 1));
            assert!(!engine.is_playing());
            assert_eq!(probe.live(), 0);
            assert!(engine.stop(Duration::from_millis(1)));
            assert!(engine.configure(endless_source(Arc::new(AtomicUsize::new(0))), None).is_none());
            std::thread::sleep(Duration::from_millis(20));
            assert_eq!(hook_calls.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn only_self_ended_sessions_drain() {
        let probe = Arc::new(SinkProbe::default());
        let engine = engine(&probe);

        engine.configure(endless_source(Arc::new(AtomicUsize::new(0))), None);
        assert!(engine.confirm_play_starts(WAIT));
        assert!(engine.stop(WAIT));
        assert_eq!(probe.finished.load(Ordering::SeqCst), 0);

        let hook_calls = Arc::new(AtomicUsize::new(0));
        let sizes = Arc::new(Mutex::new(Vec::new()));
        engine.configure(finite_source(2, sizes), Some(counting_hook(hook_calls.clone())));
        assert!(engine.confirm_play_starts(WAIT));
        assert!(wait_until(WAIT, || hook_calls.load(Ordering::SeqCst) == 1));
        assert_eq!(probe.finished.load(Ordering::SeqCst), 1);
    }
}
