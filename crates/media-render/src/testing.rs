//! In-process fakes for engine and service tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use audio_player::feed::Demand;
use audio_player::sink::HandlerSlot;
use audio_player::{ByteFeed, PipelineState, Sink, SinkEventHandler};
use spotifice_types::{ErrorBody, ErrorKind, TrackInfo};

use crate::engine::SinkFactory;
use crate::source::{ChunkSource, SourceConnector, SourceError};

/// Observations shared by every [`FakeSink`] built from one factory.
#[derive(Debug, Default)]
pub(crate) struct SinkProbe {
    pub(crate) created: AtomicUsize,
    pub(crate) live: AtomicUsize,
    pub(crate) max_live: AtomicUsize,
    pub(crate) consumed: AtomicU64,
    /// Make the next sinks fail when started.
    pub(crate) fail_start: AtomicBool,
    /// Block sink creation while set.
    pub(crate) hold_factory: AtomicBool,
    /// Sinks torn down through `finish`.
    pub(crate) finished: AtomicUsize,
}

impl SinkProbe {
    pub(crate) fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

pub(crate) fn fake_factory(probe: Arc<SinkProbe>) -> SinkFactory {
    Box::new(move || {
        while probe.hold_factory.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(1));
        }
        probe.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeSink::new(probe.clone())) as Box<dyn Sink>)
    })
}

/// Sink that consumes bytes as fast as they arrive, on a background thread.
pub(crate) struct FakeSink {
    probe: Arc<SinkProbe>,
    handler: HandlerSlot,
    state: PipelineState,
    paused: Arc<AtomicBool>,
    cancel: Arc<AtomicBool>,
    feed: Option<Arc<ByteFeed>>,
    pull: Option<JoinHandle<()>>,
}

impl FakeSink {
    fn new(probe: Arc<SinkProbe>) -> Self {
        Self {
            probe,
            handler: HandlerSlot::default(),
            state: PipelineState::Null,
            paused: Arc::new(AtomicBool::new(false)),
            cancel: Arc::new(AtomicBool::new(false)),
            feed: None,
            pull: None,
        }
    }

    fn start(&mut self) -> Result<()> {
        if self.probe.fail_start.load(Ordering::SeqCst) {
            return Err(anyhow!("fake sink refused to start"));
        }
        let live = self.probe.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.probe.max_live.fetch_max(live, Ordering::SeqCst);

        let feed = Arc::new(ByteFeed::new(8192));
        let handler = self.handler.clone();
        let paused = self.paused.clone();
        let cancel = self.cancel.clone();
        let probe = self.probe.clone();
        let pull_feed = feed.clone();
        self.pull = Some(thread::spawn(move || {
            while !cancel.load(Ordering::SeqCst) {
                if paused.load(Ordering::SeqCst) {
                    thread::sleep(Duration::from_millis(1));
                    continue;
                }
                match pull_feed.wait_for_demand(Duration::from_millis(5)) {
                    Demand::Finished => break,
                    Demand::Satisfied => {}
                    Demand::Wanted(_) => {
                        handler.emit(audio_player::SinkEvent::NeedData { length: 0 }, &pull_feed);
                    }
                }
                let level = pull_feed.level();
                if level > 0 {
                    let mut buf = vec![0u8; level];
                    let n = pull_feed.read_blocking(&mut buf);
                    probe.consumed.fetch_add(n as u64, Ordering::SeqCst);
                } else {
                    thread::sleep(Duration::from_millis(1));
                }
            }
        }));
        self.feed = Some(feed);
        Ok(())
    }

    fn stop(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
        if let Some(feed) = self.feed.take() {
            feed.close();
        }
        if let Some(pull) = self.pull.take() {
            let _ = pull.join();
            self.probe.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Sink for FakeSink {
    fn connect(&mut self, handler: SinkEventHandler) {
        self.handler.set(handler);
    }

    fn disconnect(&mut self) {
        self.handler.clear();
    }

    fn set_state(&mut self, state: PipelineState) -> Result<()> {
        match (self.state, state) {
            (PipelineState::Null, PipelineState::Null) => {}
            (PipelineState::Null, _) => self.start()?,
            (_, PipelineState::Null) => self.stop(),
            _ => {}
        }
        self.paused
            .store(state == PipelineState::Paused, Ordering::SeqCst);
        self.state = state;
        Ok(())
    }

    fn state(&self) -> PipelineState {
        self.state
    }

    fn finish(&mut self) -> Result<()> {
        self.probe.finished.fetch_add(1, Ordering::SeqCst);
        self.set_state(PipelineState::Null)
    }
}

impl Drop for FakeSink {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Media server stand-in holding whole tracks in memory.
#[derive(Default)]
pub(crate) struct MemorySource {
    tracks: HashMap<String, Vec<u8>>,
    streams: Mutex<HashMap<String, (Vec<u8>, usize)>>,
    /// Rewind streams instead of exhausting them.
    looping: bool,
    pub(crate) unreachable: AtomicBool,
    pub(crate) stop_calls: AtomicUsize,
    pub(crate) chunk_calls: AtomicUsize,
}

impl MemorySource {
    pub(crate) fn with_track(mut self, id: &str, len: usize) -> Self {
        self.tracks.insert(id.to_string(), vec![0x5a; len]);
        self
    }

    pub(crate) fn looping(mut self) -> Self {
        self.looping = true;
        self
    }

    pub(crate) fn has_stream(&self, render_id: &str) -> bool {
        self.streams
            .lock()
            .map(|s| s.contains_key(render_id))
            .unwrap_or(false)
    }
}

impl ChunkSource for MemorySource {
    fn describe(&self) -> String {
        "memory://".to_string()
    }

    fn ping(&self) -> Result<(), SourceError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(SourceError::Transport("connection refused".into()));
        }
        Ok(())
    }

    fn track_info(&self, track_id: &str) -> Result<TrackInfo, SourceError> {
        if !self.tracks.contains_key(track_id) {
            return Err(SourceError::Remote(
                ErrorBody::new(ErrorKind::TrackError, "Track not found").with_item(track_id),
            ));
        }
        let title = track_id
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(track_id);
        Ok(TrackInfo {
            id: track_id.to_string(),
            title: title.to_string(),
        })
    }

    fn start_stream(&self, track_id: &str, render_id: &str) -> Result<(), SourceError> {
        let data = self.tracks.get(track_id).cloned().ok_or_else(|| {
            SourceError::Remote(
                ErrorBody::new(ErrorKind::TrackError, "Track not found").with_item(track_id),
            )
        })?;
        if let Ok(mut streams) = self.streams.lock() {
            streams.insert(render_id.to_string(), (data, 0));
        }
        Ok(())
    }

    fn stop_stream(&self, render_id: &str) -> Result<(), SourceError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut streams) = self.streams.lock() {
            streams.remove(render_id);
        }
        Ok(())
    }

    fn get_audio_chunk(&self, render_id: &str, size: usize) -> Result<Vec<u8>, SourceError> {
        self.chunk_calls.fetch_add(1, Ordering::SeqCst);
        let mut streams = self
            .streams
            .lock()
            .map_err(|_| SourceError::Transport("poisoned".into()))?;
        let Some((data, pos)) = streams.get_mut(render_id) else {
            return Err(SourceError::Remote(
                ErrorBody::new(ErrorKind::StreamError, "No started stream for render")
                    .with_item(render_id),
            ));
        };
        if self.looping && *pos >= data.len() {
            *pos = 0;
        }
        let end = (*pos + size).min(data.len());
        let chunk = data[*pos..end].to_vec();
        *pos = end;
        if chunk.is_empty() {
            streams.remove(render_id);
        }
        Ok(chunk)
    }
}

/// Connector that always hands out the same [`MemorySource`].
pub(crate) struct MemoryConnector(pub(crate) Arc<MemorySource>);

impl SourceConnector for MemoryConnector {
    fn connect(&self, _server: &str) -> Result<Arc<dyn ChunkSource>, SourceError> {
        Ok(self.0.clone())
    }
}

/// Poll `cond` until it holds or `timeout` elapses.
pub(crate) fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    cond()
}
