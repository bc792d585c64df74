//! [`Sink`] implementation that plays through a CPAL output device.
//!
//! Two threads per pipeline:
//! - the feeder waits for room in the [`ByteFeed`] and emits [`SinkEvent::NeedData`]
//! - the pipeline thread decodes from the feed and drives the output stream
//!
//! Pausing only flips the output callback to silence. The decoded queues stop draining,
//! the decoder stops reading, and the feed stays full, so the feeder goes quiet on its own.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use symphonia::core::probe::Hint;

use crate::config::SinkConfig;
use crate::device;
use crate::feed::{ByteFeed, Demand, FeedReader};
use crate::pipeline::{self, PipelineParams};
use crate::playback::OutputControl;
use crate::sink::{HandlerSlot, PipelineState, Sink, SinkEvent, SinkEventHandler};
use crate::status::OutputStatusState;

const DEMAND_POLL: Duration = Duration::from_millis(100);

pub struct StreamSink {
    config: SinkConfig,
    status: Option<Arc<Mutex<OutputStatusState>>>,
    handler: HandlerSlot,
    state: PipelineState,
    running: Option<RunningPipeline>,
}

struct RunningPipeline {
    feed: Arc<ByteFeed>,
    control: OutputControl,
    cancel: Arc<AtomicBool>,
    feeder: JoinHandle<()>,
    pipeline: JoinHandle<()>,
    done_rx: Receiver<()>,
}

impl StreamSink {
    pub fn new(config: SinkConfig) -> Self {
        Self {
            config,
            status: None,
            handler: HandlerSlot::default(),
            state: PipelineState::Null,
            running: None,
        }
    }

    /// Report device and progress counters into `status` while playing.
    pub fn with_status(mut self, status: Arc<Mutex<OutputStatusState>>) -> Self {
        self.status = Some(status);
        self
    }

    fn start(&mut self) -> Result<()> {
        let host = cpal::default_host();
        let device = device::pick_device(&host, self.config.device.as_deref())?;

        let feed = Arc::new(ByteFeed::new(self.config.max_bytes));
        let cancel = Arc::new(AtomicBool::new(false));
        let control = OutputControl::default();
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);

        let feeder = {
            let feed = feed.clone();
            let handler = self.handler.clone();
            let cancel = cancel.clone();
            let retry = self.config.retry_interval;
            thread::Builder::new()
                .name("sink-feeder".into())
                .spawn(move || run_feeder(&feed, &handler, &cancel, retry))
                .context("spawn feeder thread")?
        };

        let params = PipelineParams {
            device,
            playback: self.config.playback.clone(),
            control: control.clone(),
            cancel: cancel.clone(),
            status: self.status.clone(),
        };
        let mut hint = Hint::new();
        if let Some(ext) = self.config.hint_extension.as_deref() {
            hint.with_extension(ext);
        }
        let pipeline = {
            let pipe_feed = feed.clone();
            let handler = self.handler.clone();
            let pipe_cancel = cancel.clone();
            let spawned = thread::Builder::new()
                .name("sink-pipeline".into())
                .spawn(move || {
                    let source = Box::new(FeedReader::new(pipe_feed.clone()));
                    if let Err(e) = pipeline::run_pipeline(source, hint, params) {
                        if !pipe_cancel.load(Ordering::Relaxed) {
                            tracing::warn!(error = %format!("{e:#}"), "sink pipeline failed");
                            handler.emit(
                                SinkEvent::Error {
                                    message: format!("{e:#}"),
                                },
                                &pipe_feed,
                            );
                        }
                    }
                    pipe_feed.close();
                    let _ = done_tx.send(());
                });
            match spawned {
                Ok(handle) => handle,
                Err(e) => {
                    cancel.store(true, Ordering::Relaxed);
                    feed.close();
                    let _ = feeder.join();
                    return Err(e).context("spawn pipeline thread");
                }
            }
        };

        self.running = Some(RunningPipeline {
            feed,
            control,
            cancel,
            feeder,
            pipeline,
            done_rx,
        });
        Ok(())
    }

    /// Tear the pipeline down. With `drain`, audio already buffered after end-of-stream
    /// plays out first, bounded by `drain_timeout`.
    fn stop(&mut self, drain: bool) {
        let Some(run) = self.running.take() else {
            return;
        };

        if drain && run.feed.is_end_of_stream() && !run.control.paused.load(Ordering::Relaxed) {
            match run.done_rx.recv_timeout(self.config.drain_timeout) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    tracing::debug!("sink drained")
                }
                Err(RecvTimeoutError::Timeout) => tracing::debug!(
                    timeout_ms = self.config.drain_timeout.as_millis() as u64,
                    "sink drain timed out"
                ),
            }
        }

        run.cancel.store(true, Ordering::Relaxed);
        run.feed.close();
        if run.feeder.join().is_err() {
            tracing::warn!("sink feeder thread panicked");
        }
        if run.pipeline.join().is_err() {
            tracing::warn!("sink pipeline thread panicked");
        }
    }

    fn set_paused(&self, paused: bool) {
        if let Some(run) = &self.running {
            run.control.paused.store(paused, Ordering::Relaxed);
        }
    }
}

impl Sink for StreamSink {
    fn connect(&mut self, handler: SinkEventHandler) {
        self.handler.set(handler);
    }

    fn disconnect(&mut self) {
        self.handler.clear();
    }

    fn set_state(&mut self, state: PipelineState) -> Result<()> {
        if state == self.state {
            return Ok(());
        }
        match (self.state, state) {
            (PipelineState::Null, target) => {
                self.start()?;
                self.set_paused(target == PipelineState::Paused);
            }
            (_, PipelineState::Null) => self.stop(false),
            (_, target) => self.set_paused(target == PipelineState::Paused),
        }
        tracing::debug!(from = ?self.state, to = ?state, "sink state change");
        self.state = state;
        Ok(())
    }

    fn state(&self) -> PipelineState {
        self.state
    }

    fn finish(&mut self) -> Result<()> {
        if self.state != PipelineState::Null {
            self.stop(true);
            tracing::debug!(from = ?self.state, "sink finished");
            self.state = PipelineState::Null;
        }
        Ok(())
    }
}

impl Drop for StreamSink {
    fn drop(&mut self) {
        self.handler.clear();
        self.stop(false);
    }
}

/// Emit need-data while the feed has room, until it finishes or `cancel` is set.
fn run_feeder(feed: &ByteFeed, handler: &HandlerSlot, cancel: &AtomicBool, retry: Duration) {
    while !cancel.load(Ordering::Relaxed) {
        match feed.wait_for_demand(DEMAND_POLL) {
            Demand::Finished => break,
            Demand::Satisfied => continue,
            Demand::Wanted(length) => {
                let before = feed.pushed_total();
                let delivered = handler.emit(SinkEvent::NeedData { length }, feed);
                let idle = !delivered || feed.pushed_total() == before;
                if idle && !feed.is_end_of_stream() && !cancel.load(Ordering::Relaxed) {
                    thread::sleep(retry);
                }
            }
        }
    }
}
