//! Bounded queues of interleaved `f32` samples.
//!
//! [`SharedAudio`] carries decoded PCM between pipeline stages:
//! - decode thread → queue
//! - resampler thread → queue
//! - CPAL callback drains queue (non-blocking)
//!
//! `close()` ends the producer side; consumers drain what is left and then see `None`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Thread-safe bounded queue for interleaved samples.
///
/// Capacity is `max_buffered_samples`; producers block when it is reached. The `done`
/// flag lives under the same mutex as the samples so close and drain cannot race.
pub struct SharedAudio {
    channels: usize,
    inner: Mutex<SharedInner>,
    cv: Condvar,
    max_buffered_samples: usize,
    created: Instant,
    low_watermark_ms: AtomicU64,
}

struct SharedInner {
    queue: VecDeque<f32>,
    done: bool,
}

/// How many frames to take from the queue.
pub enum PopStrategy {
    /// Block until exactly `frames` are available; `None` if closed first.
    BlockingExact { frames: usize },
    /// Block until at least one frame is available, then take up to `max_frames`.
    BlockingUpTo { max_frames: usize },
    /// Take up to `max_frames` without waiting; `None` if empty.
    NonBlocking { max_frames: usize },
}

/// Queue capacity in samples for `buffer_seconds` of audio (2 s if the value is unusable).
pub fn calc_max_buffered_samples(rate_hz: u32, channels: usize, buffer_seconds: f32) -> usize {
    let secs = if buffer_seconds.is_finite() && buffer_seconds > 0.0 {
        buffer_seconds
    } else {
        2.0
    };

    let frames = (rate_hz as f32 * secs).ceil() as usize;
    frames.saturating_mul(channels)
}

impl SharedAudio {
    pub fn new(channels: usize, max_buffered_samples: usize) -> Self {
        let channels = channels.max(1);
        Self {
            channels,
            inner: Mutex::new(SharedInner {
                queue: VecDeque::new(),
                done: false,
            }),
            cv: Condvar::new(),
            max_buffered_samples: max_buffered_samples.max(channels),
            created: Instant::now(),
            low_watermark_ms: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SharedInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Buffered frames right now.
    pub fn len_frames(&self) -> usize {
        self.lock().queue.len() / self.channels
    }

    pub fn is_done(&self) -> bool {
        self.lock().done
    }

    /// Mark the producer side finished and wake all waiters. Idempotent.
    pub fn close(&self) {
        let mut g = self.lock();
        g.done = true;
        drop(g);
        self.cv.notify_all();
    }

    /// Close and discard anything still buffered.
    pub fn abort(&self) {
        let mut g = self.lock();
        g.done = true;
        g.queue.clear();
        drop(g);
        self.cv.notify_all();
    }

    /// Push samples, blocking while the queue is full. Returns early if the queue closes.
    pub fn push_interleaved_blocking(&self, samples: &[f32]) {
        let mut offset = 0;

        while offset < samples.len() {
            let g = self.lock();
            let mut g = self
                .cv
                .wait_while(g, |inner| {
                    inner.queue.len() >= self.max_buffered_samples && !inner.done
                })
                .unwrap_or_else(PoisonError::into_inner);
            if g.done {
                return;
            }

            let room = self.max_buffered_samples - g.queue.len();
            let take = room.min(samples.len() - offset);
            g.queue.extend(samples[offset..offset + take].iter().copied());
            offset += take;

            drop(g);
            self.cv.notify_all();
        }
    }

    /// Pop interleaved frames using `strategy`.
    pub fn pop(&self, strategy: PopStrategy) -> Option<Vec<f32>> {
        let mut g = self.lock();
        let take_samples = match strategy {
            PopStrategy::BlockingExact { frames } => {
                let want = frames * self.channels;
                g = self
                    .cv
                    .wait_while(g, |inner| inner.queue.len() < want && !inner.done)
                    .unwrap_or_else(PoisonError::into_inner);
                if g.queue.len() < want {
                    return None;
                }
                want
            }
            PopStrategy::BlockingUpTo { max_frames } => {
                g = self
                    .cv
                    .wait_while(g, |inner| inner.queue.is_empty() && !inner.done)
                    .unwrap_or_else(PoisonError::into_inner);
                if g.queue.is_empty() {
                    return None;
                }
                // A closed queue may end on a partial frame; hand it out anyway.
                let frames = (g.queue.len() / self.channels).min(max_frames);
                if frames == 0 {
                    g.queue.len()
                } else {
                    frames * self.channels
                }
            }
            PopStrategy::NonBlocking { max_frames } => {
                let frames = (g.queue.len() / self.channels).min(max_frames);
                if frames == 0 {
                    return None;
                }
                frames * self.channels
            }
        };

        let out: Vec<f32> = g.queue.drain(..take_samples).collect();
        let remaining = g.queue.len();
        drop(g);
        self.cv.notify_all();
        self.log_low_watermark(remaining);
        Some(out)
    }

    fn log_low_watermark(&self, queued: usize) {
        let threshold = (self.max_buffered_samples / 8).max(self.channels * 16);
        if queued == 0 || queued >= threshold {
            return;
        }
        let now = self.created.elapsed().as_millis() as u64;
        let last = self.low_watermark_ms.load(Ordering::Relaxed);
        if now.saturating_sub(last) > 1000 {
            self.low_watermark_ms.store(now, Ordering::Relaxed);
            tracing::debug!(
                queued_samples = queued,
                threshold_samples = threshold,
                "audio queue low watermark"
            );
        }
    }

    /// Block until the queue is closed and drained, `cancel` is set, or `timeout` elapses.
    ///
    /// Returns `true` only for a normal drain.
    pub fn wait_drained(&self, cancel: &AtomicBool, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut g = self.lock();
        loop {
            if cancel.load(Ordering::Relaxed) {
                return false;
            }
            if g.done && g.queue.is_empty() {
                return true;
            }
            let mut slice = Duration::from_millis(50);
            if let Some(deadline) = deadline {
                let now = Instant::now();
                if now >= deadline {
                    return false;
                }
                slice = slice.min(deadline - now);
            }
            let (next, _) = self
                .cv
                .wait_timeout(g, slice)
                .unwrap_or_else(PoisonError::into_inner);
            g = next;
        }
    }
}
