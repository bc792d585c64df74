//! Encoded-byte input buffer for pull-driven sinks.
//!
//! A [`ByteFeed`] sits between whoever produces encoded audio (pushed in response to
//! need-data events) and the decoder that consumes it:
//! - the sink's feeder thread calls [`ByteFeed::wait_for_demand`] and asks for more data
//!   only while fewer than `max_bytes` are buffered
//! - the decoder reads through [`FeedReader`], blocking until bytes arrive or the
//!   stream ends
//!
//! End-of-stream is sticky: once signalled, pushes are rejected and readers see EOF
//! after the remaining bytes are drained. `close()` is the hard stop used on teardown.

use std::collections::VecDeque;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use symphonia::core::io::MediaSource;

/// Result of waiting for the buffer to drain below its limit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Demand {
    /// The buffer can take this many more bytes.
    Wanted(usize),
    /// Still full when the wait timed out.
    Satisfied,
    /// End-of-stream or closed; no more data will be accepted.
    Finished,
}

/// Thread-safe byte buffer with end-of-stream signalling.
pub struct ByteFeed {
    inner: Mutex<FeedInner>,
    cv: Condvar,
    max_bytes: usize,
}

struct FeedInner {
    buf: VecDeque<u8>,
    eos: bool,
    closed: bool,
    pushed_total: u64,
}

impl ByteFeed {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            inner: Mutex::new(FeedInner {
                buf: VecDeque::new(),
                eos: false,
                closed: false,
                pushed_total: 0,
            }),
            cv: Condvar::new(),
            max_bytes: max_bytes.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FeedInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Bytes currently buffered.
    pub fn level(&self) -> usize {
        self.lock().buf.len()
    }

    /// Total bytes accepted since creation.
    pub fn pushed_total(&self) -> u64 {
        self.lock().pushed_total
    }

    /// Append a chunk. Never blocks; a chunk may overshoot `max_bytes`.
    ///
    /// Returns `false` when the feed already reached end-of-stream or was closed.
    pub fn push(&self, bytes: &[u8]) -> bool {
        let mut g = self.lock();
        if g.eos || g.closed {
            return false;
        }
        g.buf.extend(bytes.iter().copied());
        g.pushed_total = g.pushed_total.saturating_add(bytes.len() as u64);
        drop(g);
        self.cv.notify_all();
        true
    }

    /// Mark the end of the stream. Buffered bytes stay readable.
    pub fn end_of_stream(&self) {
        let mut g = self.lock();
        g.eos = true;
        drop(g);
        self.cv.notify_all();
    }

    pub fn is_end_of_stream(&self) -> bool {
        self.lock().eos
    }

    /// Drop buffered bytes and wake every waiter. Readers see EOF immediately.
    pub fn close(&self) {
        let mut g = self.lock();
        g.closed = true;
        g.buf.clear();
        drop(g);
        self.cv.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Block until the buffer has room, the feed finishes, or `timeout` elapses.
    pub fn wait_for_demand(&self, timeout: Duration) -> Demand {
        let g = self.lock();
        let (g, _) = self
            .cv
            .wait_timeout_while(g, timeout, |inner| {
                !inner.eos && !inner.closed && inner.buf.len() >= self.max_bytes
            })
            .unwrap_or_else(PoisonError::into_inner);
        if g.eos || g.closed {
            Demand::Finished
        } else if g.buf.len() < self.max_bytes {
            Demand::Wanted(self.max_bytes - g.buf.len())
        } else {
            Demand::Satisfied
        }
    }

    /// Blocking read used by the decoder side.
    ///
    /// Returns `0` only at end-of-stream (after draining) or after `close()`.
    pub fn read_blocking(&self, out: &mut [u8]) -> usize {
        if out.is_empty() {
            return 0;
        }
        let g = self.lock();
        let mut g = self
            .cv
            .wait_while(g, |inner| inner.buf.is_empty() && !inner.eos && !inner.closed)
            .unwrap_or_else(PoisonError::into_inner);
        if g.closed {
            return 0;
        }
        let n = out.len().min(g.buf.len());
        for (dst, src) in out.iter_mut().zip(g.buf.drain(..n)) {
            *dst = src;
        }
        drop(g);
        self.cv.notify_all();
        n
    }
}

/// Forward-only reader over a [`ByteFeed`], usable as a Symphonia [`MediaSource`].
pub struct FeedReader {
    feed: Arc<ByteFeed>,
}

impl FeedReader {
    pub fn new(feed: Arc<ByteFeed>) -> Self {
        Self { feed }
    }
}

impl Read for FeedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.feed.read_blocking(buf))
    }
}

impl Seek for FeedReader {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "byte feed is not seekable",
        ))
    }
}

impl MediaSource for FeedReader {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        None
    }
}
