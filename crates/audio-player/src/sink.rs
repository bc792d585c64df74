//! Pull-driven sink abstraction.
//!
//! A sink owns an output pipeline that, once playing, asks for encoded bytes on its own
//! thread by emitting [`SinkEvent::NeedData`]. Whoever connected a handler answers by
//! pushing into the [`ByteFeed`] handed to it, or by signalling end-of-stream.

use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;

use crate::feed::ByteFeed;

/// Pipeline state of a sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    /// Nothing allocated; initial and terminal state.
    Null,
    Paused,
    Playing,
}

/// Events a sink emits from its own threads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SinkEvent {
    /// The input buffer drained; `length` is the suggested byte count (0 = no hint).
    NeedData { length: usize },
    /// The pipeline failed and will not produce more audio.
    Error { message: String },
}

/// Callback invoked for every [`SinkEvent`], with the sink's input feed.
pub type SinkEventHandler = Box<dyn FnMut(SinkEvent, &ByteFeed) + Send>;

/// Output pipeline driven by a single owner.
pub trait Sink: Send {
    /// Install the event handler, replacing any previous one.
    fn connect(&mut self, handler: SinkEventHandler);

    /// Remove the event handler.
    ///
    /// When this returns, no handler invocation is in flight and none will follow.
    fn disconnect(&mut self);

    /// Move the pipeline to `state`. Going from `Null` to `Playing`/`Paused` builds
    /// the pipeline; going to `Null` tears it down.
    fn set_state(&mut self, state: PipelineState) -> Result<()>;

    fn state(&self) -> PipelineState;

    /// Go to `Null` after a stream ended on its own, letting buffered audio play out.
    fn finish(&mut self) -> Result<()> {
        self.set_state(PipelineState::Null)
    }
}

/// Shared handler slot used by sink implementations.
///
/// `emit` holds the slot lock for the duration of the callback, which is what makes
/// `clear` a barrier against in-flight events.
#[derive(Clone, Default)]
pub struct HandlerSlot {
    inner: Arc<Mutex<Option<SinkEventHandler>>>,
}

impl HandlerSlot {
    pub fn set(&self, handler: SinkEventHandler) {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    pub fn clear(&self) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn is_connected(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Deliver `event`; returns `false` when no handler is connected.
    pub fn emit(&self, event: SinkEvent, feed: &ByteFeed) -> bool {
        let mut slot = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_mut() {
            Some(handler) => {
                handler(event, feed);
                true
            }
            None => false,
        }
    }
}
