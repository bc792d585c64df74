use std::fmt;

/// Monotonic id of one configure → stop cycle.
pub type SessionId = u64;

/// Pulls up to `size` encoded bytes from the source.
///
/// `Ok(None)` and `Err` end the session; `Ok(Some(empty))` means "nothing yet".
pub type ChunkFn = Box<dyn Fn(usize) -> anyhow::Result<Option<Vec<u8>>> + Send>;

/// Runs once when a session ends, on its own thread.
pub type EndedHook = Box<dyn FnOnce() + Send>;

/// Everything a `configure()` call hands to the worker.
pub(crate) struct SessionSpec {
    pub(crate) id: SessionId,
    pub(crate) chunk_fn: ChunkFn,
    pub(crate) ended_hook: Option<EndedHook>,
}

/// Work items consumed by the engine worker, strictly in arrival order.
pub(crate) enum Command {
    Configured(SessionSpec),
    /// `session` is set when the engine posts the stop itself; a stale id is ignored.
    StopRequested { session: Option<SessionId> },
    ShutdownRequested,
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Configured(spec) => write!(f, "Configured({})", spec.id),
            Command::StopRequested { session } => write!(f, "StopRequested({session:?})"),
            Command::ShutdownRequested => f.write_str("ShutdownRequested"),
        }
    }
}
