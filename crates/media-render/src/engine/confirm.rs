use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::command::SessionId;

#[derive(Debug)]
struct Flags {
    play: bool,
    stop: bool,
    /// Play was confirmed at least once since the last `begin_pending`.
    started: bool,
    /// Last session handed to the worker; 0 before the first configure.
    pending: SessionId,
}

/// Play/stop confirmation pair shared between the worker and blocking callers.
///
/// Both flags live under one mutex so a waiter never observes a half-applied
/// transition. Neither flag set means a transition is pending. Worker confirmations
/// carry the session they settle, and are dropped while a newer session is queued.
#[derive(Debug)]
pub(crate) struct Confirmations {
    flags: Mutex<Flags>,
    cv: Condvar,
}

impl Confirmations {
    pub(crate) fn new() -> Self {
        Self {
            flags: Mutex::new(Flags {
                play: false,
                stop: true,
                started: false,
                pending: 0,
            }),
            cv: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Flags> {
        self.flags.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(&self, mut g: MutexGuard<'_, Flags>, play: bool, stop: bool) {
        g.play = play;
        g.stop = stop;
        g.started |= play;
        drop(g);
        self.cv.notify_all();
    }

    /// Session `id` was requested; both flags clear until the worker reaches it.
    pub(crate) fn begin_pending(&self, id: SessionId) {
        let mut g = self.lock();
        g.play = false;
        g.stop = false;
        g.started = false;
        g.pending = id;
        drop(g);
        self.cv.notify_all();
    }

    /// Session `id` is playing. Ignored unless it is the last one requested.
    pub(crate) fn confirm_playing(&self, id: SessionId) {
        let g = self.lock();
        if g.pending != id {
            tracing::debug!(session = id, "play confirmation superseded");
            return;
        }
        self.apply(g, true, false);
    }

    /// The worker went idle after handling everything up to session `applied`.
    ///
    /// Ignored while a newer session is still queued behind it.
    pub(crate) fn confirm_stopped(&self, applied: SessionId) {
        let g = self.lock();
        if g.pending != applied {
            tracing::debug!(session = applied, "stop confirmation superseded");
            return;
        }
        self.apply(g, false, true);
    }

    /// Nothing will ever play again.
    pub(crate) fn close(&self) {
        self.apply(self.lock(), false, true);
    }

    /// Withdraw the play confirmation ahead of a teardown.
    pub(crate) fn revoke_play(&self) {
        let mut g = self.lock();
        g.play = false;
    }

    pub(crate) fn is_playing(&self) -> bool {
        self.lock().play
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.lock().stop
    }

    /// Wait for play, or for the pending transition to settle as stopped.
    ///
    /// A session that started and already ended counts as confirmed.
    pub(crate) fn wait_play(&self, timeout: Duration) -> bool {
        let g = self.lock();
        let (g, _) = self
            .cv
            .wait_timeout_while(g, timeout, |f| !f.play && !f.stop)
            .unwrap_or_else(PoisonError::into_inner);
        g.play || g.started
    }

    pub(crate) fn wait_stop(&self, timeout: Duration) -> bool {
        let g = self.lock();
        let (g, _) = self
            .cv
            .wait_timeout_while(g, timeout, |f| !f.stop)
            .unwrap_or_else(PoisonError::into_inner);
        g.stop
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn starts_stopped() {
        let c = Confirmations::new();
        assert!(c.is_stopped());
        assert!(!c.is_playing());
        assert!(!c.wait_play(Duration::from_millis(1)));
        assert!(c.wait_stop(Duration::from_millis(1)));
    }

    #[test]
    fn pending_times_out_both_ways() {
        let c = Confirmations::new();
        c.begin_pending(1);
        assert!(!c.wait_play(Duration::from_millis(5)));
        assert!(!c.wait_stop(Duration::from_millis(5)));
    }

    #[test]
    fn waiter_wakes_on_play() {
        let c = Arc::new(Confirmations::new());
        c.begin_pending(1);
        let waiter = c.clone();
        let handle = thread::spawn(move || waiter.wait_play(Duration::from_secs(2)));
        thread::sleep(Duration::from_millis(10));
        c.confirm_playing(1);
        assert!(handle.join().unwrap());
    }

    #[test]
    fn short_session_still_confirms_play() {
        let c = Confirmations::new();
        c.begin_pending(1);
        c.confirm_playing(1);
        c.confirm_stopped(1);
        assert!(c.wait_play(Duration::from_millis(1)));
        c.begin_pending(2);
        c.confirm_stopped(2);
        assert!(!c.wait_play(Duration::from_millis(1)));
    }

    #[test]
    fn failed_start_releases_play_waiter_negatively() {
        let c = Arc::new(Confirmations::new());
        c.begin_pending(1);
        let waiter = c.clone();
        let handle = thread::spawn(move || waiter.wait_play(Duration::from_secs(2)));
        thread::sleep(Duration::from_millis(10));
        c.confirm_stopped(1);
        assert!(!handle.join().unwrap());
    }

    #[test]
    fn stale_stop_does_not_settle_a_newer_session() {
        let c = Confirmations::new();
        c.begin_pending(1);
        c.begin_pending(2);
        c.confirm_playing(1);
        c.confirm_stopped(1);
        assert!(!c.is_stopped());
        assert!(!c.is_playing());
        assert!(!c.wait_play(Duration::from_millis(5)));

        c.confirm_playing(2);
        assert!(c.wait_play(Duration::from_millis(1)));
        c.confirm_stopped(2);
        assert!(c.wait_stop(Duration::from_millis(1)));
    }

    #[test]
    fn close_settles_regardless_of_pending() {
        let c = Confirmations::new();
        c.begin_pending(3);
        c.close();
        assert!(c.is_stopped());
        assert!(!c.wait_play(Duration::from_millis(1)));
    }
}
