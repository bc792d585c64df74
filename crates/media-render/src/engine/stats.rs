use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Process-lifetime counters of data delivered to the sink.
#[derive(Debug, Default)]
pub struct EngineStats {
    chunks: AtomicU64,
    bytes: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub chunks: u64,
    pub bytes: u64,
}

impl EngineStats {
    pub(crate) fn record(&self, bytes: usize) {
        self.chunks.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            chunks: self.chunks.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }
}

/// Per-session throughput estimate from the gap between chunk deliveries.
#[derive(Debug)]
pub(crate) struct RateMeter {
    last: Option<Instant>,
    verbose: bool,
}

impl RateMeter {
    pub(crate) fn new(verbose: bool) -> Self {
        Self {
            last: None,
            verbose,
        }
    }

    /// Record a delivery at `now`; returns kB/s once two deliveries have been seen.
    pub(crate) fn record_at(&mut self, bytes: usize, now: Instant) -> Option<f64> {
        let rate = self.last.and_then(|last| {
            let elapsed = now.saturating_duration_since(last).as_secs_f64();
            (elapsed > 0.0).then(|| bytes as f64 / elapsed / 1000.0)
        });
        self.last = Some(now);
        if let Some(kbps) = rate {
            if self.verbose {
                tracing::info!(rate_kb_s = %format!("{kbps:.2}"), bytes, "chunk delivered");
            } else {
                tracing::debug!(rate_kb_s = %format!("{kbps:.2}"), bytes, "chunk delivered");
            }
        }
        rate
    }

    pub(crate) fn record(&mut self, bytes: usize) -> Option<f64> {
        self.record_at(bytes, Instant::now())
    }
}
