use std::sync::{Arc, Mutex};
use std::sync::atomic::Ordering;

use crate::playback::OutputControl;

/// Output-side status updated by a running pipeline.
#[derive(Debug, Default)]
pub struct OutputStatusState {
    /// Selected output device name.
    pub device: Option<String>,
    /// Effective output sample rate in Hz.
    pub sample_rate: Option<u32>,
    /// Effective output channel count.
    pub channels: Option<u16>,
    /// Source codec name (for example MP3).
    pub source_codec: Option<String>,
    /// Whether a resampler stage is active.
    pub resampling: Option<bool>,
    /// Counters shared with the output callback.
    pub control: Option<OutputControl>,
}

/// Point-in-time copy of [`OutputStatusState`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OutputSnapshot {
    pub device: Option<String>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    pub source_codec: Option<String>,
    pub resampling: Option<bool>,
    pub paused: bool,
    pub elapsed_ms: Option<u64>,
    pub underrun_frames: Option<u64>,
    pub underrun_events: Option<u64>,
}

impl OutputStatusState {
    /// Create a shared, mutex-protected status store.
    pub fn shared() -> Arc<Mutex<Self>> {
        Arc::new(Mutex::new(Self::default()))
    }

    pub fn snapshot(&self) -> OutputSnapshot {
        let control = self.control.as_ref();
        let elapsed_ms = match (control, self.sample_rate) {
            (Some(c), Some(sr)) if sr > 0 => {
                Some(c.played_frames.load(Ordering::Relaxed).saturating_mul(1000) / sr as u64)
            }
            _ => None,
        };
        OutputSnapshot {
            device: self.device.clone(),
            sample_rate: self.sample_rate,
            channels: self.channels,
            source_codec: self.source_codec.clone(),
            resampling: self.resampling,
            paused: control
                .map(|c| c.paused.load(Ordering::Relaxed))
                .unwrap_or(false),
            elapsed_ms,
            underrun_frames: control.map(|c| c.underrun_frames.load(Ordering::Relaxed)),
            underrun_events: control.map(|c| c.underrun_events.load(Ordering::Relaxed)),
        }
    }

    /// Forget the current pipeline; the device name is kept for display.
    pub fn clear(&mut self) {
        self.sample_rate = None;
        self.channels = None;
        self.source_codec = None;
        self.resampling = None;
        self.control = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reports_elapsed_and_paused() {
        let control = OutputControl::default();
        control.played_frames.store(88_200, Ordering::Relaxed);
        control.paused.store(true, Ordering::Relaxed);
        let state = OutputStatusState {
            sample_rate: Some(44_100),
            control: Some(control),
            ..Default::default()
        };

        let snap = state.snapshot();
        assert_eq!(snap.elapsed_ms, Some(2000));
        assert!(snap.paused);
        assert_eq!(snap.underrun_frames, Some(0));
    }

    #[test]
    fn clear_keeps_device_name() {
        let mut state = OutputStatusState {
            device: Some("USB DAC".to_string()),
            sample_rate: Some(48_000),
            channels: Some(2),
            control: Some(OutputControl::default()),
            ..Default::default()
        };
        state.clear();
        let snap = state.snapshot();
        assert_eq!(snap.device.as_deref(), Some("USB DAC"));
        assert!(snap.sample_rate.is_none());
        assert!(snap.elapsed_ms.is_none());
    }
}
