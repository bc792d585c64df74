use std::time::Duration;

/// Playback tuning parameters shared by decode/resample/playback stages.
#[derive(Clone, Debug)]
pub struct PlaybackConfig {
    /// Resampler chunk size in frames.
    pub chunk_frames: usize,
    /// Max frames pulled per output callback refill.
    pub refill_max_frames: usize,
    /// Target buffer duration for queue sizing.
    pub buffer_seconds: f32,
}

impl Default for PlaybackConfig {
    /// Streamed sources end abruptly, so keep the decoded backlog short.
    fn default() -> Self {
        Self {
            chunk_frames: 1024,
            refill_max_frames: 4096,
            buffer_seconds: 0.5,
        }
    }
}

/// Settings for a [`crate::stream_sink::StreamSink`].
#[derive(Clone, Debug)]
pub struct SinkConfig {
    /// Output device substring match; `None` uses the host default.
    pub device: Option<String>,
    /// Encoded bytes buffered ahead of the decoder before need-data stops.
    pub max_bytes: usize,
    /// Pause before re-requesting data after a request produced nothing.
    pub retry_interval: Duration,
    /// How long a stop waits for already-buffered audio once the source has ended.
    pub drain_timeout: Duration,
    /// Container extension passed to the probe, e.g. `mp3`.
    pub hint_extension: Option<String>,
    pub playback: PlaybackConfig,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            device: None,
            max_bytes: 8192,
            retry_interval: Duration::from_millis(20),
            drain_timeout: Duration::from_millis(1500),
            hint_extension: None,
            playback: PlaybackConfig::default(),
        }
    }
}
