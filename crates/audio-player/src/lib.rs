//! Audio output building blocks: a pull-driven sink fed with encoded bytes, decoded with
//! Symphonia, resampled with Rubato and played through CPAL.

pub mod config;
pub mod decode;
pub mod device;
pub mod feed;
pub mod pipeline;
pub mod playback;
pub mod queue;
pub mod resample;
pub mod sink;
pub mod status;
pub mod stream_sink;

pub use config::{PlaybackConfig, SinkConfig};
pub use feed::ByteFeed;
pub use sink::{PipelineState, Sink, SinkEvent, SinkEventHandler};
pub use stream_sink::StreamSink;
