use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub use audio_player::config::{PlaybackConfig, SinkConfig};

use crate::cli::{Args, Command};

#[derive(Clone, Debug)]
pub struct RenderListenConfig {
    pub http_bind: SocketAddr,
    pub render_id: String,
    pub server: Option<String>,
    pub confirm_timeout: Duration,
    pub sink: SinkConfig,
}

#[derive(Clone, Debug)]
pub struct RenderPlayConfig {
    pub path: PathBuf,
    pub show_stats: bool,
    pub sink: SinkConfig,
}

/// Sink settings shared by both subcommands.
pub fn sink_config(args: &Args) -> SinkConfig {
    SinkConfig {
        device: normalize_device_name(args.device.clone()),
        max_bytes: args.max_bytes,
        playback: PlaybackConfig {
            chunk_frames: args.chunk_frames,
            refill_max_frames: args.refill_max_frames,
            buffer_seconds: args.buffer_seconds,
        },
        ..SinkConfig::default()
    }
}

impl RenderListenConfig {
    pub fn from_args(args: &Args) -> Option<Self> {
        match &args.cmd {
            Some(Command::Listen {
                bind,
                id,
                server,
                confirm_timeout_ms,
            }) => Some(Self {
                http_bind: *bind,
                render_id: id.trim().to_string(),
                server: server.clone().filter(|s| !s.trim().is_empty()),
                confirm_timeout: Duration::from_millis(*confirm_timeout_ms),
                sink: sink_config(args),
            }),
            _ => None,
        }
    }
}

impl RenderPlayConfig {
    pub fn from_args(args: &Args) -> Option<Self> {
        match &args.cmd {
            Some(Command::Play { path, stats }) => {
                let mut sink = sink_config(args);
                sink.hint_extension = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(str::to_ascii_lowercase);
                Some(Self {
                    path: path.clone(),
                    show_stats: *stats,
                    sink,
                })
            }
            _ => None,
        }
    }
}

pub(crate) fn normalize_device_name(device: Option<String>) -> Option<String> {
    device.and_then(|name| {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
