use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "media-render", version)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Option<Command>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// Resampler input chunk size in frames (higher => more latency, lower => more overhead)
    #[arg(long, default_value_t = 1024)]
    pub chunk_frames: usize,

    /// Playback callback refill cap (frames). Larger reduces lock churn but can add latency.
    #[arg(long, default_value_t = 4096)]
    pub refill_max_frames: usize,

    /// Queue buffer target in seconds (per stage)
    #[arg(long, default_value_t = 0.5)]
    pub buffer_seconds: f32,

    /// Encoded bytes buffered ahead of the decoder before the sink stops asking for data
    #[arg(long, default_value_t = 8192)]
    pub max_bytes: usize,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the render HTTP API
    Listen {
        /// HTTP API bind address
        #[arg(long, default_value = "0.0.0.0:10001")]
        bind: SocketAddr,

        /// Identity used when opening streams on the media server
        #[arg(long, default_value = "mediaRender1")]
        id: String,

        /// Media server to bind at startup, e.g. http://127.0.0.1:10000
        #[arg(long)]
        server: Option<String>,

        /// How long play/stop wait for the engine to confirm (ms)
        #[arg(long, default_value_t = 2000)]
        confirm_timeout_ms: u64,
    },

    /// Play a local file through the streaming engine
    Play {
        /// Path to an encoded audio file
        path: PathBuf,

        /// Log per-chunk throughput
        #[arg(long)]
        stats: bool,
    },
}
