use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use media_render::cli::Args;
use media_render::config::{RenderListenConfig, RenderPlayConfig};
use media_render::runtime;

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,actix_web=info,media_render=info,audio_player=info")
        }))
        .init();

    if args.list_devices {
        return runtime::list_devices();
    }
    if let Some(config) = RenderListenConfig::from_args(&args) {
        return runtime::run_listen(config);
    }
    if let Some(config) = RenderPlayConfig::from_args(&args) {
        return runtime::run_play(config);
    }
    Err(anyhow::anyhow!(
        "no command given; use `listen`, `play <path>` or --list-devices"
    ))
}
