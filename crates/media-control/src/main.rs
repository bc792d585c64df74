//! `media-control` — drive a media server and a render node from the command line.
//!
//! The `demo` subcommand walks through a whole session: list tracks, bind the render
//! node to the server, play the first track for a few seconds, then switch to the second.

mod remote;

use std::thread;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use spotifice_types::RenderStatus;
use tracing_subscriber::EnvFilter;

use crate::remote::{MediaRender, MediaServer};

#[derive(Parser, Debug)]
#[command(name = "media-control", version)]
struct Args {
    /// Base URL of the media server
    #[arg(long, default_value = "http://127.0.0.1:10000")]
    server: String,

    /// Base URL of the render node
    #[arg(long, default_value = "http://127.0.0.1:10001")]
    render: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the server's tracks
    Tracks,
    /// Bind the render node to the media server
    Bind,
    /// Unbind the render node
    Unbind,
    /// Load a track into the render node
    Load { track_id: String },
    Play,
    Stop,
    Pause,
    Resume,
    /// Show the render node status
    Status,
    /// Play the first two tracks back to back
    Demo {
        /// Seconds to play the first track
        #[arg(long, default_value_t = 5)]
        first_secs: u64,
        /// Seconds to play the second track
        #[arg(long, default_value_t = 3)]
        second_secs: u64,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,media_control=info")),
        )
        .init();

    let server = MediaServer::new(&args.server);
    let render = MediaRender::new(&args.render);

    match args.cmd {
        Command::Tracks => {
            for t in server.all_tracks()? {
                println!("- {}: {}", t.id, t.title);
            }
        }
        Command::Bind => render.bind(server.base())?,
        Command::Unbind => render.unbind()?,
        Command::Load { track_id } => {
            let info = render.load(&track_id)?;
            println!("Loaded {} - {}", info.id, info.title);
        }
        Command::Play => render.play()?,
        Command::Stop => render.stop()?,
        Command::Pause => render.pause()?,
        Command::Resume => render.resume()?,
        Command::Status => print_status(&render.status()?),
        Command::Demo {
            first_secs,
            second_secs,
        } => run_demo(
            &server,
            &render,
            Duration::from_secs(first_secs),
            Duration::from_secs(second_secs),
        )?,
    }
    Ok(())
}

fn run_demo(
    server: &MediaServer,
    render: &MediaRender,
    first: Duration,
    second: Duration,
) -> Result<()> {
    println!("Fetching all tracks...");
    let tracks = server.all_tracks()?;
    for t in &tracks {
        println!("- {}: {}", t.id, t.title);
    }
    let Some(head) = tracks.first() else {
        println!("No tracks found.");
        return Ok(());
    };

    println!("Requesting info for track {}", head.id);
    let info = server.track_info(&head.id)?;
    println!("Track info: {} - {}", info.id, info.title);
    println!("Loading track into MediaRender...");

    render.bind(server.base())?;
    render.stop()?;
    render.load(&info.id)?;
    render.play()?;
    tracing::info!(track_id = %info.id, secs = first.as_secs(), "playing first track");
    thread::sleep(first);
    render.stop()?;

    let Some(next) = tracks.get(1) else {
        println!("Only one track available; demo finished.");
        return Ok(());
    };
    render.load(&next.id)?;
    render.play()?;
    tracing::info!(track_id = %next.id, secs = second.as_secs(), "playing second track");
    thread::sleep(second);
    print_status(&render.status()?);
    Ok(())
}

fn print_status(status: &RenderStatus) {
    println!("render:  {}", status.render_id);
    println!("state:   {}", status.state);
    println!("server:  {}", status.server.as_deref().unwrap_or("-"));
    match &status.track {
        Some(t) => println!("track:   {} ({})", t.title, t.id),
        None => println!("track:   -"),
    }
    println!("data:    {} chunks, {} bytes", status.chunks, status.bytes);
    if let Some(device) = &status.device {
        let rate = status
            .sample_rate
            .map(|r| format!("{r} Hz"))
            .unwrap_or_else(|| "-".to_string());
        println!("device:  {device} @ {rate}");
    }
    if let Some(ms) = status.elapsed_ms {
        println!("elapsed: {:.1}s", ms as f64 / 1000.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_local_services() {
        let args = Args::try_parse_from(["media-control", "status"]).unwrap();
        assert_eq!(args.server, "http://127.0.0.1:10000");
        assert_eq!(args.render, "http://127.0.0.1:10001");
        assert!(matches!(args.cmd, Command::Status));
    }

    #[test]
    fn demo_durations_are_configurable() {
        let args =
            Args::try_parse_from(["media-control", "demo", "--first-secs", "1"]).unwrap();
        assert!(matches!(
            args.cmd,
            Command::Demo {
                first_secs: 1,
                second_secs: 3
            }
        ));
    }
}
