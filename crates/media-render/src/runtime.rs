//! Render runtime helpers.
//!
//! Provides device enumeration, the local try-player, and HTTP listener startup.

use std::fs::File;
use std::io::Read;
use std::sync::{Arc, Mutex};

use actix_web::middleware::Logger;
use actix_web::{App, HttpServer, web};
use anyhow::{Context, Result};
use audio_player::device;
use audio_player::status::OutputStatusState;
use audio_player::{SinkConfig, StreamSink};
use cpal::traits::HostTrait;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::{RenderListenConfig, RenderPlayConfig};
use crate::engine::{
    ChunkFn, DEFAULT_CONFIRM_TIMEOUT, EndedHook, EngineOptions, PlaybackEngine, SinkFactory,
};
use crate::service::RenderService;
use crate::source::HttpConnector;
use crate::{http_api, openapi};

/// Print output device names to stdout.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    let default = host
        .default_output_device()
        .map(|d| device::device_name(&d));
    for name in device::list_devices(&host)? {
        let marker = if default.as_deref() == Some(name.as_str()) { "*" } else { " " };
        println!("{marker} {name}");
    }
    Ok(())
}

/// Sink factory building a [`StreamSink`] that reports into `status`.
pub fn stream_sink_factory(
    config: SinkConfig,
    status: Arc<Mutex<OutputStatusState>>,
) -> SinkFactory {
    Box::new(move || {
        let sink = StreamSink::new(config.clone()).with_status(status.clone());
        Ok(Box::new(sink) as Box<dyn audio_player::Sink>)
    })
}

/// Run the render HTTP API until the server is stopped, then shut the engine down.
pub fn run_listen(config: RenderListenConfig) -> Result<()> {
    let status = OutputStatusState::shared();
    let engine = PlaybackEngine::new(
        stream_sink_factory(config.sink.clone(), status.clone()),
        EngineOptions::default(),
    )?;
    let service = web::Data::new(
        RenderService::new(
            config.render_id.clone(),
            engine,
            Box::new(HttpConnector::default()),
            config.confirm_timeout,
        )
        .with_output_status(status),
    );

    if let Some(server) = config.server.as_deref() {
        if let Err(e) = service.bind_source(server) {
            tracing::warn!(server, error = %e, "startup bind failed");
        }
    }

    tracing::info!(
        bind = %config.http_bind,
        render_id = %config.render_id,
        device = ?config.sink.device,
        "starting media-render"
    );

    let state = service.clone();
    let served = actix_web::rt::System::new().block_on(async move {
        HttpServer::new(move || {
            App::new()
                .app_data(state.clone())
                .wrap(Logger::default().exclude("/health").exclude("/status"))
                .service(
                    SwaggerUi::new("/swagger-ui/{_:.*}")
                        .url("/api-doc/openapi.json", openapi::ApiDoc::openapi()),
                )
                .configure(http_api::configure)
        })
        .bind(config.http_bind)
        .with_context(|| format!("bind {}", config.http_bind))?
        .run()
        .await
        .context("http server")
    });

    service.shutdown();
    served
}

/// Play a local file through the engine, the way a remote stream would be played.
pub fn run_play(config: RenderPlayConfig) -> Result<()> {
    let file = File::open(&config.path)
        .with_context(|| format!("open {}", config.path.display()))?;
    let chunk_fn: ChunkFn = Box::new(move |size| {
        let mut buf = vec![0u8; size];
        let n = (&file).read(&mut buf).context("read media file")?;
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some(buf))
    });

    let status = OutputStatusState::shared();
    let engine = PlaybackEngine::new(
        stream_sink_factory(config.sink.clone(), status.clone()),
        EngineOptions {
            verbose_stats: config.show_stats,
        },
    )?;

    let (ended_tx, ended_rx) = crossbeam_channel::bounded::<()>(1);
    let (signal_tx, signal_rx) = crossbeam_channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = signal_tx.try_send(());
    })
    .context("install Ctrl-C handler")?;

    let ended: EndedHook = Box::new(move || {
        let _ = ended_tx.send(());
    });
    tracing::info!(path = %config.path.display(), "playing local file");
    engine.configure(chunk_fn, Some(ended));
    if !engine.confirm_play_starts(DEFAULT_CONFIRM_TIMEOUT) {
        engine.shutdown();
        anyhow::bail!("playback did not start");
    }

    crossbeam_channel::select! {
        recv(ended_rx) -> _ => tracing::info!("playback finished"),
        recv(signal_rx) -> _ => {
            tracing::info!("interrupted");
            if !engine.stop(DEFAULT_CONFIRM_TIMEOUT) {
                tracing::warn!("stop not confirmed");
            }
        }
    }

    if config.show_stats {
        let stats = engine.stats();
        let output = status
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .snapshot();
        tracing::info!(
            chunks = stats.chunks,
            bytes = stats.bytes,
            device = ?output.device,
            "session stats"
        );
    }
    engine.shutdown();
    Ok(())
}
