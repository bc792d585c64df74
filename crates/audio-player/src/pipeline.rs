//! Pipeline wiring: byte feed → decode → optional resample → output stream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use cpal::traits::StreamTrait;
use symphonia::core::io::MediaSource;
use symphonia::core::probe::Hint;

use crate::config::PlaybackConfig;
use crate::playback::OutputControl;
use crate::status::OutputStatusState;
use crate::{decode, device, playback, resample};

/// Everything one pipeline run needs besides its input.
pub struct PipelineParams {
    pub device: cpal::Device,
    pub playback: PlaybackConfig,
    pub control: OutputControl,
    /// Set by the owner to abandon playback; queued audio is discarded.
    pub cancel: Arc<AtomicBool>,
    pub status: Option<Arc<Mutex<OutputStatusState>>>,
}

/// Decode `source` and play it on `params.device`, blocking until the decoded audio has
/// been played out or `params.cancel` is set.
pub fn run_pipeline(source: Box<dyn MediaSource>, hint: Hint, params: PipelineParams) -> Result<()> {
    let PipelineParams {
        device,
        playback: cfg,
        control,
        cancel,
        status,
    } = params;

    let decoded = decode::start_streaming_decode(source, hint, cfg.buffer_seconds, cancel.clone())?;
    let src_spec = decoded.spec;
    let srcq = decoded.queue.clone();

    let config = device::pick_output_config(&device, Some(src_spec.rate))?;
    let mut stream_config: cpal::StreamConfig = config.config();
    if let Some(buffer_size) = device::pick_buffer_size(&config) {
        stream_config.buffer_size = buffer_size;
    }
    let dst_rate = stream_config.sample_rate;

    let dstq = if src_spec.rate == dst_rate {
        tracing::debug!(rate_hz = dst_rate, "resample skipped");
        srcq.clone()
    } else {
        tracing::info!(from_hz = src_spec.rate, to_hz = dst_rate, "resampling");
        resample::start_resampler(
            srcq.clone(),
            src_spec,
            dst_rate,
            resample::ResampleConfig {
                chunk_frames: cfg.chunk_frames,
                buffer_seconds: cfg.buffer_seconds,
            },
        )?
    };

    if let Some(status) = &status {
        let mut s = status.lock().unwrap_or_else(PoisonError::into_inner);
        s.device = Some(device::device_name(&device));
        s.sample_rate = Some(dst_rate);
        s.channels = Some(stream_config.channels);
        s.source_codec = decoded.info.codec.clone();
        s.resampling = Some(src_spec.rate != dst_rate);
        s.control = Some(control.clone());
    }
    tracing::info!(
        device = %device::device_name(&device),
        rate_hz = dst_rate,
        channels = stream_config.channels,
        codec = decoded.info.codec.as_deref().unwrap_or("unknown"),
        "output stream opened"
    );

    let result = play_until_drained(
        &device,
        &config,
        &stream_config,
        &dstq,
        cfg.refill_max_frames,
        control,
        &cancel,
    );

    srcq.abort();
    dstq.abort();
    if let Some(status) = &status {
        status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
    result
}

fn play_until_drained(
    device: &cpal::Device,
    config: &cpal::SupportedStreamConfig,
    stream_config: &cpal::StreamConfig,
    dstq: &Arc<crate::queue::SharedAudio>,
    refill_max_frames: usize,
    control: OutputControl,
    cancel: &AtomicBool,
) -> Result<()> {
    let stream = playback::build_output_stream(
        device,
        stream_config,
        config.sample_format(),
        dstq,
        refill_max_frames,
        control,
    )
    .with_context(|| format!("build output stream on {}", device::device_name(device)))?;
    stream.play().context("start output stream")?;

    if dstq.wait_drained(cancel, None) {
        // Let the device play out its own buffer before the stream is dropped.
        thread::sleep(Duration::from_millis(100));
    } else if cancel.load(Ordering::Relaxed) {
        tracing::debug!("pipeline cancelled");
    }
    drop(stream);
    Ok(())
}
