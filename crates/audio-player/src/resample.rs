//! Streaming resample stage.
//!
//! Uses Rubato to convert decoded interleaved `f32` audio from the source rate to the
//! output device rate. Runs in a background thread and writes into a bounded
//! [`SharedAudio`] queue consumed by the playback stage.

use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    Async, FixedAsync, Indexing, Resampler, SincInterpolationParameters, SincInterpolationType,
    WindowFunction, calculate_cutoff,
};
use symphonia::core::audio::SignalSpec;

use crate::queue::{PopStrategy, SharedAudio, calc_max_buffered_samples};

/// Configuration for the streaming resampler stage.
#[derive(Clone, Copy, Debug)]
pub struct ResampleConfig {
    /// Input chunk size in frames for the steady-state loop.
    pub chunk_frames: usize,
    /// Buffering (seconds) of the output queue.
    pub buffer_seconds: f32,
}

/// Start a resampler thread reading `srcq` at `src_spec.rate` and writing `dst_rate`.
///
/// The output queue closes once `srcq` is closed and drained, or on a resampler error.
pub fn start_resampler(
    srcq: Arc<SharedAudio>,
    src_spec: SignalSpec,
    dst_rate: u32,
    cfg: ResampleConfig,
) -> Result<Arc<SharedAudio>> {
    let channels = src_spec.channels.count();
    let ratio = dst_rate as f64 / src_spec.rate as f64;

    let max_buffered_samples = calc_max_buffered_samples(dst_rate, channels, cfg.buffer_seconds);
    let dstq = Arc::new(SharedAudio::new(channels, max_buffered_samples));

    let sinc_len = 128;
    let window = WindowFunction::BlackmanHarris2;
    let params = SincInterpolationParameters {
        sinc_len,
        f_cutoff: calculate_cutoff(sinc_len, window),
        interpolation: SincInterpolationType::Cubic,
        oversampling_factor: 256,
        window,
    };
    let chunk_frames = cfg.chunk_frames.max(1);

    let resampler = Async::<f32>::new_sinc(
        ratio,
        1.1,
        &params,
        chunk_frames,
        channels,
        FixedAsync::Input,
    )
    .context("create resampler")?;

    let dstq_thread = dstq.clone();
    thread::Builder::new()
        .name("audio-resample".into())
        .spawn(move || {
            let mut stage = ResampleStage {
                resampler: Box::new(resampler),
                channels,
                out: vec![0.0f32; channels * chunk_frames * 3],
            };

            while let Some(block) = srcq.pop(PopStrategy::BlockingExact {
                frames: chunk_frames,
            }) {
                if let Err(e) = stage.process(&block, None, &dstq_thread) {
                    tracing::error!("resampler process error: {e:#}");
                    dstq_thread.close();
                    return;
                }
            }

            // Flush the partial block left when the source closed.
            while let Some(tail) = srcq.pop(PopStrategy::BlockingUpTo {
                max_frames: chunk_frames,
            }) {
                let tail_frames = tail.len() / channels;
                if tail_frames == 0 {
                    continue;
                }
                if let Err(e) = stage.process(&tail, Some(tail_frames), &dstq_thread) {
                    tracing::error!("resampler tail error: {e:#}");
                    break;
                }
            }

            dstq_thread.close();
        })
        .context("spawn resampler thread")?;

    Ok(dstq)
}

struct ResampleStage {
    resampler: Box<dyn Resampler<f32>>,
    channels: usize,
    out: Vec<f32>,
}

impl ResampleStage {
    fn process(&mut self, input: &[f32], partial: Option<usize>, dstq: &SharedAudio) -> Result<()> {
        let frames = input.len() / self.channels;
        let input_adapter = InterleavedSlice::new(input, self.channels, frames)
            .context("interleaved slice (input)")?;

        let out_frames = self.out.len() / self.channels;
        let mut output_adapter = InterleavedSlice::new_mut(&mut self.out, self.channels, out_frames)
            .context("interleaved slice (output)")?;

        let indexing = Indexing {
            input_offset: 0,
            output_offset: 0,
            active_channels_mask: None,
            partial_len: partial,
        };

        let (_consumed, produced) = self
            .resampler
            .process_into_buffer(&input_adapter, &mut output_adapter, Some(&indexing))
            .context("resample block")?;

        let produced_samples = produced * self.channels;
        if produced_samples > 0 {
            dstq.push_interleaved_blocking(&self.out[..produced_samples]);
        }
        Ok(())
    }
}
