//! Playback stage (CPAL output stream).
//!
//! The output callback:
//! - refills a small local buffer from the shared queue without blocking
//! - applies basic channel mapping (mono↔stereo, best-effort otherwise)
//! - converts `f32` samples to the device sample format

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use anyhow::{Result, anyhow};
use cpal::traits::DeviceTrait;

use crate::queue::{PopStrategy, SharedAudio};

/// Shared flags and counters wired into the output callback.
#[derive(Clone, Debug, Default)]
pub struct OutputControl {
    /// While `true` the callback writes silence and leaves the queue untouched.
    pub paused: Arc<AtomicBool>,
    /// Frames written to the device.
    pub played_frames: Arc<AtomicU64>,
    /// Frames of silence written because the queue ran dry.
    pub underrun_frames: Arc<AtomicU64>,
    pub underrun_events: Arc<AtomicU64>,
}

/// Build a CPAL output stream that plays interleaved `f32` samples from `queue`.
///
/// `queue` must already be at the device sample rate. Underruns are filled with silence.
pub fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    queue: &Arc<SharedAudio>,
    refill_max_frames: usize,
    control: OutputControl,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => {
            build_stream::<f32>(device, config, queue, refill_max_frames, control)
        }
        cpal::SampleFormat::I16 => {
            build_stream::<i16>(device, config, queue, refill_max_frames, control)
        }
        cpal::SampleFormat::I32 => {
            build_stream::<i32>(device, config, queue, refill_max_frames, control)
        }
        cpal::SampleFormat::U16 => {
            build_stream::<u16>(device, config, queue, refill_max_frames, control)
        }
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    queue: &Arc<SharedAudio>,
    refill_max_frames: usize,
    control: OutputControl,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32> + Send + 'static,
{
    let channels_out = (config.channels as usize).max(1);
    let refill_max_frames = refill_max_frames.max(1);
    let queue = queue.clone();
    let mut local = LocalBuffer {
        pos: 0,
        src_channels: queue.channels(),
        src: Vec::new(),
    };
    let silence = <T as cpal::Sample>::from_sample::<f32>(0.0);

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            if control.paused.load(Ordering::Relaxed) {
                data.fill(silence);
                return;
            }

            let frames = data.len() / channels_out;
            let mut filled_frames = 0usize;

            for frame in 0..frames {
                if local.pos >= local.src.len() {
                    local.pos = 0;
                    local.src.clear();
                    match queue.pop(PopStrategy::NonBlocking {
                        max_frames: refill_max_frames,
                    }) {
                        Some(v) => local.src = v,
                        None => {
                            if !queue.is_done() {
                                control.underrun_events.fetch_add(1, Ordering::Relaxed);
                                control
                                    .underrun_frames
                                    .fetch_add((frames - frame) as u64, Ordering::Relaxed);
                            }
                            data[frame * channels_out..].fill(silence);
                            break;
                        }
                    }
                }
                for ch in 0..channels_out {
                    let sample = local.next_mapped(channels_out, ch);
                    data[frame * channels_out + ch] = <T as cpal::Sample>::from_sample(sample);
                }
                filled_frames += 1;
            }

            if filled_frames > 0 {
                control
                    .played_frames
                    .fetch_add(filled_frames as u64, Ordering::Relaxed);
            }
        },
        |err| tracing::warn!("stream error: {err}"),
        None,
    )?;

    Ok(stream)
}

/// Samples popped from the queue but not yet written to the device.
struct LocalBuffer {
    pos: usize,
    src_channels: usize,
    src: Vec<f32>,
}

impl LocalBuffer {
    /// Sample for output channel `dst_ch`; advances one source frame after the last channel.
    ///
    /// mono→stereo duplicates, stereo→mono averages, other layouts clamp to the last
    /// available source channel.
    fn next_mapped(&mut self, dst_channels: usize, dst_ch: usize) -> f32 {
        if self.pos >= self.src.len() {
            return 0.0;
        }

        let frame_start = self.pos;
        let get = |ch: usize| -> f32 {
            if ch < self.src_channels {
                self.src.get(frame_start + ch).copied().unwrap_or(0.0)
            } else {
                0.0
            }
        };

        let out = match (self.src_channels, dst_channels) {
            (2, 1) => 0.5 * (get(0) + get(1)),
            (1, _) => get(0),
            _ => get(dst_ch.min(self.src_channels.saturating_sub(1))),
        };

        if dst_ch + 1 == dst_channels {
            self.pos += self.src_channels;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames_of(buf: &mut LocalBuffer, dst_channels: usize, n: usize) -> Vec<f32> {
        let mut out = Vec::new();
        for _ in 0..n {
            for ch in 0..dst_channels {
                out.push(buf.next_mapped(dst_channels, ch));
            }
        }
        out
    }

    #[test]
    fn mono_is_duplicated_to_stereo() {
        let mut buf = LocalBuffer {
            pos: 0,
            src_channels: 1,
            src: vec![0.25, 0.5],
        };
        assert_eq!(frames_of(&mut buf, 2, 2), vec![0.25, 0.25, 0.5, 0.5]);
    }

    #[test]
    fn stereo_is_averaged_to_mono() {
        let mut buf = LocalBuffer {
            pos: 0,
            src_channels: 2,
            src: vec![1.0, 0.0, 0.5, 0.5],
        };
        assert_eq!(frames_of(&mut buf, 1, 2), vec![0.5, 0.5]);
    }

    #[test]
    fn exhausted_buffer_yields_silence() {
        let mut buf = LocalBuffer {
            pos: 0,
            src_channels: 2,
            src: vec![0.1, 0.2],
        };
        assert_eq!(frames_of(&mut buf, 2, 2), vec![0.1, 0.2, 0.0, 0.0]);
    }
}
