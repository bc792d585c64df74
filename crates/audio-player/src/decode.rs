//! Streaming decode stage.
//!
//! Uses Symphonia to:
//! - probe the container/codec of a forward-only byte stream
//! - decode packets into interleaved `f32` samples
//! - push samples into a bounded [`SharedAudio`] queue from a background thread

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use anyhow::{Context, Result, anyhow};
use symphonia::core::audio::{SampleBuffer, SignalSpec};
use symphonia::core::codecs::{CodecParameters, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::queue::{SharedAudio, calc_max_buffered_samples};

/// Metadata captured while probing the source.
#[derive(Clone, Debug, Default)]
pub struct SourceInfo {
    /// Codec name (best-effort).
    pub codec: Option<String>,
    /// Source bit depth (best-effort).
    pub bit_depth: Option<u16>,
}

/// A running decode stage.
pub struct DecodedStream {
    pub spec: SignalSpec,
    pub queue: Arc<SharedAudio>,
    pub info: SourceInfo,
    pub thread: thread::JoinHandle<()>,
}

/// Probe `source` and start a decoder thread feeding a queue sized for `buffer_seconds`.
///
/// Probing reads from `source` on the calling thread. The queue is closed on EOF, on a
/// fatal decode error, or once `cancel` is set.
pub fn start_streaming_decode(
    source: Box<dyn MediaSource>,
    hint: Hint,
    buffer_seconds: f32,
    cancel: Arc<AtomicBool>,
) -> Result<DecodedStream> {
    let mss = MediaSourceStream::new(source, Default::default());

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .context("probe audio stream")?;

    let format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| anyhow!("No default audio track"))?;

    let layout = track
        .codec_params
        .channels
        .ok_or_else(|| anyhow!("Unknown channels"))?;
    let rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| anyhow!("Unknown sample rate"))?;

    let spec = SignalSpec::new(rate, layout);
    let channels = layout.count();

    let codec_params: CodecParameters = track.codec_params.clone();
    let info = SourceInfo {
        codec: codec_name_from_params(&codec_params),
        bit_depth: codec_params
            .bits_per_sample
            .or(codec_params.bits_per_coded_sample)
            .and_then(|v| u16::try_from(v).ok()),
    };

    let max_buffered_samples = calc_max_buffered_samples(rate, channels, buffer_seconds);
    let queue = Arc::new(SharedAudio::new(channels, max_buffered_samples));

    let queue_for_thread = queue.clone();
    let thread = thread::Builder::new()
        .name("audio-decode".into())
        .spawn(move || {
            if let Err(e) = decode_format_loop(format, codec_params, &queue_for_thread, &cancel) {
                tracing::error!("decoder thread error: {e:#}");
            }
            queue_for_thread.close();
        })
        .context("spawn decoder thread")?;

    Ok(DecodedStream {
        spec,
        queue,
        info,
        thread,
    })
}

fn decode_format_loop(
    mut format: Box<dyn FormatReader>,
    codec_params: CodecParameters,
    queue: &SharedAudio,
    cancel: &AtomicBool,
) -> Result<()> {
    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .context("create decoder")?;

    loop {
        if cancel.load(Ordering::Relaxed) {
            break;
        }

        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(e) => return Err(e).context("read packet"),
        };

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(e)) => {
                tracing::debug!(error = %e, "skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(e).context("decode packet"),
        };

        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
        sample_buf.copy_interleaved_ref(decoded);

        queue.push_interleaved_blocking(sample_buf.samples());
    }

    Ok(())
}

/// Best-effort codec label used for status payloads.
fn codec_name_from_params(params: &CodecParameters) -> Option<String> {
    use symphonia::core::codecs::*;
    let name = match params.codec {
        CODEC_TYPE_FLAC => "FLAC",
        CODEC_TYPE_MP3 => "MP3",
        CODEC_TYPE_AAC => "AAC",
        CODEC_TYPE_ALAC => "ALAC",
        CODEC_TYPE_VORBIS => "VORBIS",
        CODEC_TYPE_PCM_S16LE | CODEC_TYPE_PCM_S16BE => "PCM_S16",
        CODEC_TYPE_PCM_S24LE | CODEC_TYPE_PCM_S24BE => "PCM_S24",
        CODEC_TYPE_PCM_F32LE | CODEC_TYPE_PCM_F32BE => "PCM_F32",
        _ => return None,
    };
    Some(name.to_string())
}
