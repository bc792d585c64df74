//! Wire types shared by the media server, the render node and the control client.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Catalog entry describing one track served by a media server.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TrackInfo {
    /// Stable track id (the media file name).
    pub id: String,
    /// Display title (the file stem).
    pub title: String,
}

/// Body of `POST /streams/{render_id}` on the media server.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct StartStreamRequest {
    /// Track to open for the renderer.
    pub track_id: String,
}

/// Body of `POST /bind` on the render node.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct BindRequest {
    /// Media server base URL, e.g. `http://127.0.0.1:10000`.
    pub server: String,
}

/// Body of `POST /load` on the render node.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct LoadTrackRequest {
    pub track_id: String,
}

/// Playback state reported by a render node.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PlaybackState::Stopped => "stopped",
            PlaybackState::Playing => "playing",
            PlaybackState::Paused => "paused",
        };
        f.write_str(label)
    }
}

/// Snapshot returned by `GET /status` on the render node.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RenderStatus {
    /// Identity this renderer uses when opening streams.
    pub render_id: String,
    /// Current pipeline state.
    pub state: PlaybackState,
    /// Bound media server base URL.
    pub server: Option<String>,
    /// Loaded track, if any.
    pub track: Option<TrackInfo>,
    /// Chunks delivered to the pipeline during the current process lifetime.
    pub chunks: u64,
    /// Bytes delivered to the pipeline during the current process lifetime.
    pub bytes: u64,
    /// Output device in use, if the pipeline has opened one.
    pub device: Option<String>,
    /// Output sample rate (Hz).
    pub sample_rate: Option<u32>,
    /// Output channel count.
    pub channels: Option<u16>,
    /// Elapsed playback of the current session in milliseconds.
    pub elapsed_ms: Option<u64>,
    /// Frames of silence emitted because the pipeline starved.
    pub underrun_frames: Option<u64>,
}

/// Category of a failed remote call.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Unknown or missing track.
    TrackError,
    /// No open stream for the renderer.
    StreamError,
    /// File could not be opened or read.
    IoError,
    /// Renderer identity is not usable.
    BadIdentity,
    /// A referenced peer is missing or unreachable.
    BadReference,
    /// Player refused the request in its current state.
    PlayerError,
}

impl ErrorKind {
    /// HTTP status code used for this error category.
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::TrackError | ErrorKind::StreamError => 404,
            ErrorKind::BadIdentity => 400,
            ErrorKind::IoError => 500,
            ErrorKind::BadReference => 502,
            ErrorKind::PlayerError => 409,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::TrackError => "TrackError",
            ErrorKind::StreamError => "StreamError",
            ErrorKind::IoError => "IOError",
            ErrorKind::BadIdentity => "BadIdentity",
            ErrorKind::BadReference => "BadReference",
            ErrorKind::PlayerError => "PlayerError",
        };
        f.write_str(label)
    }
}

/// JSON error payload returned by both services.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ErrorBody {
    pub kind: ErrorKind,
    /// Offending item (track id, render id, path) when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<String>,
    pub reason: String,
}

impl ErrorBody {
    pub fn new(kind: ErrorKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            item: None,
            reason: reason.into(),
        }
    }

    pub fn with_item(mut self, item: impl Into<String>) -> Self {
        self.item = Some(item.into());
        self
    }
}

impl fmt::Display for ErrorBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.item {
            Some(item) => write!(f, "{}: {} ({item})", self.kind, self.reason),
            None => write!(f, "{}: {}", self.kind, self.reason),
        }
    }
}

impl std::error::Error for ErrorBody {}
