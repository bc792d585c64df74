//! Errors surfaced by the render RPC layer.

use std::fmt;

use actix_web::HttpResponse;
use actix_web::http::StatusCode;
use spotifice_types::{ErrorBody, ErrorKind};

use crate::engine::EngineError;
use crate::source::SourceError;

#[derive(Debug)]
pub enum RenderError {
    /// No media server has been bound yet.
    NoSource,
    /// `bind` could not reach the given media server.
    Unreachable { server: String, reason: String },
    NoTrack,
    /// A session is already claimed or playing.
    Busy,
    PlayNotConfirmed,
    StopNotConfirmed,
    Engine(EngineError),
    Source(SourceError),
}

impl RenderError {
    /// Wire form of this error.
    pub fn body(&self) -> ErrorBody {
        match self {
            RenderError::NoSource => ErrorBody::new(ErrorKind::BadReference, "No media server bound"),
            RenderError::Unreachable { server, reason } => ErrorBody::new(
                ErrorKind::BadReference,
                format!("MediaServer not reachable: {reason}"),
            )
            .with_item(server.as_str()),
            RenderError::NoTrack => ErrorBody::new(ErrorKind::TrackError, "No track loaded"),
            RenderError::Busy => ErrorBody::new(ErrorKind::PlayerError, "Already playing"),
            RenderError::PlayNotConfirmed => {
                ErrorBody::new(ErrorKind::PlayerError, "Failed to confirm playback")
            }
            RenderError::StopNotConfirmed => {
                ErrorBody::new(ErrorKind::PlayerError, "Failed to confirm stop")
            }
            RenderError::Engine(EngineError::NotPlaying) => {
                ErrorBody::new(ErrorKind::PlayerError, "Not playing")
            }
            RenderError::Engine(e) => ErrorBody::new(ErrorKind::PlayerError, e.to_string()),
            RenderError::Source(SourceError::Remote(body)) => body.clone(),
            RenderError::Source(SourceError::Transport(msg)) => ErrorBody::new(
                ErrorKind::BadReference,
                format!("MediaServer request failed: {msg}"),
            ),
        }
    }

    /// Convert into an HTTP response carrying the JSON error body.
    pub fn into_response(self) -> HttpResponse {
        let body = self.body();
        let status = StatusCode::from_u16(body.kind.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        HttpResponse::build(status).json(body)
    }
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.body())
    }
}

impl std::error::Error for RenderError {}

impl From<SourceError> for RenderError {
    fn from(e: SourceError) -> Self {
        RenderError::Source(e)
    }
}

impl From<EngineError> for RenderError {
    fn from(e: EngineError) -> Self {
        RenderError::Engine(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_errors_pass_through() {
        let remote = ErrorBody::new(ErrorKind::TrackError, "Track not found").with_item("a.mp3");
        let err = RenderError::Source(SourceError::Remote(remote.clone()));
        assert_eq!(err.body(), remote);
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn player_errors_map_to_conflict() {
        let resp = RenderError::Busy.into_response();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        assert_eq!(RenderError::Busy.to_string(), "PlayerError: Already playing");
    }

    #[test]
    fn unreachable_server_is_bad_reference() {
        let err = RenderError::Unreachable {
            server: "http://10.0.0.1:10000".into(),
            reason: "connection refused".into(),
        };
        let body = err.body();
        assert_eq!(body.kind, ErrorKind::BadReference);
        assert!(body.reason.starts_with("MediaServer not reachable: "));
        assert_eq!(err.into_response().status(), StatusCode::BAD_GATEWAY);
    }
}
