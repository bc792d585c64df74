//! Remote chunk source: the media server as seen from a render node.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use spotifice_types::{ErrorBody, StartStreamRequest, TrackInfo};

/// How long `bind` waits for the server health check.
pub const PING_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug)]
pub enum SourceError {
    /// The server answered with an error payload.
    Remote(ErrorBody),
    /// The server could not be reached or answered with something unexpected.
    Transport(String),
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::Remote(body) => write!(f, "{body}"),
            SourceError::Transport(msg) => f.write_str(msg),
        }
    }
}

impl std::error::Error for SourceError {}

/// Track lookup and per-renderer streaming on a media server.
pub trait ChunkSource: Send + Sync {
    /// Base URL or other label identifying the server.
    fn describe(&self) -> String;

    /// Liveness check used when binding.
    fn ping(&self) -> Result<(), SourceError>;

    fn track_info(&self, track_id: &str) -> Result<TrackInfo, SourceError>;

    /// Open `track_id` for `render_id`, replacing any stream it already has.
    fn start_stream(&self, track_id: &str, render_id: &str) -> Result<(), SourceError>;

    fn stop_stream(&self, render_id: &str) -> Result<(), SourceError>;

    /// Next bytes of the open stream; empty once the track is exhausted.
    fn get_audio_chunk(&self, render_id: &str, size: usize) -> Result<Vec<u8>, SourceError>;
}

/// Resolves a server address into a [`ChunkSource`].
pub trait SourceConnector: Send + Sync {
    fn connect(&self, server: &str) -> Result<Arc<dyn ChunkSource>, SourceError>;
}

/// Connector producing [`HttpChunkSource`]s.
#[derive(Clone, Debug)]
pub struct HttpConnector {
    pub request_timeout: Duration,
}

impl Default for HttpConnector {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(2),
        }
    }
}

impl SourceConnector for HttpConnector {
    fn connect(&self, server: &str) -> Result<Arc<dyn ChunkSource>, SourceError> {
        let server = server.trim();
        if !(server.starts_with("http://") || server.starts_with("https://")) {
            return Err(SourceError::Transport(format!(
                "unsupported media server address: {server}"
            )));
        }
        Ok(Arc::new(HttpChunkSource::new(server, self.request_timeout)))
    }
}

/// [`ChunkSource`] speaking the media server's HTTP API.
pub struct HttpChunkSource {
    base: String,
    timeout: Duration,
}

impl HttpChunkSource {
    pub fn new(base: &str, timeout: Duration) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }
}

impl ChunkSource for HttpChunkSource {
    fn describe(&self) -> String {
        self.base.clone()
    }

    fn ping(&self) -> Result<(), SourceError> {
        let resp = ureq::get(&self.url("/health"))
            .config()
            .timeout_per_call(Some(PING_TIMEOUT))
            .http_status_as_error(false)
            .build()
            .call();
        check(resp, "health").map(|_| ())
    }

    fn track_info(&self, track_id: &str) -> Result<TrackInfo, SourceError> {
        let url = self.url(&format!("/tracks/{}", urlencoding::encode(track_id)));
        let resp = ureq::get(&url)
            .config()
            .timeout_per_call(Some(self.timeout))
            .http_status_as_error(false)
            .build()
            .call();
        let mut resp = check(resp, "tracks")?;
        resp.body_mut()
            .read_json()
            .map_err(|e| SourceError::Transport(format!("decode /tracks response: {e}")))
    }

    fn start_stream(&self, track_id: &str, render_id: &str) -> Result<(), SourceError> {
        let url = self.url(&format!("/streams/{}", urlencoding::encode(render_id)));
        let resp = ureq::post(&url)
            .config()
            .timeout_per_call(Some(self.timeout))
            .http_status_as_error(false)
            .build()
            .send_json(StartStreamRequest {
                track_id: track_id.to_string(),
            });
        check(resp, "streams").map(|_| ())
    }

    fn stop_stream(&self, render_id: &str) -> Result<(), SourceError> {
        let url = self.url(&format!("/streams/{}", urlencoding::encode(render_id)));
        let resp = ureq::delete(&url)
            .config()
            .timeout_per_call(Some(self.timeout))
            .http_status_as_error(false)
            .build()
            .call();
        check(resp, "streams").map(|_| ())
    }

    fn get_audio_chunk(&self, render_id: &str, size: usize) -> Result<Vec<u8>, SourceError> {
        let url = self.url(&format!(
            "/streams/{}/chunk?size={size}",
            urlencoding::encode(render_id)
        ));
        let resp = ureq::get(&url)
            .config()
            .timeout_per_call(Some(self.timeout))
            .http_status_as_error(false)
            .build()
            .call();
        let mut resp = check(resp, "chunk")?;
        resp.body_mut()
            .read_to_vec()
            .map_err(|e| SourceError::Transport(format!("read /chunk body: {e}")))
    }
}

/// Turn a ureq result into a successful response or a [`SourceError`].
fn check(
    resp: Result<ureq::http::Response<ureq::Body>, ureq::Error>,
    label: &str,
) -> Result<ureq::http::Response<ureq::Body>, SourceError> {
    let mut resp =
        resp.map_err(|e| SourceError::Transport(format!("request /{label} failed: {e}")))?;
    let code = resp.status().as_u16();
    if code < 400 {
        return Ok(resp);
    }
    let body = resp.body_mut().read_to_string().unwrap_or_default();
    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(err) => Err(SourceError::Remote(err)),
        Err(_) => {
            let snippet: String = body.trim().chars().take(200).collect();
            Err(SourceError::Transport(format!(
                "request /{label} failed (status {code}): {snippet}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spotifice_types::ErrorKind;

    #[test]
    fn connector_rejects_non_http_addresses() {
        let connector = HttpConnector::default();
        assert!(connector.connect("tcp -h 127.0.0.1 -p 10000").is_err());
        let source = connector.connect(" http://127.0.0.1:10000/ ").unwrap();
        assert_eq!(source.describe(), "http://127.0.0.1:10000");
    }

    #[test]
    fn remote_error_displays_server_payload() {
        let err = SourceError::Remote(
            ErrorBody::new(ErrorKind::TrackError, "Track not found").with_item("x.mp3"),
        );
        assert_eq!(err.to_string(), "TrackError: Track not found (x.mp3)");
    }

    #[test]
    fn unreachable_server_fails_ping() {
        // Port 9 (discard) is not expected to run an HTTP server.
        let source = HttpChunkSource::new("http://127.0.0.1:9", Duration::from_millis(200));
        assert!(matches!(source.ping(), Err(SourceError::Transport(_))));
    }
}
