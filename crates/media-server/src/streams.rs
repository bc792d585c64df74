//! Per-render open streams.
//!
//! Each render identity has at most one open track file; chunks are read from its
//! current position until the file is exhausted.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::ServerError;
use crate::library::Catalog;

/// Chunk size used when a request asks for zero bytes.
pub const DEFAULT_CHUNK_BYTES: usize = 4096;

#[derive(Debug)]
struct StreamState {
    track_id: String,
    file: File,
}

#[derive(Debug)]
pub struct StreamRegistry {
    streams: Mutex<HashMap<String, StreamState>>,
    max_chunk_bytes: usize,
}

impl StreamRegistry {
    pub fn new(max_chunk_bytes: usize) -> Self {
        Self {
            streams: Mutex::new(HashMap::new()),
            max_chunk_bytes: max_chunk_bytes.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, StreamState>> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    pub fn is_open(&self, render_id: &str) -> bool {
        self.lock().contains_key(render_id)
    }

    /// Open `track_id` for `render_id`, closing any stream it already had.
    pub fn start_stream(
        &self,
        catalog: &Catalog,
        track_id: &str,
        render_id: &str,
    ) -> Result<(), ServerError> {
        let path = catalog.track_path(track_id)?;
        if render_id.trim().is_empty() {
            return Err(ServerError::BadIdentity {
                render_id: render_id.to_string(),
            });
        }
        let file = File::open(path).map_err(|e| ServerError::Io {
            item: path.display().to_string(),
            reason: format!("Error opening media file: {e}"),
        })?;
        let previous = self.lock().insert(
            render_id.to_string(),
            StreamState {
                track_id: track_id.to_string(),
                file,
            },
        );
        if let Some(previous) = previous {
            tracing::info!(render_id, track_id = %previous.track_id, "replaced open stream");
        }
        tracing::info!(render_id, track_id, "started stream");
        Ok(())
    }

    /// Close the stream of `render_id`, if any.
    pub fn stop_stream(&self, render_id: &str) {
        let closed = self.lock().remove(render_id);
        match closed {
            Some(state) => tracing::info!(render_id, track_id = %state.track_id, "stopped stream"),
            None => tracing::debug!(render_id, "stop for render without stream"),
        }
    }

    /// Read the next bytes of `render_id`'s stream.
    ///
    /// Returns at most `min(size, max_chunk_bytes)` bytes. An empty result means the
    /// track is exhausted; the stream is closed at that point.
    pub fn get_audio_chunk(&self, render_id: &str, size: usize) -> Result<Vec<u8>, ServerError> {
        let want = match size {
            0 => DEFAULT_CHUNK_BYTES,
            n => n,
        }
        .min(self.max_chunk_bytes);

        let mut streams = self.lock();
        let Some(state) = streams.get_mut(render_id) else {
            return Err(ServerError::NoStream {
                render_id: render_id.to_string(),
            });
        };
        let mut buf = Vec::with_capacity(want);
        (&mut state.file)
            .take(want as u64)
            .read_to_end(&mut buf)
            .map_err(|e| ServerError::Io {
                item: state.track_id.clone(),
                reason: format!("Error reading file: {e}"),
            })?;
        if buf.is_empty() {
            tracing::info!(render_id, track_id = %state.track_id, "track exhausted");
            streams.remove(render_id);
        }
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{scan_catalog, temp_media_dir};

    fn catalog_with(tag: &str, files: &[(&str, usize)]) -> Catalog {
        let root = temp_media_dir(tag);
        for (name, len) in files {
            std::fs::write(root.join(name), vec![7u8; *len]).unwrap();
        }
        scan_catalog(&root, &["mp3".to_string()]).unwrap()
    }

    #[test]
    fn chunks_follow_file_then_exhaust() {
        let catalog = catalog_with("chunks", &[("a.mp3", 10)]);
        let streams = StreamRegistry::new(1024);
        streams.start_stream(&catalog, "a.mp3", "r1").unwrap();

        assert_eq!(streams.get_audio_chunk("r1", 4).unwrap().len(), 4);
        assert_eq!(streams.get_audio_chunk("r1", 4).unwrap().len(), 4);
        assert_eq!(streams.get_audio_chunk("r1", 4).unwrap().len(), 2);
        assert!(streams.get_audio_chunk("r1", 4).unwrap().is_empty());
        assert!(!streams.is_open("r1"));
        assert!(matches!(
            streams.get_audio_chunk("r1", 4),
            Err(ServerError::NoStream { .. })
        ));
    }

    #[test]
    fn chunk_size_is_capped() {
        let catalog = catalog_with("cap", &[("a.mp3", 100)]);
        let streams = StreamRegistry::new(16);
        streams.start_stream(&catalog, "a.mp3", "r1").unwrap();
        assert_eq!(streams.get_audio_chunk("r1", 1000).unwrap().len(), 16);
        assert_eq!(streams.get_audio_chunk("r1", 0).unwrap().len(), 16);
    }

    #[test]
    fn start_validates_track_and_identity() {
        let catalog = catalog_with("validate", &[("a.mp3", 1)]);
        let streams = StreamRegistry::new(1024);
        assert!(matches!(
            streams.start_stream(&catalog, "nope.mp3", "r1"),
            Err(ServerError::TrackNotFound { .. })
        ));
        assert!(matches!(
            streams.start_stream(&catalog, "a.mp3", "  "),
            Err(ServerError::BadIdentity { .. })
        ));
        assert!(!streams.is_open("  "));
    }

    #[test]
    fn restart_replaces_stream_and_stop_is_idempotent() {
        let catalog = catalog_with("restart", &[("a.mp3", 8), ("b.mp3", 3)]);
        let streams = StreamRegistry::new(1024);
        streams.start_stream(&catalog, "a.mp3", "r1").unwrap();
        streams.get_audio_chunk("r1", 4).unwrap();
        streams.start_stream(&catalog, "b.mp3", "r1").unwrap();
        assert_eq!(streams.get_audio_chunk("r1", 100).unwrap().len(), 3);

        streams.stop_stream("r1");
        streams.stop_stream("r1");
        assert!(!streams.is_open("r1"));
    }

    #[test]
    fn streams_are_independent_per_render() {
        let catalog = catalog_with("independent", &[("a.mp3", 6)]);
        let streams = StreamRegistry::new(1024);
        streams.start_stream(&catalog, "a.mp3", "r1").unwrap();
        streams.start_stream(&catalog, "a.mp3", "r2").unwrap();
        assert_eq!(streams.get_audio_chunk("r1", 6).unwrap().len(), 6);
        assert_eq!(streams.get_audio_chunk("r2", 2).unwrap().len(), 2);
        streams.stop_stream("r1");
        assert!(streams.is_open("r2"));
    }
}
