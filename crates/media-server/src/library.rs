//! Track catalog.
//!
//! A flat scan of the media directory: every regular file with a served extension is a
//! track, identified by its file name.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use spotifice_types::TrackInfo;

use crate::error::ServerError;

#[derive(Clone, Debug)]
struct CatalogEntry {
    info: TrackInfo,
    path: PathBuf,
}

/// Tracks found under the media directory, ordered by id.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    root: PathBuf,
    tracks: BTreeMap<String, CatalogEntry>,
}

impl Catalog {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn all_tracks(&self) -> Vec<TrackInfo> {
        self.tracks.values().map(|e| e.info.clone()).collect()
    }

    pub fn track_info(&self, track_id: &str) -> Result<TrackInfo, ServerError> {
        self.entry(track_id).map(|e| e.info.clone())
    }

    /// File backing `track_id`.
    pub fn track_path(&self, track_id: &str) -> Result<&Path, ServerError> {
        self.entry(track_id).map(|e| e.path.as_path())
    }

    fn entry(&self, track_id: &str) -> Result<&CatalogEntry, ServerError> {
        self.tracks
            .get(track_id)
            .ok_or_else(|| ServerError::TrackNotFound {
                track_id: track_id.to_string(),
            })
    }
}

/// Scan `root` (not recursively) for files whose extension is in `extensions`.
pub fn scan_catalog(root: &Path, extensions: &[String]) -> Result<Catalog> {
    let mut tracks = BTreeMap::new();
    let dir = fs::read_dir(root).with_context(|| format!("read media dir {:?}", root))?;
    for entry in dir {
        let entry = entry.with_context(|| format!("read media dir {:?}", root))?;
        let path = entry.path();
        if !path.is_file() || !has_served_extension(&path, extensions) {
            continue;
        }
        let Some(id) = path.file_name().and_then(|n| n.to_str()) else {
            tracing::warn!(path = %path.display(), "skipping non-UTF-8 file name");
            continue;
        };
        let title = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(id)
            .to_string();
        tracing::info!(track_id = %id, "loaded track");
        tracks.insert(
            id.to_string(),
            CatalogEntry {
                info: TrackInfo {
                    id: id.to_string(),
                    title,
                },
                path: path.clone(),
            },
        );
    }
    Ok(Catalog {
        root: root.to_path_buf(),
        tracks,
    })
}

fn has_served_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

#[cfg(test)]
pub(crate) fn temp_media_dir(tag: &str) -> PathBuf {
    let root = std::env::temp_dir().join(format!(
        "media-server-{tag}-{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    std::fs::create_dir_all(&root).expect("create temp media dir");
    root
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mp3() -> Vec<String> {
        vec!["mp3".to_string()]
    }

    #[test]
    fn scan_picks_served_files_sorted() {
        let root = temp_media_dir("scan");
        fs::write(root.join("b.mp3"), b"bb").unwrap();
        fs::write(root.join("A.MP3"), b"aa").unwrap();
        fs::write(root.join("notes.txt"), b"x").unwrap();
        fs::create_dir_all(root.join("sub.mp3")).unwrap();

        let catalog = scan_catalog(&root, &mp3()).unwrap();
        let ids: Vec<_> = catalog.all_tracks().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["A.MP3".to_string(), "b.mp3".to_string()]);
        assert_eq!(catalog.track_info("b.mp3").unwrap().title, "b");
        assert_eq!(catalog.track_path("b.mp3").unwrap(), root.join("b.mp3"));
    }

    #[test]
    fn unknown_track_is_track_error() {
        let root = temp_media_dir("unknown");
        let catalog = scan_catalog(&root, &mp3()).unwrap();
        assert!(catalog.is_empty());
        let err = catalog.track_info("missing.mp3").unwrap_err();
        assert_eq!(err.to_string(), "TrackError: Track not found (missing.mp3)");
    }

    #[test]
    fn missing_media_dir_fails_scan() {
        let root = temp_media_dir("gone").join("does-not-exist");
        assert!(scan_catalog(&root, &mp3()).is_err());
    }
}
