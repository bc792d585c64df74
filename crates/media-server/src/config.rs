//! Configuration loading and parsing.
//!
//! Defines the server config schema and resolves defaults.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

pub const DEFAULT_BIND: &str = "0.0.0.0:10000";
pub const DEFAULT_MEDIA_DIR: &str = "media";
pub const DEFAULT_MAX_CHUNK_BYTES: usize = 1024 * 1024;

/// Server configuration loaded from TOML. Every key is optional.
#[derive(Debug, Default, Deserialize)]
pub struct ServerConfig {
    /// Bind address (host:port).
    pub bind: Option<String>,
    /// Directory scanned for tracks.
    pub media_dir: Option<String>,
    /// File extensions served as tracks, without the dot.
    pub extensions: Option<Vec<String>>,
    /// Upper bound on one chunk response.
    pub max_chunk_bytes: Option<usize>,
}

/// Settings after applying command-line overrides and defaults.
#[derive(Clone, Debug)]
pub struct ServerSettings {
    pub bind: SocketAddr,
    pub media_dir: PathBuf,
    pub extensions: Vec<String>,
    pub max_chunk_bytes: usize,
}

impl ServerConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        let cfg = toml::from_str::<ServerConfig>(&raw)
            .with_context(|| format!("parse config {:?}", path))?;
        Ok(cfg)
    }

    /// Merge with command-line overrides; overrides win.
    pub fn resolve(
        self,
        bind: Option<SocketAddr>,
        media_dir: Option<PathBuf>,
    ) -> Result<ServerSettings> {
        let bind = match bind {
            Some(addr) => addr,
            None => {
                let raw = self.bind.as_deref().unwrap_or(DEFAULT_BIND);
                raw.parse().with_context(|| format!("parse bind {raw}"))?
            }
        };
        let media_dir = media_dir
            .or_else(|| self.media_dir.as_deref().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MEDIA_DIR));
        let extensions = self
            .extensions
            .map(|exts| {
                exts.iter()
                    .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
                    .filter(|e| !e.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|exts| !exts.is_empty())
            .unwrap_or_else(|| vec!["mp3".to_string()]);
        let max_chunk_bytes = match self.max_chunk_bytes {
            Some(0) => anyhow::bail!("max_chunk_bytes must be positive"),
            Some(n) => n,
            None => DEFAULT_MAX_CHUNK_BYTES,
        };
        Ok(ServerSettings {
            bind,
            media_dir,
            extensions,
            max_chunk_bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_config() {
        let settings = ServerConfig::default().resolve(None, None).unwrap();
        assert_eq!(settings.bind, DEFAULT_BIND.parse().unwrap());
        assert_eq!(settings.media_dir, PathBuf::from("media"));
        assert_eq!(settings.extensions, vec!["mp3".to_string()]);
        assert_eq!(settings.max_chunk_bytes, 1024 * 1024);
    }

    #[test]
    fn toml_values_and_overrides() {
        let cfg: ServerConfig = toml::from_str(
            r#"
            bind = "127.0.0.1:9000"
            media_dir = "/srv/music"
            extensions = [".MP3", "flac", " "]
            max_chunk_bytes = 65536
            "#,
        )
        .unwrap();
        let settings = cfg
            .resolve(None, Some(PathBuf::from("/tmp/override")))
            .unwrap();
        assert_eq!(settings.bind, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(settings.media_dir, PathBuf::from("/tmp/override"));
        assert_eq!(settings.extensions, vec!["mp3".to_string(), "flac".to_string()]);
        assert_eq!(settings.max_chunk_bytes, 65536);
    }

    #[test]
    fn invalid_bind_is_an_error() {
        let cfg = ServerConfig {
            bind: Some("not-an-addr".to_string()),
            ..ServerConfig::default()
        };
        assert!(cfg.resolve(None, None).is_err());
    }
}
