use crate::library::Catalog;
use crate::streams::StreamRegistry;

/// Shared state behind every API handler.
pub struct AppState {
    pub catalog: Catalog,
    pub streams: StreamRegistry,
}

impl AppState {
    pub fn new(catalog: Catalog, max_chunk_bytes: usize) -> Self {
        Self {
            catalog,
            streams: StreamRegistry::new(max_chunk_bytes),
        }
    }
}
