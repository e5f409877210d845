//! Corpus descriptor storage.

use crate::types::CorpusPhoto;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("invalid event id: {0:?}")]
    InvalidEventId(String),
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("descriptor json {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Source of precomputed per-photo face descriptors for an event.
pub trait CorpusStore {
    /// All photos of the event with their faces. An event that has not been
    /// processed yet yields an empty list, not an error.
    fn descriptors_for_event(&self, event_id: &str) -> Result<Vec<CorpusPhoto>, StoreError>;
}

/// Destination for descriptors produced by indexing an event.
pub trait CorpusWriter {
    /// Replace the stored descriptors for an event.
    fn save_event(&mut self, event_id: &str, photos: &[CorpusPhoto]) -> Result<(), StoreError>;
}

/// Store backed by one JSON file per event: `<root>/<event_id>.json`,
/// holding an array of [`CorpusPhoto`].
#[derive(Debug, Clone)]
pub struct JsonCorpusStore {
    root: PathBuf,
}

impl JsonCorpusStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn event_path(&self, event_id: &str) -> Result<PathBuf, StoreError> {
        let valid = !event_id.is_empty()
            && event_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
            && !event_id.starts_with('.');
        if !valid {
            return Err(StoreError::InvalidEventId(event_id.to_string()));
        }
        Ok(self.root.join(format!("{event_id}.json")))
    }
}

impl CorpusWriter for JsonCorpusStore {
    fn save_event(&mut self, event_id: &str, photos: &[CorpusPhoto]) -> Result<(), StoreError> {
        let path = self.event_path(event_id)?;
        let io_err = |source| StoreError::Io {
            path: path.display().to_string(),
            source,
        };
        std::fs::create_dir_all(&self.root).map_err(io_err)?;
        let data = serde_json::to_vec_pretty(photos).map_err(|source| StoreError::Json {
            path: path.display().to_string(),
            source,
        })?;
        std::fs::write(&path, data).map_err(io_err)?;
        tracing::debug!(event_id, path = %path.display(), photos = photos.len(), "saved event descriptors");
        Ok(())
    }
}

impl CorpusStore for JsonCorpusStore {
    fn descriptors_for_event(&self, event_id: &str) -> Result<Vec<CorpusPhoto>, StoreError> {
        let path = self.event_path(event_id)?;
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(event_id, path = %path.display(), "no descriptors stored for event");
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
        };

        let photos = decode_corpus(&path, &raw)?;
        tracing::debug!(
            event_id,
            photos = photos.len(),
            faces = photos.iter().map(|p| p.faces.len()).sum::<usize>(),
            "loaded event descriptors"
        );
        Ok(photos)
    }
}

/// In-memory store, keyed by event id.
#[derive(Debug, Clone, Default)]
pub struct MemoryCorpusStore {
    events: HashMap<String, Vec<CorpusPhoto>>,
}

impl MemoryCorpusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, event_id: impl Into<String>, photos: Vec<CorpusPhoto>) {
        self.events.insert(event_id.into(), photos);
    }
}

impl CorpusStore for MemoryCorpusStore {
    fn descriptors_for_event(&self, event_id: &str) -> Result<Vec<CorpusPhoto>, StoreError> {
        Ok(self.events.get(event_id).cloned().unwrap_or_default())
    }
}

impl CorpusWriter for MemoryCorpusStore {
    fn save_event(&mut self, event_id: &str, photos: &[CorpusPhoto]) -> Result<(), StoreError> {
        self.insert(event_id, photos.to_vec());
        Ok(())
    }
}

/// Read a corpus file directly. Unlike [`JsonCorpusStore`], a missing file is an error.
pub fn load_corpus_file(path: &Path) -> Result<Vec<CorpusPhoto>, StoreError> {
    let raw = std::fs::read(path).map_err(|source| StoreError::Io {
        path: path.display().to_string(),
        source,
    })?;
    decode_corpus(path, &raw)
}

fn decode_corpus(path: &Path, raw: &[u8]) -> Result<Vec<CorpusPhoto>, StoreError> {
    serde_json::from_slice(raw).map_err(|source| StoreError::Json {
        path: path.display().to_string(),
        source,
    })
}
