//! Event indexing: run the embedding oracle over an event's photos and store
//! the resulting face descriptors so selfie searches can match against them.
//!
//! Indexing is incremental. Photos whose id is already in the store are
//! skipped, and a photo the oracle cannot read is stored with no faces so it
//! is not retried on every run.

use crate::search::EmbeddingOracle;
use crate::store::{CorpusStore, CorpusWriter, StoreError};
use crate::types::CorpusPhoto;
use serde::Serialize;
use std::collections::HashSet;

/// One uploaded event photo awaiting face extraction.
#[derive(Debug, Clone)]
pub struct EventPhoto {
    pub photo_id: String,
    pub image: Vec<u8>,
}

impl EventPhoto {
    pub fn new(photo_id: impl Into<String>, image: Vec<u8>) -> Self {
        Self {
            photo_id: photo_id.into(),
            image,
        }
    }
}

/// Reported after each photo is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexProgress<'a> {
    pub photo_id: &'a str,
    /// One-based position among the photos being indexed in this run.
    pub current: usize,
    pub total: usize,
    pub faces_found: usize,
    pub total_faces: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexSummary {
    /// Photos whose faces were extracted.
    pub processed: usize,
    /// Photos the oracle rejected; stored with no faces.
    pub failed: usize,
    /// Photos considered in this run, after skipping already indexed ones.
    pub total: usize,
    pub faces: usize,
}

pub struct EventIndexer<'a, O, W> {
    oracle: &'a O,
    store: &'a mut W,
}

impl<'a, O: EmbeddingOracle, W: CorpusStore + CorpusWriter> EventIndexer<'a, O, W> {
    pub fn new(oracle: &'a O, store: &'a mut W) -> Self {
        Self { oracle, store }
    }

    /// Extract and store descriptors for every photo not yet indexed.
    ///
    /// Oracle failures never abort the run. Only store errors do, and in that
    /// case nothing from this run is saved.
    pub fn index_event(
        &mut self,
        event_id: &str,
        photos: &[EventPhoto],
        mut on_progress: impl FnMut(&IndexProgress<'_>),
    ) -> Result<IndexSummary, StoreError> {
        let mut corpus = self.store.descriptors_for_event(event_id)?;
        let mut seen: HashSet<String> = corpus.iter().map(|p| p.photo_id.clone()).collect();
        let pending: Vec<&EventPhoto> = photos
            .iter()
            .filter(|p| seen.insert(p.photo_id.clone()))
            .collect();

        let mut summary = IndexSummary {
            total: pending.len(),
            ..IndexSummary::default()
        };
        tracing::info!(
            event_id,
            pending = summary.total,
            already_indexed = corpus.len(),
            "indexing event photos"
        );
        if pending.is_empty() {
            return Ok(summary);
        }

        for (i, photo) in pending.iter().enumerate() {
            let faces = match self.oracle.extract(&photo.image) {
                Ok(faces) => {
                    summary.processed += 1;
                    faces
                }
                Err(err) => {
                    tracing::warn!(
                        event_id,
                        photo_id = %photo.photo_id,
                        error = %err,
                        "face extraction failed; storing photo with no faces"
                    );
                    summary.failed += 1;
                    Vec::new()
                }
            };
            summary.faces += faces.len();

            tracing::debug!(
                photo_id = %photo.photo_id,
                current = i + 1,
                total = summary.total,
                faces = faces.len(),
                "photo indexed"
            );
            on_progress(&IndexProgress {
                photo_id: &photo.photo_id,
                current: i + 1,
                total: summary.total,
                faces_found: faces.len(),
                total_faces: summary.faces,
            });
            corpus.push(CorpusPhoto::new(photo.photo_id.clone(), faces));
        }

        self.store.save_event(event_id, &corpus)?;
        tracing::info!(
            event_id,
            processed = summary.processed,
            failed = summary.failed,
            faces = summary.faces,
            "event indexing complete"
        );
        Ok(summary)
    }
}
