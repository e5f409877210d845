//! Selfie search: the caller-side pipeline around the matcher.
//!
//! `collect selfies → extract query faces → load event corpus → match → rank`.
//! Each stage fails with its own error; the matcher itself stays pure.

use crate::matcher::{MatchError, MatchOptions, Matcher};
use crate::store::{CorpusStore, StoreError};
use crate::types::{DetectedFace, MatchResult, QueryFace};
use thiserror::Error;

#[derive(Error, Debug)]
#[error("embedding extraction failed: {0}")]
pub struct OracleError(pub String);

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("no faces detected in your selfie(s); try a clearer photo with your face fully visible")]
    NoFaceInSelfies,
    #[error("event {0} has no processed photos yet")]
    EventNotProcessed(String),
    #[error("selfie {index}: {source}")]
    Oracle {
        index: usize,
        #[source]
        source: OracleError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Match(#[from] MatchError),
}

/// External face detector + embedder.
///
/// Returns one entry per face found; an empty list means no face, which is
/// not an error.
pub trait EmbeddingOracle {
    fn extract(&self, image: &[u8]) -> Result<Vec<DetectedFace>, OracleError>;
}

/// Flatten per-selfie detections into a query set tagged with selfie index.
pub fn collect_query_faces(selfies: &[Vec<DetectedFace>]) -> Vec<QueryFace> {
    let mut query = Vec::new();
    for (index, faces) in selfies.iter().enumerate() {
        if faces.is_empty() {
            tracing::warn!(selfie = index, "no face detected in selfie");
            continue;
        }
        tracing::debug!(selfie = index, faces = faces.len(), "selfie faces extracted");
        query.extend(
            faces
                .iter()
                .map(|f| QueryFace::new(f.descriptor.clone(), index)),
        );
    }
    query
}

/// Finds an attendee's photos within an event.
pub struct SelfieSearch<'a, M, S> {
    matcher: &'a M,
    store: &'a S,
}

impl<'a, M: Matcher, S: CorpusStore> SelfieSearch<'a, M, S> {
    pub fn new(matcher: &'a M, store: &'a S) -> Self {
        Self { matcher, store }
    }

    /// Match already-extracted selfie faces against the event's corpus.
    pub fn find_matching_photos(
        &self,
        selfies: &[Vec<DetectedFace>],
        event_id: &str,
        options: &MatchOptions,
    ) -> Result<Vec<MatchResult>, SearchError> {
        let query = collect_query_faces(selfies);
        if query.is_empty() {
            return Err(SearchError::NoFaceInSelfies);
        }

        let corpus = self.store.descriptors_for_event(event_id)?;
        if corpus.is_empty() {
            return Err(SearchError::EventNotProcessed(event_id.to_string()));
        }

        let matches = self.matcher.match_faces(&query, &corpus, options)?;
        tracing::info!(
            event_id,
            selfies = selfies.len(),
            query_faces = query.len(),
            photos = corpus.len(),
            matches = matches.len(),
            "selfie search complete"
        );
        Ok(matches)
    }

    /// Run the oracle over raw selfie images, then search.
    pub fn search_images<O: EmbeddingOracle>(
        &self,
        oracle: &O,
        images: &[&[u8]],
        event_id: &str,
        options: &MatchOptions,
    ) -> Result<Vec<MatchResult>, SearchError> {
        let selfies = images
            .iter()
            .enumerate()
            .map(|(index, image)| {
                oracle
                    .extract(image)
                    .map_err(|source| SearchError::Oracle { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.find_matching_photos(&selfies, event_id, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::FaceMatcher;
    use crate::store::MemoryCorpusStore;
    use crate::types::{CorpusPhoto, FaceDescriptor};

    /// Treats each image byte as one face whose descriptor is `[byte / 10, 0]`.
    struct ByteOracle;

    impl EmbeddingOracle for ByteOracle {
        fn extract(&self, image: &[u8]) -> Result<Vec<DetectedFace>, OracleError> {
            if image == b"corrupt" {
                return Err(OracleError("unsupported image format".into()));
            }
            Ok(image
                .iter()
                .map(|b| face(&[*b as f32 / 10.0, 0.0]))
                .collect())
        }
    }

    fn face(values: &[f32]) -> DetectedFace {
        DetectedFace::new(FaceDescriptor::new(values.to_vec()).unwrap())
    }

    fn store() -> MemoryCorpusStore {
        let mut store = MemoryCorpusStore::new();
        store.insert(
            "gala",
            vec![
                CorpusPhoto::new("p1", vec![face(&[1.0, 0.0])]),
                CorpusPhoto::new("p2", vec![face(&[5.0, 0.0])]),
            ],
        );
        store
    }

    #[test]
    fn test_collect_tags_selfie_index() {
        let selfies = vec![vec![face(&[1.0, 0.0])], vec![], vec![face(&[0.0, 1.0]), face(&[1.0, 1.0])]];
        let query = collect_query_faces(&selfies);
        assert_eq!(query.iter().map(|q| q.selfie).collect::<Vec<_>>(), vec![0, 2, 2]);
    }

    #[test]
    fn test_no_face_in_any_selfie() {
        let matcher = FaceMatcher::default();
        let store = store();
        let search = SelfieSearch::new(&matcher, &store);
        let err = search
            .find_matching_photos(&[vec![], vec![]], "gala", &MatchOptions::default())
            .unwrap_err();
        assert!(matches!(err, SearchError::NoFaceInSelfies));
    }

    #[test]
    fn test_unprocessed_event() {
        let matcher = FaceMatcher::default();
        let store = store();
        let search = SelfieSearch::new(&matcher, &store);
        let err = search
            .find_matching_photos(&[vec![face(&[1.0, 0.0])]], "unknown", &MatchOptions::default())
            .unwrap_err();
        assert!(matches!(err, SearchError::EventNotProcessed(ref id) if id == "unknown"));
    }

    #[test]
    fn test_find_matching_photos() {
        let matcher = FaceMatcher::default();
        let store = store();
        let search = SelfieSearch::new(&matcher, &store);
        let matches = search
            .find_matching_photos(&[vec![face(&[1.0, 0.0])]], "gala", &MatchOptions::default())
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].photo_id, "p1");
        assert_eq!(matches[0].confidence, 100);
    }

    #[test]
    fn test_search_images_runs_oracle() {
        let matcher = FaceMatcher::default();
        let store = store();
        let search = SelfieSearch::new(&matcher, &store);
        let images: [&[u8]; 2] = [&[], &[50]];
        let matches = search
            .search_images(&ByteOracle, &images, "gala", &MatchOptions::default())
            .unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].photo_id, "p2");
    }

    #[test]
    fn test_oracle_failure_reports_selfie() {
        let matcher = FaceMatcher::default();
        let store = store();
        let search = SelfieSearch::new(&matcher, &store);
        let images: [&[u8]; 2] = [&[10], b"corrupt"];
        let err = search
            .search_images(&ByteOracle, &images, "gala", &MatchOptions::default())
            .unwrap_err();
        assert!(matches!(err, SearchError::Oracle { index: 1, .. }));
    }
}
