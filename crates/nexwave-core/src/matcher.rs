//! Selfie-to-corpus face matcher.
//!
//! For every corpus photo, each face is scored against the whole query set,
//! the strongest accepted face becomes the photo's representative, and the
//! resulting matches are ranked by confidence. The computation is pure:
//! no I/O, no shared mutable state.

use crate::policy::{MatchPolicy, PolicyError};
use crate::scoring;
use crate::types::{CorpusPhoto, DetectedFace, MatchCandidate, MatchResult, QueryFace};
use std::time::Instant;
use thiserror::Error;

/// Photos each worker should have before partitioning is worth the thread startup.
const MIN_PHOTOS_PER_WORKER: usize = 16;

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("query set is empty: no face was extracted from the selfie(s)")]
    EmptyQuery,
    #[error("invalid threshold {0}: must be a positive, finite distance")]
    InvalidThreshold(f32),
    #[error(transparent)]
    Policy(#[from] PolicyError),
}

/// Per-call overrides.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchOptions {
    /// Replaces the policy's base distance threshold for this call.
    pub threshold: Option<f32>,
}

impl MatchOptions {
    pub fn with_threshold(threshold: f32) -> Self {
        Self {
            threshold: Some(threshold),
        }
    }
}

/// Strategy for ranking corpus photos against a set of query faces.
pub trait Matcher {
    fn match_faces(
        &self,
        query: &[QueryFace],
        corpus: &[CorpusPhoto],
        options: &MatchOptions,
    ) -> Result<Vec<MatchResult>, MatchError>;
}

/// Euclidean-distance matcher with multi-angle corroboration.
///
/// Holds a validated policy and is reusable across calls and threads.
#[derive(Debug, Clone)]
pub struct FaceMatcher {
    policy: MatchPolicy,
    workers: usize,
}

impl Default for FaceMatcher {
    fn default() -> Self {
        Self {
            policy: MatchPolicy::default(),
            workers: 1,
        }
    }
}

impl FaceMatcher {
    pub fn new(policy: MatchPolicy) -> Result<Self, MatchError> {
        policy.validate()?;
        Ok(Self { policy, workers: 1 })
    }

    /// Partition the per-photo loop across `workers` threads on large corpora.
    /// Output is identical to the single-threaded path.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn policy(&self) -> &MatchPolicy {
        &self.policy
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    fn resolve_threshold(&self, options: &MatchOptions) -> Result<f32, MatchError> {
        let threshold = options.threshold.unwrap_or(self.policy.threshold);
        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(MatchError::InvalidThreshold(threshold));
        }
        Ok(threshold)
    }

    /// Score one corpus face against every query face.
    pub fn score_face(
        &self,
        query: &[QueryFace],
        face: &DetectedFace,
        face_index: usize,
        threshold: f32,
    ) -> MatchCandidate {
        let corroboration_threshold = threshold + self.policy.corroboration_margin;

        let mut best_distance = f32::INFINITY;
        let mut cosine_similarity = 0.0f32;
        let mut matching_query_faces = 0usize;
        let mut total_distance = 0.0f32;

        for q in query {
            let distance = q.descriptor.distance(&face.descriptor);
            total_distance += distance;

            if distance < corroboration_threshold {
                matching_query_faces += 1;
            }
            if distance < best_distance {
                best_distance = distance;
                cosine_similarity = q.descriptor.similarity(&face.descriptor);
            }
        }

        let effective_threshold = if query.len() > 1 && matching_query_faces > 1 {
            threshold + self.policy.multi_angle_boost
        } else {
            threshold
        };

        MatchCandidate {
            face_index,
            best_distance,
            cosine_similarity,
            matching_query_faces,
            avg_distance: total_distance / query.len().max(1) as f32,
            effective_threshold,
        }
    }

    /// Match a single photo. Returns its representative face if any face is accepted.
    pub fn match_photo(
        &self,
        query: &[QueryFace],
        photo: &CorpusPhoto,
        threshold: f32,
    ) -> Option<MatchResult> {
        let best = photo
            .faces
            .iter()
            .enumerate()
            .map(|(i, face)| self.score_face(query, face, i, threshold))
            .inspect(|c| {
                tracing::trace!(
                    photo = %photo.photo_id,
                    face = c.face_index,
                    distance = c.best_distance,
                    avg_distance = c.avg_distance,
                    corroborating = c.matching_query_faces,
                    effective_threshold = c.effective_threshold,
                    "face scored"
                );
            })
            .filter(|c| c.accepted())
            .fold(None::<MatchCandidate>, |best, c| match best {
                Some(b) if b.best_distance <= c.best_distance => Some(b),
                _ => Some(c),
            })?;

        let face = &photo.faces[best.face_index];
        let confidence =
            scoring::confidence(&best, query.len(), face.confidence, threshold, &self.policy);

        Some(MatchResult {
            photo_id: photo.photo_id.clone(),
            distance: best.best_distance,
            confidence,
            cosine_similarity: best.cosine_similarity,
            selfie_match_count: best.matching_query_faces,
            face_index: best.face_index,
            face_box: face.bounding_box,
        })
    }

    fn match_sequential(
        &self,
        query: &[QueryFace],
        corpus: &[CorpusPhoto],
        threshold: f32,
    ) -> Vec<MatchResult> {
        corpus
            .iter()
            .filter_map(|photo| self.match_photo(query, photo, threshold))
            .collect()
    }

    /// Fan photo indices out to scoped workers, then restore corpus order.
    fn match_partitioned(
        &self,
        query: &[QueryFace],
        corpus: &[CorpusPhoto],
        threshold: f32,
    ) -> Vec<MatchResult> {
        let (job_tx, job_rx) = crossbeam_channel::bounded::<usize>(self.workers * 4);
        let (result_tx, result_rx) = crossbeam_channel::unbounded::<(usize, MatchResult)>();

        let mut indexed = std::thread::scope(|scope| {
            for _ in 0..self.workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                scope.spawn(move || {
                    for idx in job_rx.iter() {
                        if let Some(result) = self.match_photo(query, &corpus[idx], threshold) {
                            if result_tx.send((idx, result)).is_err() {
                                break;
                            }
                        }
                    }
                });
            }
            drop(job_rx);
            drop(result_tx);

            for idx in 0..corpus.len() {
                if job_tx.send(idx).is_err() {
                    break;
                }
            }
            drop(job_tx);

            result_rx.iter().collect::<Vec<_>>()
        });

        indexed.sort_unstable_by_key(|(idx, _)| *idx);
        indexed.into_iter().map(|(_, result)| result).collect()
    }
}

impl Matcher for FaceMatcher {
    fn match_faces(
        &self,
        query: &[QueryFace],
        corpus: &[CorpusPhoto],
        options: &MatchOptions,
    ) -> Result<Vec<MatchResult>, MatchError> {
        if query.is_empty() {
            return Err(MatchError::EmptyQuery);
        }
        let threshold = self.resolve_threshold(options)?;
        let started = Instant::now();

        let partitioned =
            self.workers > 1 && corpus.len() >= self.workers * MIN_PHOTOS_PER_WORKER;
        let mut results = if partitioned {
            self.match_partitioned(query, corpus, threshold)
        } else {
            self.match_sequential(query, corpus, threshold)
        };

        // Stable: equal confidences keep corpus order.
        results.sort_by(|a, b| b.confidence.cmp(&a.confidence));

        tracing::debug!(
            query_faces = query.len(),
            photos = corpus.len(),
            matches = results.len(),
            threshold,
            partitioned,
            elapsed_us = started.elapsed().as_micros() as u64,
            "match complete"
        );

        Ok(results)
    }
}

/// Match with the default policy.
pub fn match_faces(
    query: &[QueryFace],
    corpus: &[CorpusPhoto],
    options: &MatchOptions,
) -> Result<Vec<MatchResult>, MatchError> {
    FaceMatcher::default().match_faces(query, corpus, options)
}
