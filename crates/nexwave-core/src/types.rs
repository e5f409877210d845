use crate::policy::MatchPolicy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Embedding width produced by the reference 128-d ResNet face recognizer.
pub const DEFAULT_DESCRIPTOR_DIM: usize = 128;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DescriptorError {
    #[error("descriptor is empty")]
    Empty,
    #[error("descriptor component {index} is not finite")]
    NonFinite { index: usize },
    #[error("descriptor has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Bounding box of a detected face, in source-image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width * self.height
    }
}

/// Face embedding vector (128-dimensional for the reference model).
///
/// Immutable once built. Construction rejects empty and non-finite vectors,
/// so a descriptor that made it this far is always comparable; length
/// disagreements between two descriptors are still handled by the distance
/// primitives as a non-match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct FaceDescriptor {
    values: Vec<f32>,
}

impl FaceDescriptor {
    pub fn new(values: Vec<f32>) -> Result<Self, DescriptorError> {
        if values.is_empty() {
            return Err(DescriptorError::Empty);
        }
        if let Some(index) = values.iter().position(|v| !v.is_finite()) {
            return Err(DescriptorError::NonFinite { index });
        }
        Ok(Self { values })
    }

    /// Build a descriptor and require it to have exactly `dim` components.
    pub fn with_dimension(values: Vec<f32>, dim: usize) -> Result<Self, DescriptorError> {
        if values.len() != dim {
            return Err(DescriptorError::DimensionMismatch {
                expected: dim,
                actual: values.len(),
            });
        }
        Self::new(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Euclidean distance to another descriptor; `f32::INFINITY` on length mismatch.
    pub fn distance(&self, other: &FaceDescriptor) -> f32 {
        crate::distance::euclidean_distance(&self.values, &other.values)
    }

    /// Cosine similarity to another descriptor; 0 on length mismatch.
    pub fn similarity(&self, other: &FaceDescriptor) -> f32 {
        crate::distance::cosine_similarity(&self.values, &other.values)
    }
}

impl TryFrom<Vec<f32>> for FaceDescriptor {
    type Error = DescriptorError;

    fn try_from(values: Vec<f32>) -> Result<Self, Self::Error> {
        Self::new(values)
    }
}

impl From<FaceDescriptor> for Vec<f32> {
    fn from(d: FaceDescriptor) -> Self {
        d.values
    }
}

/// One face as reported by the embedding oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedFace {
    pub descriptor: FaceDescriptor,
    #[serde(default, rename = "box", alias = "bounding_box")]
    pub bounding_box: Option<BoundingBox>,
    /// Detector confidence in [0, 1]. Missing scores count as 0.
    #[serde(default)]
    pub confidence: f32,
}

impl DetectedFace {
    pub fn new(descriptor: FaceDescriptor) -> Self {
        Self {
            descriptor,
            bounding_box: None,
            confidence: 0.0,
        }
    }
}

/// A face extracted from an attendee selfie, tagged with the selfie it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryFace {
    pub descriptor: FaceDescriptor,
    /// Zero-based index of the source selfie in the submitted batch.
    pub selfie: usize,
}

impl QueryFace {
    pub fn new(descriptor: FaceDescriptor, selfie: usize) -> Self {
        Self { descriptor, selfie }
    }
}

/// An event photo and every face found in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusPhoto {
    #[serde(alias = "photoId")]
    pub photo_id: String,
    #[serde(default, alias = "descriptors")]
    pub faces: Vec<DetectedFace>,
}

impl CorpusPhoto {
    pub fn new(photo_id: impl Into<String>, faces: Vec<DetectedFace>) -> Self {
        Self {
            photo_id: photo_id.into(),
            faces,
        }
    }
}

/// Scoring of one corpus face against the whole query set.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    /// Index of the face within its photo.
    pub face_index: usize,
    /// Smallest distance to any query face.
    pub best_distance: f32,
    /// Cosine similarity of the query face that produced `best_distance`.
    pub cosine_similarity: f32,
    /// Query faces within the relaxed corroboration threshold.
    pub matching_query_faces: usize,
    /// Mean distance over all query faces. Diagnostic only.
    pub avg_distance: f32,
    /// Threshold this face was accepted or rejected against.
    pub effective_threshold: f32,
}

impl MatchCandidate {
    pub fn accepted(&self) -> bool {
        self.best_distance < self.effective_threshold
    }
}

/// A matched event photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub photo_id: String,
    /// Distance of the representative face to its closest query face.
    pub distance: f32,
    /// Ranking score in [0, 100].
    pub confidence: u8,
    pub cosine_similarity: f32,
    /// Distinct query faces corroborating the match.
    pub selfie_match_count: usize,
    /// Index of the representative face within the photo.
    pub face_index: usize,
    pub face_box: Option<BoundingBox>,
}

impl MatchResult {
    /// Whether the distance falls in the policy's high-confidence tier.
    pub fn is_high_confidence(&self, policy: &MatchPolicy) -> bool {
        self.distance < policy.high_confidence_distance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_rejects_empty() {
        assert_eq!(FaceDescriptor::new(vec![]), Err(DescriptorError::Empty));
    }

    #[test]
    fn test_descriptor_rejects_nan() {
        let err = FaceDescriptor::new(vec![0.1, f32::NAN, 0.2]).unwrap_err();
        assert_eq!(err, DescriptorError::NonFinite { index: 1 });
    }

    #[test]
    fn test_descriptor_dimension_enforced() {
        let err = FaceDescriptor::with_dimension(vec![0.0; 64], DEFAULT_DESCRIPTOR_DIM).unwrap_err();
        assert_eq!(
            err,
            DescriptorError::DimensionMismatch { expected: 128, actual: 64 }
        );
        assert!(FaceDescriptor::with_dimension(vec![0.0; 128], 128).is_ok());
    }

    #[test]
    fn test_descriptor_deserialize_validates() {
        let ok: FaceDescriptor = serde_json::from_str("[0.5, 0.25]").unwrap();
        assert_eq!(ok.as_slice(), &[0.5, 0.25]);
        assert!(serde_json::from_str::<FaceDescriptor>("[]").is_err());
    }

    #[test]
    fn test_detected_face_defaults() {
        let face: DetectedFace = serde_json::from_str(r#"{"descriptor": [1.0, 0.0]}"#).unwrap();
        assert_eq!(face.confidence, 0.0);
        assert!(face.bounding_box.is_none());
    }

    #[test]
    fn test_corpus_photo_accepts_legacy_keys() {
        let json = r#"{
            "photoId": "p1",
            "descriptors": [
                {"descriptor": [1.0, 0.0], "box": {"x": 1, "y": 2, "width": 30, "height": 40}, "confidence": 0.95}
            ]
        }"#;
        let photo: CorpusPhoto = serde_json::from_str(json).unwrap();
        assert_eq!(photo.photo_id, "p1");
        assert_eq!(photo.faces.len(), 1);
        let bbox = photo.faces[0].bounding_box.unwrap();
        assert_eq!(bbox.area(), 1200.0);
    }

    #[test]
    fn test_candidate_acceptance_is_strict() {
        let candidate = MatchCandidate {
            face_index: 0,
            best_distance: 0.5,
            cosine_similarity: 0.9,
            matching_query_faces: 1,
            avg_distance: 0.5,
            effective_threshold: 0.5,
        };
        assert!(!candidate.accepted());
    }
}
