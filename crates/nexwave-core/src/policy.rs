//! Tunable matching policy.
//!
//! Every heuristic constant used by the matcher and the confidence scorer
//! lives here. Defaults reproduce the product-tuned reference values and
//! must stay in sync with the ranking tests.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

// --- Reference constants ---
pub const DEFAULT_THRESHOLD: f32 = 0.5;
pub const DEFAULT_CORROBORATION_MARGIN: f32 = 0.1;
pub const DEFAULT_MULTI_ANGLE_BOOST: f32 = 0.05;
pub const DEFAULT_STRONG_COSINE: f32 = 0.8;
pub const DEFAULT_STRONG_COSINE_FACTOR: f32 = 1.10;
pub const DEFAULT_MODERATE_COSINE: f32 = 0.7;
pub const DEFAULT_MODERATE_COSINE_FACTOR: f32 = 1.05;
pub const DEFAULT_CORROBORATION_WEIGHT: f32 = 3.0;
pub const DEFAULT_CORROBORATION_CAP: f32 = 10.0;
pub const DEFAULT_DETECTOR_CONFIDENCE: f32 = 0.9;
pub const DEFAULT_DETECTOR_CONFIDENCE_FACTOR: f32 = 1.02;
pub const DEFAULT_HIGH_CONFIDENCE_DISTANCE: f32 = 0.4;

#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("invalid policy: {0}")]
    Invalid(String),
    #[error("reading policy {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing policy: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Distance threshold and score-boost parameters for one matcher instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchPolicy {
    /// Base Euclidean distance cutoff. A face matches when its best distance is strictly below.
    pub threshold: f32,
    /// Added to the threshold when counting corroborating query faces.
    pub corroboration_margin: f32,
    /// Added to the threshold when more than one query face corroborates.
    pub multi_angle_boost: f32,
    pub strong_cosine: f32,
    pub strong_cosine_factor: f32,
    pub moderate_cosine: f32,
    pub moderate_cosine_factor: f32,
    /// Confidence points per corroborating query face.
    pub corroboration_weight: f32,
    /// Upper bound on the corroboration bonus.
    pub corroboration_cap: f32,
    /// Detector score above which the matched face earns a bonus.
    pub detector_confidence: f32,
    pub detector_confidence_factor: f32,
    /// Distances below this are reported as high-confidence matches.
    pub high_confidence_distance: f32,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            corroboration_margin: DEFAULT_CORROBORATION_MARGIN,
            multi_angle_boost: DEFAULT_MULTI_ANGLE_BOOST,
            strong_cosine: DEFAULT_STRONG_COSINE,
            strong_cosine_factor: DEFAULT_STRONG_COSINE_FACTOR,
            moderate_cosine: DEFAULT_MODERATE_COSINE,
            moderate_cosine_factor: DEFAULT_MODERATE_COSINE_FACTOR,
            corroboration_weight: DEFAULT_CORROBORATION_WEIGHT,
            corroboration_cap: DEFAULT_CORROBORATION_CAP,
            detector_confidence: DEFAULT_DETECTOR_CONFIDENCE,
            detector_confidence_factor: DEFAULT_DETECTOR_CONFIDENCE_FACTOR,
            high_confidence_distance: DEFAULT_HIGH_CONFIDENCE_DISTANCE,
        }
    }
}

impl MatchPolicy {
    /// Parse a policy from TOML. Missing keys keep their defaults.
    pub fn from_toml_str(src: &str) -> Result<Self, PolicyError> {
        let policy: MatchPolicy = toml::from_str(src)?;
        policy.validate()?;
        Ok(policy)
    }

    /// Load a policy from a TOML file.
    pub fn load(path: &Path) -> Result<Self, PolicyError> {
        let raw = std::fs::read_to_string(path).map_err(|source| PolicyError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        let fields = [
            ("threshold", self.threshold),
            ("corroboration_margin", self.corroboration_margin),
            ("multi_angle_boost", self.multi_angle_boost),
            ("strong_cosine", self.strong_cosine),
            ("strong_cosine_factor", self.strong_cosine_factor),
            ("moderate_cosine", self.moderate_cosine),
            ("moderate_cosine_factor", self.moderate_cosine_factor),
            ("corroboration_weight", self.corroboration_weight),
            ("corroboration_cap", self.corroboration_cap),
            ("detector_confidence", self.detector_confidence),
            ("detector_confidence_factor", self.detector_confidence_factor),
            ("high_confidence_distance", self.high_confidence_distance),
        ];
        if let Some((name, _)) = fields.iter().find(|(_, v)| !v.is_finite()) {
            return Err(PolicyError::Invalid(format!("{name} must be finite")));
        }

        if self.threshold <= 0.0 {
            return Err(PolicyError::Invalid(format!(
                "threshold must be positive, got {}",
                self.threshold
            )));
        }

        for (name, value) in [
            ("corroboration_margin", self.corroboration_margin),
            ("multi_angle_boost", self.multi_angle_boost),
            ("corroboration_weight", self.corroboration_weight),
            ("corroboration_cap", self.corroboration_cap),
            ("high_confidence_distance", self.high_confidence_distance),
        ] {
            if value < 0.0 {
                return Err(PolicyError::Invalid(format!(
                    "{name} must not be negative, got {value}"
                )));
            }
        }

        for (name, value) in [
            ("strong_cosine_factor", self.strong_cosine_factor),
            ("moderate_cosine_factor", self.moderate_cosine_factor),
            ("detector_confidence_factor", self.detector_confidence_factor),
        ] {
            if value < 1.0 {
                return Err(PolicyError::Invalid(format!(
                    "{name} must be at least 1.0, got {value}"
                )));
            }
        }

        if self.moderate_cosine > self.strong_cosine {
            return Err(PolicyError::Invalid(
                "moderate_cosine must not exceed strong_cosine".into(),
            ));
        }

        Ok(())
    }

    /// Human-facing description of the active policy.
    pub fn summary(&self) -> PolicySummary {
        PolicySummary {
            metric: "euclidean".into(),
            threshold: self.threshold,
            high_confidence_distance: self.high_confidence_distance,
            multi_angle_boost: self.multi_angle_boost,
            descriptor_dim: crate::types::DEFAULT_DESCRIPTOR_DIM,
        }
    }
}

/// Serializable snapshot of the policy for status output.
#[derive(Debug, Clone, Serialize)]
pub struct PolicySummary {
    pub metric: String,
    pub threshold: f32,
    pub high_confidence_distance: f32,
    pub multi_angle_boost: f32,
    pub descriptor_dim: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_valid() {
        MatchPolicy::default().validate().unwrap();
    }

    #[test]
    fn test_shipped_policy_matches_defaults() {
        let shipped = include_str!("../../../contrib/policy.toml");
        assert_eq!(MatchPolicy::from_toml_str(shipped).unwrap(), MatchPolicy::default());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let policy = MatchPolicy::from_toml_str("threshold = 0.45\n").unwrap();
        assert_eq!(policy.threshold, 0.45);
        assert_eq!(policy.multi_angle_boost, DEFAULT_MULTI_ANGLE_BOOST);
        assert_eq!(policy.corroboration_cap, DEFAULT_CORROBORATION_CAP);
    }

    #[test]
    fn test_rejects_non_positive_threshold() {
        for bad in [0.0, -0.1] {
            let policy = MatchPolicy { threshold: bad, ..MatchPolicy::default() };
            assert!(matches!(policy.validate(), Err(PolicyError::Invalid(_))));
        }
    }

    #[test]
    fn test_rejects_nan() {
        let policy = MatchPolicy { multi_angle_boost: f32::NAN, ..MatchPolicy::default() };
        let err = policy.validate().unwrap_err();
        assert!(err.to_string().contains("multi_angle_boost"));
    }

    #[test]
    fn test_rejects_shrinking_factor() {
        let policy = MatchPolicy { strong_cosine_factor: 0.9, ..MatchPolicy::default() };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_rejects_malformed_toml() {
        assert!(matches!(
            MatchPolicy::from_toml_str("threshold = \"loose\""),
            Err(PolicyError::Parse(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let err = MatchPolicy::load(Path::new("/nonexistent/policy.toml")).unwrap_err();
        assert!(matches!(err, PolicyError::Io { .. }));
    }
}
