use anyhow::{Context, Result};
use nexwave_core::types::DEFAULT_DESCRIPTOR_DIM;
use nexwave_core::{FaceMatcher, MatchPolicy};
use std::path::PathBuf;

/// CLI configuration, loaded from environment variables.
pub struct Config {
    /// Directory holding one `<event_id>.json` descriptor file per event.
    pub store_dir: PathBuf,
    /// Optional TOML file overriding the default match policy.
    pub policy_path: Option<PathBuf>,
    /// Worker threads for the per-photo loop (1 = single-threaded).
    pub workers: usize,
    /// Descriptor width every selfie face must have.
    pub descriptor_dim: usize,
}

impl Config {
    /// Load configuration from `NEXWAVE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("nexwave");

        let store_dir = std::env::var("NEXWAVE_STORE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("events"));

        Self {
            store_dir,
            policy_path: std::env::var("NEXWAVE_POLICY").ok().map(PathBuf::from),
            workers: env_usize("NEXWAVE_WORKERS", 1).max(1),
            descriptor_dim: env_usize("NEXWAVE_DESCRIPTOR_DIM", DEFAULT_DESCRIPTOR_DIM),
        }
    }

    /// The configured policy, or the reference defaults when no file is set.
    pub fn policy(&self) -> Result<MatchPolicy> {
        match &self.policy_path {
            Some(path) => MatchPolicy::load(path)
                .with_context(|| format!("loading match policy {}", path.display())),
            None => Ok(MatchPolicy::default()),
        }
    }

    pub fn matcher(&self) -> Result<FaceMatcher> {
        let matcher = FaceMatcher::new(self.policy()?)?.with_workers(self.workers);
        Ok(matcher)
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.toml");
        std::fs::write(&path, "threshold = 0.42\nmulti_angle_boost = 0.0\n").unwrap();

        let config = Config {
            store_dir: dir.path().to_path_buf(),
            policy_path: Some(path),
            workers: 2,
            descriptor_dim: DEFAULT_DESCRIPTOR_DIM,
        };
        let matcher = config.matcher().unwrap();
        assert_eq!(matcher.policy().threshold, 0.42);
        assert_eq!(matcher.workers(), 2);
    }

    #[test]
    fn test_invalid_policy_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.toml");
        std::fs::write(&path, "threshold = -1.0\n").unwrap();

        let config = Config {
            store_dir: dir.path().to_path_buf(),
            policy_path: Some(path),
            workers: 1,
            descriptor_dim: DEFAULT_DESCRIPTOR_DIM,
        };
        assert!(config.policy().is_err());
    }
}
