//! AI analysis result cache
//!
//! A completed `analyze ai` answer is deterministic for a given
//! `(dumpId, provider, model, effort)`: the dump never changes after upload.
//! Results are cached as JSON files and invalidated only by explicit
//! deletion. Read failures degrade to a miss.

use sha2::{Digest, Sha256};
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::error::Result;

/// Per-path-segment character limit
const MAX_SEGMENT_CHARS: usize = 100;

/// Hex digits of the key hash in the file name
const KEY_HASH_CHARS: usize = 12;

/// Cache key for one canonical analysis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisKey {
    pub dump_id: String,
    pub provider: String,
    pub model: String,
    /// Effort name, `default` when no hint is set
    pub effort: String,
}

impl AnalysisKey {
    /// The stable string the key hash is computed over
    fn stable_string(&self) -> String {
        format!("{}|{}|{}|{}", self.dump_id, self.provider, self.model, self.effort)
    }
}

/// Filesystem cache of AI analysis results
pub struct AnalysisCache {
    root: PathBuf,
}

impl AnalysisCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        AnalysisCache { root: root.into() }
    }

    /// `<root>/<dumpId>/<provider>/<model>/<effort>-<hash12>.json`
    pub fn path_for(&self, key: &AnalysisKey) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.stable_string().as_bytes());
        let digest = hex::encode(hasher.finalize());

        self.root
            .join(sanitize_segment(&key.dump_id))
            .join(sanitize_segment(&key.provider))
            .join(sanitize_segment(&key.model))
            .join(format!(
                "{}-{}.json",
                sanitize_segment(&key.effort),
                &digest[..KEY_HASH_CHARS]
            ))
    }

    /// Read a cached result. Any failure is a miss.
    pub fn get(&self, key: &AnalysisKey) -> Option<String> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(text) => {
                debug!("Analysis cache hit: {}", path.display());
                Some(text)
            }
            Err(_) => None,
        }
    }

    /// Store a result. Write failures are logged but not fatal to the caller.
    pub fn put(&self, key: &AnalysisKey, content: &str) -> Result<()> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Remove one cached result (the only supported invalidation)
    pub fn remove(&self, key: &AnalysisKey) {
        let path = self.path_for(key);
        if let Err(e) = std::fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove cached analysis {}: {}", path.display(), e);
            }
        }
    }
}

fn sanitize_segment(segment: &str) -> String {
    let cleaned: String = segment
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .take(MAX_SEGMENT_CHARS)
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}
