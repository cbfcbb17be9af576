use std::sync::Arc;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A Go source file paired with its `_test.go` file. Identity is the origin
/// path; hashes are recomputed on every scan and never change within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub origin: Utf8PathBuf,
    pub origin_hash: String,
    pub test: Option<Utf8PathBuf>,
    pub test_hash: Option<String>,
    pub package: String,
}

impl Source {
    /// SHA-256 content hash, hex-encoded.
    pub fn content_hash(bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }
}

/// A versioned mutation rule family. Bumping the version invalidates stored
/// history for that category.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MutationType {
    pub name: String,
    pub version: u32,
}

impl MutationType {
    pub fn new(name: &str, version: u32) -> Self {
        Self {
            name: name.to_string(),
            version,
        }
    }
}

/// One syntactic alteration of a source file. Immutable once generated.
#[derive(Debug, Clone)]
pub struct Mutation {
    pub mutator: MutationType,
    /// Deterministic content-hash id. Underlies caching, sharding and dedup.
    pub id: String,
    pub mutated: Vec<u8>,
    /// Unified diff against the original file.
    pub diff: String,
    pub source: Arc<Source>,
}

impl Mutation {
    /// 16-hex-char id over the origin path, the category, its version, and
    /// the mutated bytes. The composite key keeps ids distinct when two
    /// categories produce the same buffer (e.g. `<` -> `<=` from both
    /// comparison and loop) and when identical files live at different paths.
    pub fn content_id(origin: &str, mutator: &MutationType, mutated: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(origin.as_bytes());
        hasher.update(b"|");
        hasher.update(mutator.name.as_bytes());
        hasher.update(b"|");
        hasher.update(mutator.version.to_le_bytes());
        hasher.update(b"|");
        hasher.update(mutated);
        hex::encode(&hasher.finalize()[..8])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Killed,
    Survived,
    Skipped,
    Error,
}

/// Outcome of testing one mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub mutation_id: String,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Outcome {
    pub fn new(mutation_id: &str, status: Status) -> Self {
        Self {
            mutation_id: mutation_id.to_string(),
            status,
            error: None,
        }
    }

    pub fn error(mutation_id: &str, detail: String) -> Self {
        Self {
            mutation_id: mutation_id.to_string(),
            status: Status::Error,
            error: Some(detail),
        }
    }
}

/// All outcomes recorded for one mutation category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryResult {
    pub mutator: MutationType,
    pub outcomes: Vec<Outcome>,
}

/// One source and everything its mutation run produced. The diff blob is
/// kept only while at least one mutation survived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub source: Source,
    pub results: Vec<CategoryResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
    /// `INDEX/TOTAL` selector when the run was sharded. A sharded report
    /// covers only part of its source's mutation set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard: Option<String>,
}

impl Report {
    pub fn outcome_count(&self) -> usize {
        self.results.iter().map(|c| c.outcomes.len()).sum()
    }

    pub fn count(&self, status: Status) -> usize {
        self.results
            .iter()
            .flat_map(|c| &c.outcomes)
            .filter(|o| o.status == status)
            .count()
    }
}
