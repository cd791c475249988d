//! Build artifact domain types

use serde::{Deserialize, Serialize};

/// Immutable, content-addressed reference to a built image
///
/// The digest is computed over the workspace contents plus the build
/// instructions, so identical source and instructions yield identical
/// artifact identifiers regardless of when or where the build ran.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildArtifact {
    /// Hex-encoded content digest of (workspace, build instructions)
    pub digest: String,
    /// Image reference the external builder tagged (e.g. `anvil:<digest>`)
    pub image: String,
    pub built_at: chrono::DateTime<chrono::Utc>,
}

impl BuildArtifact {
    /// Creates an artifact reference for a digest, deriving the image tag
    pub fn new(digest: impl Into<String>) -> Self {
        let digest = digest.into();
        let image = format!("anvil:{}", &digest[..digest.len().min(16)]);
        Self {
            digest,
            image,
            built_at: chrono::Utc::now(),
        }
    }
}

impl PartialEq for BuildArtifact {
    /// Artifacts are equal when their content digests are equal; the build
    /// timestamp is provenance, not identity.
    fn eq(&self, other: &Self) -> bool {
        self.digest == other.digest
    }
}

impl Eq for BuildArtifact {}
