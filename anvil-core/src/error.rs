//! Error types for the Anvil engine

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur while executing a pipeline
///
/// A failing test suite is NOT represented here: a non-zero suite exit code
/// is domain data carried by the `TestReport`, not an engine error.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Source checkout failed (unreachable repository, bad revision, auth)
    #[error("checkout failed for {repo}@{revision}: {detail}")]
    Checkout {
        /// Repository location
        repo: String,
        /// Revision reference that was requested
        revision: String,
        /// Captured output or cause
        detail: String,
    },

    /// The external builder rejected the instructions or the build process failed
    #[error("build failed: {message}")]
    Build {
        /// Short description of the failure
        message: String,
        /// Captured build log output
        log: String,
    },

    /// The isolated environment could not be instantiated from the artifact
    #[error("environment could not be created: {0}")]
    Environment(String),

    /// The external process could not be launched (not a failing test)
    #[error("process launch failed: {0}")]
    Execution(String),

    /// Execution exceeded the allotted wall-clock time; the process was killed
    #[error("execution exceeded timeout of {limit_secs}s")]
    Timeout {
        /// The limit that was exceeded, in seconds
        limit_secs: u64,
    },

    /// Report parsing found truncated or malformed data
    #[error("test report is incomplete: {0}")]
    IncompleteReport(String),

    /// Internal engine failure (cache corruption, persistence failure)
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Create a checkout error from captured output
    pub fn checkout(repo: impl Into<String>, revision: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Checkout {
            repo: repo.into(),
            revision: revision.into(),
            detail: detail.into(),
        }
    }

    /// Create a build error carrying the build log
    pub fn build(message: impl Into<String>, log: impl Into<String>) -> Self {
        Self::Build {
            message: message.into(),
            log: log.into(),
        }
    }

    /// Check if this error is an infrastructure failure rather than a
    /// pipeline-level outcome
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Self::Environment(_) | Self::Internal(_))
    }

    /// Check if this error is a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// CLI exit code for this error
    ///
    /// 1 = build/test failure, 3 = internal/environment error.
    pub fn exit_code(&self) -> i32 {
        if self.is_infrastructure() { 3 } else { 1 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infrastructure_classification() {
        assert!(EngineError::Environment("no runtime".into()).is_infrastructure());
        assert!(EngineError::Internal("cache corrupt".into()).is_infrastructure());
        assert!(!EngineError::build("bad Dockerfile", "").is_infrastructure());
        assert!(!EngineError::Timeout { limit_secs: 60 }.is_infrastructure());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(EngineError::build("x", "").exit_code(), 1);
        assert_eq!(EngineError::Timeout { limit_secs: 5 }.exit_code(), 1);
        assert_eq!(EngineError::Environment("x".into()).exit_code(), 3);
        assert_eq!(EngineError::Internal("x".into()).exit_code(), 3);
    }

    #[test]
    fn test_display_includes_context() {
        let err = EngineError::checkout("https://example.com/repo.git", "abc123", "not found");
        let msg = err.to_string();
        assert!(msg.contains("abc123"));
        assert!(msg.contains("not found"));
    }
}
