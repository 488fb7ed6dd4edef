//! Error types for package acquisition.
//!
//! This module defines semantic error variants that tell the caller which
//! sub-step of an acquisition failed. Tool failures carry the captured
//! standard error so the message is actionable without re-running anything.

use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors that can occur while acquiring a package.
#[derive(Debug, Error)]
pub enum AcquireError {
    /// A command line was given an action after one was already set.
    #[error("action is already set to '{existing}'; cannot set it to '{requested}'")]
    ActionAlreadySet {
        /// The action that was set first.
        existing: String,
        /// The action that was rejected.
        requested: String,
    },

    /// A command line was built without an executable.
    #[error("a command line requires a non-empty executable")]
    EmptyExecutable,

    /// A library call was requested from a command line built for a program.
    #[error("command line has no in-process callable to invoke")]
    MissingCallable,

    /// The external program could not be started.
    #[error("failed to start {program}: {source}")]
    Spawn {
        /// The program that failed to start.
        program: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The external tool did not exit before the hang timeout and was killed.
    #[error(
        "{tool} failed to {action} in an appropriate period of time ({seconds} sec). Please try again or check your connection."
    )]
    ToolTimedOut {
        /// The tool that was killed.
        tool: String,
        /// The step being performed, phrased as a verb ("download the chart").
        action: String,
        /// The timeout that elapsed.
        seconds: u64,
    },

    /// The external tool exited with a non-zero code.
    #[error("{tool} failed to {action} (exit code {exit_code}). Error output:\n{stderr}")]
    ToolFailed {
        /// The tool that failed.
        tool: String,
        /// The step being performed.
        action: String,
        /// The exit code reported by the process.
        exit_code: i32,
        /// Captured standard error.
        stderr: String,
    },

    /// The client tool is missing or cannot report its version.
    #[error("there was an error running {tool}; please ensure that the {tool} client tools are installed ({reason})")]
    ToolUnavailable {
        /// The tool that could not be run.
        tool: String,
        /// Why detection failed.
        reason: String,
    },

    /// The image pull script exited unsuccessfully.
    #[error("unable to pull image {image} (exit code {exit_code})")]
    ImagePullFailed {
        /// The fully-qualified image reference.
        image: String,
        /// Exit code of the pull script.
        exit_code: i32,
    },

    /// The image hash could not be read back after a pull.
    #[error("unable to determine acquired image hash for {image}: {reason}")]
    ImageInspectFailed {
        /// The fully-qualified image reference.
        image: String,
        /// Why the inspect step failed.
        reason: String,
    },

    /// The chart tool succeeded but left nothing in the staging directory.
    #[error("no chart was written to staging directory {dir}")]
    StagingEmpty {
        /// The staging directory that was inspected.
        dir: Utf8PathBuf,
    },

    /// The feed URI cannot be used for the requested backend.
    #[error("invalid feed URI {uri}: {reason}")]
    InvalidFeedUri {
        /// The offending URI.
        uri: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The configuration file could not be read or parsed.
    #[error("invalid configuration at {path}: {reason}")]
    Config {
        /// Path to the configuration file.
        path: Utf8PathBuf,
        /// Description of the problem.
        reason: String,
    },

    /// No package cache directory was configured and none could be derived.
    #[error(
        "could not determine a package cache directory; pass --cache-dir or set STEVEDORE_CACHE_DIR"
    )]
    NoCacheRoot,

    /// A filesystem path is not valid UTF-8.
    #[error("path is not valid UTF-8: {}", .0.display())]
    NonUtf8Path(std::path::PathBuf),

    /// Walking the cache directory failed.
    #[error("failed to scan cache directory {dir}")]
    CacheScan {
        /// The cache directory being scanned.
        dir: Utf8PathBuf,
        /// The underlying walk error.
        #[source]
        source: walkdir::Error,
    },

    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Test stub received an unexpected or mismatched invocation.
    #[cfg(any(test, feature = "test-support"))]
    #[error("stub mismatch: {message}")]
    StubMismatch {
        /// Description of what was expected versus what was received.
        message: String,
    },
}

impl AcquireError {
    /// Returns true for failures that may succeed when the step is re-run.
    ///
    /// Usage, configuration and tool-missing errors signal a problem that a
    /// retry cannot fix. A program that could not be found counts as missing.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        if let Self::Spawn { source, .. } = self {
            return source.kind() != std::io::ErrorKind::NotFound;
        }
        matches!(
            self,
            Self::ToolTimedOut { .. }
                | Self::ToolFailed { .. }
                | Self::ImagePullFailed { .. }
                | Self::Io(_)
        )
    }
}

/// Result type alias using [`AcquireError`].
pub type Result<T> = std::result::Result<T, AcquireError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_names_the_failed_action() {
        let err = AcquireError::ToolTimedOut {
            tool: "Helm".to_owned(),
            action: "download the chart".to_owned(),
            seconds: 30,
        };
        let msg = err.to_string();
        assert!(msg.contains("Helm failed to download the chart in an appropriate period of time"));
        assert!(msg.contains("30 sec"));
    }

    #[test]
    fn tool_failure_includes_exit_code_and_stderr() {
        let err = AcquireError::ToolFailed {
            tool: "Helm".to_owned(),
            action: "add the chart repository".to_owned(),
            exit_code: 2,
            stderr: "Error: looks like the repo is not valid".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("exit code 2"));
        assert!(msg.contains("not valid"));
    }

    #[test]
    fn unavailable_tool_suggests_installing_client() {
        let err = AcquireError::ToolUnavailable {
            tool: "helm".to_owned(),
            reason: "No such file or directory".to_owned(),
        };
        assert!(err.to_string().contains("ensure that the helm client tools are installed"));
    }

    #[test]
    fn usage_errors_are_not_retryable() {
        let err = AcquireError::ActionAlreadySet {
            existing: "pull".to_owned(),
            requested: "fetch".to_owned(),
        };
        assert!(!err.is_retryable());
        assert!(!AcquireError::EmptyExecutable.is_retryable());
    }

    #[test]
    fn missing_program_is_not_retryable() {
        let err = AcquireError::Spawn {
            program: "helm".to_owned(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn spawn_failure_preserves_source() {
        let err = AcquireError::Spawn {
            program: "docker".to_owned(),
            source: std::io::Error::other("not found"),
        };
        assert!(err.is_retryable());
        assert!(std::error::Error::source(&err).is_some());
    }
}
