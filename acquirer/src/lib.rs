//! Stevedore package acquirer library.
//!
//! This crate acquires deployable packages (container images and Helm charts)
//! by orchestrating the external client tools that know how to fetch them. It
//! is used by the `stevedore-acquirer` CLI binary and can be embedded by any
//! caller that supplies its own runner, script engine, and credentials.
//!
//! # Modules
//!
//! - [`cache`] - Package cache lookup by id and version
//! - [`cli`] - Command-line argument definitions
//! - [`command_line`] - Argument model and escaping for external invocations
//! - [`config`] - TOML configuration and cache-root resolution
//! - [`credentials`] - Feed credentials with redacted secrets
//! - [`dirs`] - Directory resolution abstraction for platform-specific paths
//! - [`downloader`] - Package downloaders for image and chart feeds
//! - [`error`] - Semantic error types
//! - [`fs`] - Filesystem helpers: scratch directories, moves, and scans
//! - [`output`] - Metadata formatting for the CLI
//! - [`package`] - Package identity, artifact metadata, and cache file names
//! - [`process`] - Process execution with hang detection
//! - [`retry`] - Linear retry schedule for tool steps
//! - [`script`] - Helper script execution

pub mod cache;
pub mod cli;
pub mod command_line;
pub mod config;
pub mod credentials;
pub mod dirs;
pub mod downloader;
pub mod error;
pub mod fs;
pub mod output;
pub mod package;
pub mod process;
pub mod retry;
pub mod script;

#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;
