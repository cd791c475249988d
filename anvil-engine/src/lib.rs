//! Anvil Engine
//!
//! A single-process CI engine: checks out a revision, builds an image from
//! it, runs the test suite inside an environment created from that image,
//! and records structured results.
//!
//! Architecture:
//! - Process capability: narrow "run external command with timeout" trait,
//!   polymorphic over local and containerized execution
//! - Workspace manager: per-run checkout directories with scoped cleanup
//! - Build executor: content-addressed artifact cache with single-flight builds
//! - Test runner: suite execution with exit code treated as domain data
//! - Pipeline engine: ordered stage state machine with abort and timeouts
//! - Registry/repository: live run tracking and file-backed run records

pub mod build;
pub mod config;
pub mod engine;
pub mod process;
pub mod registry;
pub mod report;
pub mod repository;
pub mod testrun;
pub mod workspace;

pub use config::{Config, RunnerKind};
pub use engine::PipelineEngine;
