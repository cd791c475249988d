//! Anvil Core
//!
//! Core types and abstractions for the Anvil CI engine.
//!
//! This crate contains:
//! - Domain types: Core business entities (PipelineRun, Stage, BuildArtifact, TestReport)
//! - DTOs: Data transfer objects for the trigger and report interfaces
//! - Error taxonomy: shared `EngineError` used across engine and CLI

pub mod domain;
pub mod dto;
pub mod error;

pub use error::{EngineError, Result};
