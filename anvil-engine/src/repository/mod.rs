//! Persistence layer
//!
//! One JSON record per terminal pipeline run, kept under the state
//! directory until the retention policy purges it.

pub mod run;

pub use run::RunRepository;
