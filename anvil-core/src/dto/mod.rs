//! Data Transfer Objects for the trigger and report interfaces
//!
//! DTOs are lightweight representations of domain entities used at the
//! engine's boundary (CLI today, a network API tomorrow).

pub mod run;

pub use run::{RunView, StageOverrides, TriggerRequest};
