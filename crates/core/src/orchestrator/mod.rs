//! Task Orchestrator: runs batches of file conversions.
//!
//! Each task runs on its own lane:
//! - **Video**: one process at a time, files in submission order
//! - **Audio**: a bounded worker pool sharing the task's queue
//!
//! Pause is synchronous: it returns only after every process of the task has
//! been reaped and its partial output removed. Resume continues with a
//! caller-chosen subset of the remaining files.

mod config;
mod runner;
mod types;
mod worker;

pub use config::OrchestratorConfig;
pub use runner::TaskOrchestrator;
pub use types::{ConversionRequest, OrchestratorError};
