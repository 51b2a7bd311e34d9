//! Task Registry: the process-wide store of submitted tasks.
//!
//! The registry is passed explicitly to whoever needs it; there is no global
//! instance. Finished tasks are evicted by a sweeper once their retention
//! window elapses, or explicitly through task teardown.

mod store;
mod types;

pub use store::{TaskEntry, TaskRegistry};
pub use types::{
    FileJob, FileSnapshot, FileStatus, RegistryConfig, RegistryError, Task, TaskSnapshot,
    TaskStatus, TaskSummary,
};
