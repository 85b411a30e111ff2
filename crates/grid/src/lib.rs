//! Execution-backend adapter for the grid scheduler.
//!
//! Everything the rest of the workspace knows about the external batch
//! service lives behind [`adapter::GridScheduler`]: submitting a plan,
//! asking for status, and removing a workflow. The textual-report parsing
//! that a backend upgrade could break is isolated in [`report`].

pub mod adapter;
pub mod cli;
pub mod report;
pub mod usage;

pub use adapter::{CommandReport, GridScheduler, SchedulerError};
pub use cli::CliScheduler;
