//! Request orchestration
//!
//! - `supervisor`: the inbound operations and their outcomes
//! - `locks`: per-subject serialization
//! - `prompt`: provider instructions and context

pub mod locks;
pub mod prompt;
pub mod supervisor;

pub use locks::SubjectLocks;
pub use supervisor::{MessageOutcome, SubmissionOutcome, SupervisorOrchestrator, UsageOutcome};
