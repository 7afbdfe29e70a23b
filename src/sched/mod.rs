//! A cooperative scheduler for recurring jobs, driven by a single
//! injected timer primitive and clock.

mod job;
pub use job::{glob_match, tags_match, JobAction, JobError, JobId, JobSpec, JobStatus};

mod scheduler;
pub use scheduler::*;
