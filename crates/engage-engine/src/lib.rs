pub mod arbiter;
pub mod lifecycle;
pub mod store;

pub use arbiter::{SubmissionArbiter, SubmissionOutcome};
pub use lifecycle::{TaskLifecycle, TaskStatus, TaskView};
pub use store::{AttemptPatch, MemoryStore, TaskStore};
