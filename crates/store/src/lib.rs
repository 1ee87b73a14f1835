//! Task and rate-limit persistence.
//!
//! The engine talks to the abstract [`TaskStore`]; two backends ship here:
//! an in-memory map for tests and single-process runs, and a JSON-file store
//! that survives restarts. Any backend with atomic row-level updates (for
//! instance Postgres) can stand in by implementing the same trait.

pub mod file;
pub mod memory;
pub mod task_store;

pub use file::{FileRateLimitStore, FileTaskStore};
pub use memory::{MemoryRateLimitStore, MemoryTaskStore};
pub use task_store::{with_retry, TaskStore};
