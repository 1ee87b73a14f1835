//! The discussion engine.
//!
//! One run wires together: a shared [`state::DiscussionState`] behind a
//! single mutex, one concurrent worker per deliberator role, a rolling
//! [`summary`] loop, the [`arbiter`] serializing web searches, and the
//! termination detector in [`engine::DiscussionEngine::run`]. Admission of
//! each agent turn is decided by the pure policy in [`admission`].

pub mod admission;
pub mod agents;
pub mod arbiter;
pub mod engine;
pub mod prompts;
pub mod publish;
pub mod state;
pub mod stop;
pub mod summary;
pub mod text;

pub use engine::{DiscussionEngine, Tuning};
pub use stop::StopSignal;
