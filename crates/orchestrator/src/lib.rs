//! Session workers, their supervisor, and the ask flow.
//!
//! One [`worker::SessionWorker`] per session polls the task store and
//! feeds claimed tasks to the discussion engine. The
//! [`supervisor::WorkerSupervisor`] starts and stops workers; the
//! [`orchestrate::Orchestrator`] classifies incoming questions and decides
//! whether a full deliberation is warranted at all.

pub mod cli;
pub mod orchestrate;
pub mod supervisor;
pub mod worker;
