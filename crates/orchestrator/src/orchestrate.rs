//! The ask flow.
//!
//! A question first passes the complexity pre-filter. SIMPLE questions are
//! answered directly with one model call; COMPLEX questions become a task
//! for the session's worker, and the caller awaits the terminal document
//! within the configured specialist timeout.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use cq_domain::error::{Error, Result};
use cq_domain::task::{TaskBrief, TaskStatus};
use cq_providers::classifier::{Classifier, Complexity};
use cq_providers::traits::{GenerateRequest, LanguageModel};
use cq_store::{with_retry, TaskStore};

use crate::supervisor::WorkerSupervisor;

pub enum AskOutcome {
    /// The pre-filter chose a direct answer; no deliberation ran.
    Direct(String),
    /// The deliberation produced a final synthesis.
    Deliberated {
        task_id: Uuid,
        summary: String,
        result_json: String,
    },
    /// No terminal status within the specialist timeout; the task keeps
    /// running and can be inspected later.
    TimedOut { task_id: Uuid },
}

pub struct Orchestrator {
    store: Arc<dyn TaskStore>,
    supervisor: Arc<WorkerSupervisor>,
    classifier: Classifier,
    direct_model: Arc<dyn LanguageModel>,
    max_rounds: u32,
    specialist_timeout: Duration,
    poll_interval: Duration,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn TaskStore>,
        supervisor: Arc<WorkerSupervisor>,
        classifier: Classifier,
        direct_model: Arc<dyn LanguageModel>,
        max_rounds: u32,
        specialist_timeout: Duration,
    ) -> Self {
        Self {
            store,
            supervisor,
            classifier,
            direct_model,
            max_rounds: max_rounds.max(1),
            specialist_timeout,
            poll_interval: Duration::from_millis(500),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub async fn ask(
        &self,
        session_id: Uuid,
        question: &str,
        context: Option<String>,
    ) -> Result<AskOutcome> {
        if self.classifier.classify(question).await == Complexity::Simple {
            tracing::info!("simple question, answering directly");
            let answer = self
                .direct_model
                .generate(GenerateRequest::new(question, 0.7).with_system(
                    "You are a helpful assistant. Answer the question directly and concisely.",
                ))
                .await?;
            return Ok(AskOutcome::Direct(answer));
        }

        let brief = TaskBrief {
            input: question.to_string(),
            context,
            max_rounds: self.max_rounds,
        };
        let task_id = with_retry(|| {
            self.store.create(
                session_id,
                Some("orchestrator".into()),
                Some("deliberators".into()),
                brief.to_json(),
            )
        })
        .await?;
        tracing::info!(%task_id, "deliberation task queued");

        self.supervisor.start(session_id);
        self.await_terminal(task_id).await
    }

    async fn await_terminal(&self, task_id: Uuid) -> Result<AskOutcome> {
        let deadline = tokio::time::Instant::now() + self.specialist_timeout;

        loop {
            let record = with_retry(|| self.store.get(task_id))
                .await?
                .ok_or_else(|| Error::Storage(format!("task {task_id} disappeared")))?;

            match record.status {
                TaskStatus::Completed => {
                    let result_json = record.result.unwrap_or_default();
                    let summary = serde_json::from_str::<serde_json::Value>(&result_json)
                        .ok()
                        .and_then(|v| v["summary"].as_str().map(str::to_string))
                        .unwrap_or_default();
                    return Ok(AskOutcome::Deliberated {
                        task_id,
                        summary,
                        result_json,
                    });
                }
                TaskStatus::Failed => {
                    let message = record
                        .result
                        .as_deref()
                        .and_then(|r| serde_json::from_str::<serde_json::Value>(r).ok())
                        .and_then(|v| v["error"].as_str().map(str::to_string))
                        .unwrap_or_else(|| "deliberation failed".into());
                    return Err(Error::Other(message));
                }
                TaskStatus::Pending | TaskStatus::InProgress => {
                    if tokio::time::Instant::now() >= deadline {
                        tracing::warn!(%task_id, "specialist timeout reached");
                        return Ok(AskOutcome::TimedOut { task_id });
                    }
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }
}
