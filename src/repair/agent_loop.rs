//! The verify/propose repair loop.
//!
//! One loop owns one task: it verifies the current candidate, feeds the
//! verdict back to the model, adopts the proposed replacement and repeats
//! until the tests pass, the model declares completion, or the round budget
//! is spent. The budget counts model consultations, so exhaustion never
//! spends an extra request.
//!
//! The loop branches only on the verdict outcome, the completion token and
//! the budget. Diagnostic fields like the failing statement are forwarded
//! to the model as opaque context.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::dataset::TaskRecord;
use crate::error::LlmError;
use crate::llm::{GenerationRequest, LlmProvider, Message};
use crate::storage::{ArtifactStore, StorageError};
use crate::verifier::{Verdict, Verifier, VerifierError};

use super::extract::{extract_candidate, is_completion_signal};
use super::prompts;

/// Operational faults that abort a task's loop. Candidate-code failures
/// never land here; they are verdicts.
#[derive(Debug, Error)]
pub enum RepairError {
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Verifier error: {0}")]
    Verifier(#[from] VerifierError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Status of a repair loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopStatus {
    Running,
    Done,
    Exhausted,
}

impl std::fmt::Display for LoopStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LoopStatus::Running => "running",
            LoopStatus::Done => "done",
            LoopStatus::Exhausted => "exhausted",
        };
        write!(f, "{s}")
    }
}

/// Configuration for one repair loop.
#[derive(Debug, Clone)]
pub struct RepairConfig {
    /// Maximum number of model consultations per task.
    pub budget: usize,
    /// Model identifier; an empty string uses the provider default.
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            budget: 5,
            model: String::new(),
            temperature: 0.2,
            max_tokens: 2048,
        }
    }
}

impl RepairConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_budget(mut self, budget: usize) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// One verified round: the candidate as verified and its verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundRecord {
    pub round: usize,
    pub candidate_source: String,
    pub verdict: Verdict,
}

/// Terminal result of one repair loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairOutcome {
    pub task_id: String,
    pub status: LoopStatus,
    pub final_source: String,
    pub final_verdict: Verdict,
    pub rounds_used: usize,
    pub history: Vec<RoundRecord>,
}

/// Drives one task to `Done` or `Exhausted`.
pub struct RepairLoop {
    llm_client: Arc<dyn LlmProvider>,
    verifier: Verifier,
    store: ArtifactStore,
    config: RepairConfig,
}

impl RepairLoop {
    pub fn new(
        llm_client: Arc<dyn LlmProvider>,
        verifier: Verifier,
        store: ArtifactStore,
        config: RepairConfig,
    ) -> Self {
        Self {
            llm_client,
            verifier,
            store,
            config,
        }
    }

    pub async fn run(&self, task: &TaskRecord) -> Result<RepairOutcome, RepairError> {
        let mut candidate = task.buggy_code.clone();
        let mut round = 0usize;
        let mut history = Vec::new();
        let mut conversation = vec![
            Message::system(prompts::REPAIR_SYSTEM_PROMPT),
            Message::user(prompts::build_task_prompt(
                &task.docstring,
                &task.buggy_code,
                &task.tests,
            )),
        ];

        self.store.write_candidate(&task.task_id, &candidate).await?;
        let mut verdict = self.verifier.verify(&candidate, &task.tests).await?;
        history.push(RoundRecord {
            round,
            candidate_source: candidate.clone(),
            verdict: verdict.clone(),
        });

        let mut status = LoopStatus::Running;
        while status == LoopStatus::Running {
            if verdict.is_passed() {
                status = LoopStatus::Done;
                break;
            }
            if round >= self.config.budget {
                info!(
                    task_id = %task.task_id,
                    budget = self.config.budget,
                    "Round budget exhausted"
                );
                status = LoopStatus::Exhausted;
                break;
            }

            conversation.push(Message::user(prompts::build_feedback_prompt(&verdict)));
            let request =
                GenerationRequest::new(self.config.model.clone(), conversation.clone())
                    .with_temperature(self.config.temperature)
                    .with_max_tokens(self.config.max_tokens);
            let response = self.llm_client.generate(request).await?;
            let reply = response.first_content().unwrap_or("").to_string();
            conversation.push(Message::assistant(reply.clone()));

            if is_completion_signal(&reply) {
                info!(
                    task_id = %task.task_id,
                    "Model declared completion without a passing verdict"
                );
                status = LoopStatus::Exhausted;
                break;
            }

            match extract_candidate(&reply) {
                Some(new_candidate) if new_candidate != candidate => {
                    self.store
                        .write_candidate(&task.task_id, &new_candidate)
                        .await?;
                    candidate = new_candidate;
                }
                Some(_) => {
                    debug!(task_id = %task.task_id, round, "Model returned an unchanged candidate");
                }
                None => {
                    warn!(
                        task_id = %task.task_id,
                        round,
                        "Reply contained no usable candidate, keeping the previous one"
                    );
                }
            }

            round += 1;
            verdict = self.verifier.verify(&candidate, &task.tests).await?;
            history.push(RoundRecord {
                round,
                candidate_source: candidate.clone(),
                verdict: verdict.clone(),
            });
        }

        info!(
            task_id = %task.task_id,
            status = %status,
            rounds = round,
            outcome = %verdict.outcome,
            "Repair loop finished"
        );
        Ok(RepairOutcome {
            task_id: task.task_id.clone(),
            status,
            final_source: candidate,
            final_verdict: verdict,
            rounds_used: round,
            history,
        })
    }
}
