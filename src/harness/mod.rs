//! Task-parallel batch repair runner.
//!
//! Drives one repair loop per task, `parallel` tasks at a time, and
//! collects one result record per task. A loop-level operational fault
//! (provider transport failure, artifact write failure, verifier
//! environment fault) marks the task `error` and records the original
//! buggy source as the final candidate; that fallback is logged whenever
//! it is applied.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::dataset::TaskRecord;
use crate::llm::LlmProvider;
use crate::repair::{LoopStatus, RepairConfig, RepairLoop};
use crate::storage::ArtifactStore;
use crate::verifier::{Outcome, Verifier, VerifierConfig};

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Configuration for one batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// Maximum model consultations per task.
    pub budget: usize,
    /// Verification deadline per call, in seconds.
    pub timeout_secs: u64,
    /// Number of tasks repaired concurrently.
    pub parallel: usize,
    /// Model identifier; an empty string uses the provider default.
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Directory holding one candidate artifact per task.
    pub artifacts_dir: PathBuf,
    /// Interpreter binary used for verification.
    pub python_bin: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            budget: 5,
            timeout_secs: 5,
            parallel: 1,
            model: String::new(),
            temperature: 0.2,
            max_tokens: 2048,
            artifacts_dir: PathBuf::from("tmp/code"),
            python_bin: "python3".to_string(),
        }
    }
}

impl RunnerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_budget(mut self, budget: usize) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_parallel(mut self, parallel: usize) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_artifacts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifacts_dir = dir.into();
        self
    }

    pub fn with_python_bin(mut self, bin: impl Into<String>) -> Self {
        self.python_bin = bin.into();
        self
    }

    pub fn from_yaml(path: &Path) -> Result<Self, RunnerError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }
}

/// Harness-level status of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Repair loop finished with a passing verdict.
    Fixed,
    /// Budget spent or the model gave up before the tests passed.
    Unfixed,
    /// Operational fault aborted the loop.
    Error,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Fixed => "fixed",
            TaskStatus::Unfixed => "unfixed",
            TaskStatus::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// One per-task result record; one JSONL line in the results file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bug_type: Option<String>,
    pub status: TaskStatus,
    pub buggy_code: String,
    pub fixed_code: String,
    #[serde(default)]
    pub docstring: String,
    pub tests: String,
    pub rounds_used: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_outcome: Option<Outcome>,
    pub duration_secs: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregated summary of one batch run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub total: usize,
    pub fixed: usize,
    pub unfixed: usize,
    pub errors: usize,
    pub avg_rounds: f64,
    pub duration_secs: f64,
    pub results: Vec<TaskResult>,
}

/// Repairs every task and aggregates the results.
///
/// Tasks run `parallel` at a time; a panicking worker is logged and its
/// task is dropped from the results.
pub async fn run_repairs(
    tasks: Vec<TaskRecord>,
    config: RunnerConfig,
    provider: Arc<dyn LlmProvider>,
) -> RunSummary {
    let run_id = format!("run-{}", Uuid::new_v4());
    let started_at = Utc::now();
    let start = std::time::Instant::now();
    info!(
        run_id = %run_id,
        tasks = tasks.len(),
        parallel = config.parallel,
        "Starting repair run"
    );

    let parallel = config.parallel.max(1);
    let mut results: Vec<TaskResult> = Vec::with_capacity(tasks.len());
    for chunk in tasks.chunks(parallel) {
        let mut handles = Vec::new();
        for task in chunk {
            let task = task.clone();
            let config = config.clone();
            let provider = provider.clone();
            handles.push(tokio::spawn(async move {
                repair_one(task, &config, provider).await
            }));
        }
        for handle in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => warn!("Task panicked: {e}"),
            }
        }
    }

    let summary = summarize(run_id, started_at, start.elapsed().as_secs_f64(), results);
    info!(
        fixed = summary.fixed,
        unfixed = summary.unfixed,
        errors = summary.errors,
        "Repair run finished"
    );
    summary
}

async fn repair_one(
    task: TaskRecord,
    config: &RunnerConfig,
    provider: Arc<dyn LlmProvider>,
) -> TaskResult {
    let start = std::time::Instant::now();
    let verifier = Verifier::new(
        VerifierConfig::new()
            .with_timeout_secs(config.timeout_secs)
            .with_python_bin(config.python_bin.clone()),
    );
    let store = ArtifactStore::new(&config.artifacts_dir);
    let repair_config = RepairConfig::new()
        .with_budget(config.budget)
        .with_model(config.model.clone())
        .with_temperature(config.temperature)
        .with_max_tokens(config.max_tokens);
    let repair_loop = RepairLoop::new(provider, verifier, store, repair_config);

    info!(task_id = %task.task_id, "Repairing task");
    match repair_loop.run(&task).await {
        Ok(outcome) => {
            let status = match outcome.status {
                LoopStatus::Done => TaskStatus::Fixed,
                _ => TaskStatus::Unfixed,
            };
            TaskResult {
                task_id: task.task_id,
                bug_type: task.bug_type,
                status,
                buggy_code: task.buggy_code,
                fixed_code: outcome.final_source,
                docstring: task.docstring,
                tests: task.tests,
                rounds_used: outcome.rounds_used,
                final_outcome: Some(outcome.final_verdict.outcome),
                duration_secs: start.elapsed().as_secs_f64(),
                error: None,
            }
        }
        Err(e) => {
            warn!(
                task_id = %task.task_id,
                error = %e,
                "Repair loop aborted, falling back to the original buggy source"
            );
            TaskResult {
                task_id: task.task_id,
                bug_type: task.bug_type,
                status: TaskStatus::Error,
                buggy_code: task.buggy_code.clone(),
                fixed_code: task.buggy_code,
                docstring: task.docstring,
                tests: task.tests,
                rounds_used: 0,
                final_outcome: None,
                duration_secs: start.elapsed().as_secs_f64(),
                error: Some(e.to_string()),
            }
        }
    }
}

fn summarize(
    run_id: String,
    started_at: DateTime<Utc>,
    duration_secs: f64,
    results: Vec<TaskResult>,
) -> RunSummary {
    let fixed = results
        .iter()
        .filter(|r| matches!(r.status, TaskStatus::Fixed))
        .count();
    let unfixed = results
        .iter()
        .filter(|r| matches!(r.status, TaskStatus::Unfixed))
        .count();
    let errors = results
        .iter()
        .filter(|r| matches!(r.status, TaskStatus::Error))
        .count();

    let completed: Vec<&TaskResult> = results.iter().filter(|r| r.error.is_none()).collect();
    let avg_rounds = if completed.is_empty() {
        0.0
    } else {
        let total_rounds: usize = completed.iter().map(|r| r.rounds_used).sum();
        (total_rounds as f64 / completed.len() as f64 * 10.0).round() / 10.0
    };

    RunSummary {
        run_id,
        started_at,
        total: results.len(),
        fixed,
        unfixed,
        errors,
        avg_rounds,
        duration_secs,
        results,
    }
}

/// Writes result records as JSONL, creating parent directories as needed.
pub fn write_results_jsonl(results: &[TaskResult], path: &Path) -> Result<(), RunnerError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut out = String::new();
    for result in results {
        out.push_str(&serde_json::to_string(result)?);
        out.push('\n');
    }
    std::fs::write(path, out)?;
    info!(count = results.len(), path = %path.display(), "Wrote results");
    Ok(())
}

/// Loads result records from a JSONL file.
pub fn load_results_jsonl(path: &Path) -> Result<Vec<TaskResult>, RunnerError> {
    let content = std::fs::read_to_string(path)?;
    let mut results = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        results.push(serde_json::from_str(line)?);
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn result_with(status: TaskStatus, rounds_used: usize, error: Option<&str>) -> TaskResult {
        TaskResult {
            task_id: "0".to_string(),
            bug_type: Some("operator misuse".to_string()),
            status,
            buggy_code: "def f():\n    return 1\n".to_string(),
            fixed_code: "def f():\n    return 2\n".to_string(),
            docstring: String::new(),
            tests: "assert f() == 2\n".to_string(),
            rounds_used,
            final_outcome: Some(Outcome::Passed),
            duration_secs: 0.5,
            error: error.map(String::from),
        }
    }

    #[test]
    fn test_config_defaults() {
        let config = RunnerConfig::default();
        assert_eq!(config.budget, 5);
        assert_eq!(config.timeout_secs, 5);
        assert_eq!(config.parallel, 1);
        assert_eq!(config.python_bin, "python3");
        assert_eq!(config.artifacts_dir, PathBuf::from("tmp/code"));
    }

    #[test]
    fn test_config_builders() {
        let config = RunnerConfig::new()
            .with_budget(3)
            .with_timeout_secs(10)
            .with_parallel(4)
            .with_model("test-model")
            .with_artifacts_dir("/tmp/artifacts")
            .with_python_bin("python");

        assert_eq!(config.budget, 3);
        assert_eq!(config.timeout_secs, 10);
        assert_eq!(config.parallel, 4);
        assert_eq!(config.model, "test-model");
        assert_eq!(config.python_bin, "python");
    }

    #[test]
    fn test_config_from_yaml_with_partial_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.yaml");
        std::fs::write(&path, "budget: 2\nmodel: test-model\n").unwrap();

        let config = RunnerConfig::from_yaml(&path).unwrap();
        assert_eq!(config.budget, 2);
        assert_eq!(config.model, "test-model");
        assert_eq!(config.timeout_secs, 5);
    }

    #[test]
    fn test_task_status_display_and_serialization() {
        assert_eq!(TaskStatus::Fixed.to_string(), "fixed");
        assert_eq!(TaskStatus::Unfixed.to_string(), "unfixed");
        assert_eq!(TaskStatus::Error.to_string(), "error");

        let json = serde_json::to_string(&TaskStatus::Unfixed).unwrap();
        assert_eq!(json, "\"unfixed\"");
    }

    #[test]
    fn test_summarize_counts_statuses() {
        let results = vec![
            result_with(TaskStatus::Fixed, 1, None),
            result_with(TaskStatus::Fixed, 2, None),
            result_with(TaskStatus::Unfixed, 5, None),
            result_with(TaskStatus::Error, 0, Some("boom")),
        ];
        let summary = summarize("run-test".to_string(), Utc::now(), 1.0, results);

        assert_eq!(summary.total, 4);
        assert_eq!(summary.fixed, 2);
        assert_eq!(summary.unfixed, 1);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.avg_rounds, 2.7);
    }

    #[test]
    fn test_summarize_empty_run() {
        let summary = summarize("run-test".to_string(), Utc::now(), 0.0, Vec::new());
        assert_eq!(summary.total, 0);
        assert_eq!(summary.avg_rounds, 0.0);
    }

    #[test]
    fn test_results_jsonl_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results").join("run.jsonl");
        let results = vec![
            result_with(TaskStatus::Fixed, 1, None),
            result_with(TaskStatus::Error, 0, Some("transport failure")),
        ];

        write_results_jsonl(&results, &path).unwrap();
        let loaded = load_results_jsonl(&path).unwrap();

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].status, TaskStatus::Fixed);
        assert_eq!(loaded[1].error.as_deref(), Some("transport failure"));
    }

    #[test]
    fn test_result_serialization_skips_empty_options() {
        let mut result = result_with(TaskStatus::Fixed, 1, None);
        result.bug_type = None;
        result.final_outcome = None;
        let json = serde_json::to_string(&result).unwrap();

        assert!(!json.contains("bug_type"));
        assert!(!json.contains("final_outcome"));
        assert!(!json.contains("\"error\""));
    }
}
