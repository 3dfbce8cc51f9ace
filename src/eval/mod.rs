//! Independent re-verification of repair results.
//!
//! The evaluator trusts nothing from the repair phase: every record's final
//! candidate is re-run against its tests with a fresh verifier, and pass@1
//! is computed from those verdicts alone.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::harness::TaskResult;
use crate::verifier::{Outcome, Verifier, VerifierError};

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("Verifier error: {0}")]
    Verifier(#[from] VerifierError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Pass/total counts for one bug type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BugTypeStats {
    pub total: usize,
    pub passed: usize,
}

/// Evaluation detail for one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvaluation {
    pub task_id: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Full evaluation report.
#[derive(Debug, Clone, Serialize)]
pub struct EvalReport {
    pub generated_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: usize,
    pub timeouts: usize,
    #[serde(rename = "pass@1")]
    pub pass_at_1: f64,
    pub by_bug_type: BTreeMap<String, BugTypeStats>,
    pub results: Vec<TaskEvaluation>,
}

/// Re-verifies every record and aggregates pass@1.
///
/// Records missing code or tests count as errors without being executed.
/// `Err` is reserved for verifier environment faults; candidate failures
/// are classified into the counters.
pub async fn evaluate_results(
    results: &[TaskResult],
    verifier: &Verifier,
) -> Result<EvalReport, EvalError> {
    let mut passed = 0usize;
    let mut failed = 0usize;
    let mut errors = 0usize;
    let mut timeouts = 0usize;
    let mut by_bug_type: BTreeMap<String, BugTypeStats> = BTreeMap::new();
    let mut evaluations = Vec::with_capacity(results.len());

    for result in results {
        let evaluation = if result.fixed_code.trim().is_empty() || result.tests.trim().is_empty() {
            errors += 1;
            TaskEvaluation {
                task_id: result.task_id.clone(),
                passed: false,
                outcome: None,
                error: Some("Missing code or tests".to_string()),
            }
        } else {
            let verdict = verifier.verify(&result.fixed_code, &result.tests).await?;
            match verdict.outcome {
                Outcome::Passed => passed += 1,
                Outcome::Failed => failed += 1,
                Outcome::TimedOut => timeouts += 1,
                Outcome::ExecutionError | Outcome::SyntaxError => errors += 1,
            }
            TaskEvaluation {
                task_id: result.task_id.clone(),
                passed: verdict.is_passed(),
                outcome: Some(verdict.outcome),
                error: None,
            }
        };

        let key = result
            .bug_type
            .clone()
            .unwrap_or_else(|| "unknown".to_string());
        let stats = by_bug_type.entry(key).or_default();
        stats.total += 1;
        if evaluation.passed {
            stats.passed += 1;
        }
        evaluations.push(evaluation);
    }

    let total = results.len();
    let pass_at_1 = if total == 0 {
        0.0
    } else {
        (passed as f64 / total as f64 * 1000.0).round() / 10.0
    };

    info!(total, passed, pass_at_1, "Evaluation complete");
    Ok(EvalReport {
        generated_at: Utc::now(),
        total,
        passed,
        failed,
        errors,
        timeouts,
        pass_at_1,
        by_bug_type,
        results: evaluations,
    })
}

/// Writes the report as pretty-printed JSON.
pub fn save_report(report: &EvalReport, path: &Path) -> Result<(), EvalError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, serde_json::to_string_pretty(report)?)?;
    info!(path = %path.display(), "Wrote evaluation report");
    Ok(())
}
