//! HumanEvalFix-style task records and dataset I/O.

mod loader;

use serde::{Deserialize, Serialize};

pub use loader::{load_jsonl, load_or_mock, mock_tasks, sample_per_bug_type, save_jsonl};

/// One buggy/fixed function pair with its held-out tests.
///
/// `fixed_code` is the canonical solution shipped with the benchmark; the
/// repair loop never reads it, it is retained for dataset lineage and
/// manual inspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: String,
    #[serde(default)]
    pub docstring: String,
    pub buggy_code: String,
    #[serde(default)]
    pub fixed_code: String,
    pub tests: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bug_type: Option<String>,
}
