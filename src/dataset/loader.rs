//! Dataset loading, persistence and sampling.

use std::collections::HashMap;
use std::path::Path;

use rand::seq::IndexedRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{info, warn};

use crate::error::DatasetError;

use super::TaskRecord;

/// Loads a JSONL dataset, one task record per line. Blank lines are
/// skipped; a malformed line fails the whole load with its line number.
pub fn load_jsonl(path: &Path) -> Result<Vec<TaskRecord>, DatasetError> {
    let content = std::fs::read_to_string(path)?;
    let mut tasks = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let record: TaskRecord =
            serde_json::from_str(line).map_err(|e| DatasetError::InvalidRecord {
                line: idx + 1,
                message: e.to_string(),
            })?;
        tasks.push(record);
    }
    if tasks.is_empty() {
        return Err(DatasetError::Empty(path.display().to_string()));
    }
    Ok(tasks)
}

/// Writes task records as JSONL, creating parent directories as needed.
pub fn save_jsonl(tasks: &[TaskRecord], path: &Path) -> Result<(), DatasetError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut out = String::new();
    for task in tasks {
        out.push_str(&serde_json::to_string(task)?);
        out.push('\n');
    }
    std::fs::write(path, out)?;
    Ok(())
}

/// Loads the dataset at `path`, falling back to the built-in mock tasks
/// when no path is given or the load fails.
pub fn load_or_mock(path: Option<&Path>) -> Vec<TaskRecord> {
    match path {
        Some(path) => match load_jsonl(path) {
            Ok(tasks) => {
                info!(count = tasks.len(), path = %path.display(), "Loaded dataset");
                tasks
            }
            Err(e) => {
                warn!(error = %e, path = %path.display(), "Failed to load dataset, using built-in mock tasks");
                mock_tasks()
            }
        },
        None => {
            info!("No dataset path given, using built-in mock tasks");
            mock_tasks()
        }
    }
}

/// Three tiny deterministic tasks so the harness runs end-to-end without
/// any external data.
pub fn mock_tasks() -> Vec<TaskRecord> {
    vec![
        TaskRecord {
            task_id: "0".to_string(),
            docstring: "Add two numbers and return the result.".to_string(),
            buggy_code: "def add(a, b):\n    \"\"\"Add two numbers and return the result.\"\"\"\n    return a - b\n".to_string(),
            fixed_code: "def add(a, b):\n    \"\"\"Add two numbers and return the result.\"\"\"\n    return a + b\n".to_string(),
            tests: "assert add(1, 2) == 3\nassert add(0, 0) == 0\nassert add(-1, 1) == 0\n".to_string(),
            bug_type: Some("operator misuse".to_string()),
        },
        TaskRecord {
            task_id: "1".to_string(),
            docstring: "Multiply two numbers and return the result.".to_string(),
            buggy_code: "def multiply(a, b):\n    \"\"\"Multiply two numbers and return the result.\"\"\"\n    return a + b\n".to_string(),
            fixed_code: "def multiply(a, b):\n    \"\"\"Multiply two numbers and return the result.\"\"\"\n    return a * b\n".to_string(),
            tests: "assert multiply(2, 3) == 6\nassert multiply(0, 5) == 0\nassert multiply(-2, 3) == -6\n".to_string(),
            bug_type: Some("operator misuse".to_string()),
        },
        TaskRecord {
            task_id: "2".to_string(),
            docstring: "Return True if n is even, False otherwise.".to_string(),
            buggy_code: "def is_even(n):\n    \"\"\"Return True if n is even, False otherwise.\"\"\"\n    return n % 2 == 1\n".to_string(),
            fixed_code: "def is_even(n):\n    \"\"\"Return True if n is even, False otherwise.\"\"\"\n    return n % 2 == 0\n".to_string(),
            tests: "assert is_even(2) == True\nassert is_even(3) == False\nassert is_even(0) == True\n".to_string(),
            bug_type: Some("value misuse".to_string()),
        },
    ]
}

/// Picks one task per distinct bug type, uniformly within each group under
/// a seeded RNG. Group order follows first appearance in the input, so the
/// result is fully deterministic for a given dataset and seed.
pub fn sample_per_bug_type(tasks: &[TaskRecord], seed: u64) -> Vec<TaskRecord> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<&TaskRecord>> = HashMap::new();

    for task in tasks {
        let key = task.bug_type.clone().unwrap_or_default();
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(task);
    }

    let mut sampled = Vec::with_capacity(order.len());
    for key in &order {
        if let Some(group) = groups.get(key) {
            if let Some(task) = group.choose(&mut rng) {
                sampled.push((*task).clone());
            }
        }
    }
    sampled
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_jsonl_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tasks.jsonl");

        let tasks = mock_tasks();
        save_jsonl(&tasks, &path).unwrap();
        let loaded = load_jsonl(&path).unwrap();

        assert_eq!(loaded, tasks);
    }

    #[test]
    fn test_load_jsonl_skips_blank_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tasks.jsonl");
        let record = serde_json::to_string(&mock_tasks()[0]).unwrap();
        std::fs::write(&path, format!("\n{record}\n\n")).unwrap();

        let loaded = load_jsonl(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].task_id, "0");
    }

    #[test]
    fn test_load_jsonl_reports_bad_line_number() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tasks.jsonl");
        let record = serde_json::to_string(&mock_tasks()[0]).unwrap();
        std::fs::write(&path, format!("{record}\nnot json\n")).unwrap();

        match load_jsonl(&path) {
            Err(DatasetError::InvalidRecord { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected InvalidRecord, got {other:?}"),
        }
    }

    #[test]
    fn test_load_jsonl_empty_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tasks.jsonl");
        std::fs::write(&path, "\n\n").unwrap();

        assert!(matches!(load_jsonl(&path), Err(DatasetError::Empty(_))));
    }

    #[test]
    fn test_load_or_mock_falls_back() {
        let tasks = load_or_mock(Some(Path::new("/nonexistent/tasks.jsonl")));
        assert_eq!(tasks.len(), 3);
        assert_eq!(tasks, load_or_mock(None));
    }

    #[test]
    fn test_mock_tasks_are_well_formed() {
        for task in mock_tasks() {
            assert!(!task.task_id.is_empty());
            assert!(!task.tests.is_empty());
            assert_ne!(task.buggy_code, task.fixed_code);
            assert!(task.bug_type.is_some());
        }
    }

    #[test]
    fn test_sample_per_bug_type_one_per_group() {
        let sampled = sample_per_bug_type(&mock_tasks(), 42);

        assert_eq!(sampled.len(), 2);
        assert_eq!(sampled[0].bug_type.as_deref(), Some("operator misuse"));
        assert_eq!(sampled[1].bug_type.as_deref(), Some("value misuse"));
    }

    #[test]
    fn test_sample_per_bug_type_deterministic() {
        let tasks = mock_tasks();
        let first = sample_per_bug_type(&tasks, 42);
        let second = sample_per_bug_type(&tasks, 42);
        assert_eq!(first, second);
    }
}
