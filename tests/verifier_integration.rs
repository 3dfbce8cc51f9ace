//! End-to-end verifier and harness scenarios against a real interpreter.
//!
//! These tests spawn `python3` subprocesses. They skip silently on hosts
//! without a `python3` on PATH.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use repairbench::dataset::mock_tasks;
use repairbench::error::LlmError;
use repairbench::harness::{run_repairs, RunnerConfig, TaskStatus};
use repairbench::llm::{Choice, GenerationRequest, GenerationResponse, LlmProvider, Message};
use repairbench::verifier::{Outcome, Verifier, VerifierConfig, VerifierError};
use tempfile::TempDir;

fn python_available() -> bool {
    std::process::Command::new("python3")
        .arg("--version")
        .output()
        .is_ok()
}

fn verifier_with_timeout(secs: u64) -> Verifier {
    Verifier::new(VerifierConfig::new().with_timeout_secs(secs))
}

#[tokio::test]
async fn test_failing_assertion_is_located() {
    if !python_available() {
        return;
    }
    let verifier = verifier_with_timeout(5);
    let verdict = verifier
        .verify(
            "def add(a, b):\n    return a - b\n",
            "assert add(2, 3) == 5\n",
        )
        .await
        .unwrap();

    assert_eq!(verdict.outcome, Outcome::Failed);
    assert_eq!(verdict.exception_kind.as_deref(), Some("assertion"));
    assert_eq!(verdict.failing_line, Some(4));
    assert_eq!(
        verdict.failing_statement.as_deref(),
        Some("assert add(2, 3) == 5")
    );
}

#[tokio::test]
async fn test_syntax_error_never_executes_statements() {
    if !python_available() {
        return;
    }
    let verifier = verifier_with_timeout(5);
    let verdict = verifier
        .verify(
            "print('NEVER_RUNS')\ndef f(:\n    pass\n",
            "assert True\n",
        )
        .await
        .unwrap();

    assert_eq!(verdict.outcome, Outcome::SyntaxError);
    assert_eq!(verdict.failing_line, Some(2));
    assert!(!verdict.stdout.contains("NEVER_RUNS"));
    assert!(verdict.message.contains("Syntax error at line 2"));
}

#[tokio::test]
async fn test_correct_candidate_passes_with_clean_fields() {
    if !python_available() {
        return;
    }
    let verifier = verifier_with_timeout(5);
    let verdict = verifier
        .verify(
            "def add(a, b):\n    return a + b\n",
            "assert add(2, 3) == 5\n",
        )
        .await
        .unwrap();

    assert_eq!(verdict.outcome, Outcome::Passed);
    assert!(verdict.is_passed());
    assert_eq!(verdict.exception_kind, None);
    assert_eq!(verdict.failing_line, None);
    assert_eq!(verdict.failing_statement, None);
}

#[tokio::test]
async fn test_infinite_loop_times_out_within_deadline() {
    if !python_available() {
        return;
    }
    let verifier = verifier_with_timeout(1);
    let start = Instant::now();
    let verdict = verifier
        .verify("while True:\n    pass\n", "")
        .await
        .unwrap();
    let elapsed = start.elapsed();

    assert_eq!(verdict.outcome, Outcome::TimedOut);
    assert!(elapsed >= Duration::from_millis(900), "returned too early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "returned too late: {elapsed:?}");

    // A second call right after must not be affected by a stale deadline.
    let verdict = verifier.verify("x = 1\n", "assert x == 1\n").await.unwrap();
    assert_eq!(verdict.outcome, Outcome::Passed);
}

#[tokio::test]
async fn test_output_flushed_before_timeout_is_preserved() {
    if !python_available() {
        return;
    }
    let verifier = verifier_with_timeout(1);
    let verdict = verifier
        .verify(
            "print('before the hang', flush=True)\nwhile True:\n    pass\n",
            "",
        )
        .await
        .unwrap();

    assert_eq!(verdict.outcome, Outcome::TimedOut);
    assert!(verdict.stdout.contains("before the hang"));
}

#[tokio::test]
async fn test_runtime_exception_reports_kind_and_line() {
    if !python_available() {
        return;
    }
    let verifier = verifier_with_timeout(5);
    let verdict = verifier
        .verify("def f():\n    return {}['missing']\n", "f()\n")
        .await
        .unwrap();

    assert_eq!(verdict.outcome, Outcome::ExecutionError);
    assert_eq!(verdict.exception_kind.as_deref(), Some("KeyError"));
    assert_eq!(verdict.failing_line, Some(2));
    assert_eq!(
        verdict.failing_statement.as_deref(),
        Some("return {}['missing']")
    );
}

#[tokio::test]
async fn test_stdout_and_stderr_are_captured() {
    if !python_available() {
        return;
    }
    let verifier = verifier_with_timeout(5);
    let verdict = verifier
        .verify(
            "import sys\nprint('captured output')\nsys.stderr.write('warning text\\n')\n",
            "",
        )
        .await
        .unwrap();

    assert_eq!(verdict.outcome, Outcome::Passed);
    assert!(verdict.stdout.contains("captured output"));
    assert!(verdict.stderr.contains("warning text"));
}

#[tokio::test]
async fn test_namespace_is_isolated_between_calls() {
    if !python_available() {
        return;
    }
    let verifier = verifier_with_timeout(5);

    let first = verifier
        .verify("leak = 42\n", "assert leak == 42\n")
        .await
        .unwrap();
    assert_eq!(first.outcome, Outcome::Passed);

    let probe = "try:\n    leak\nexcept NameError:\n    pass\nelse:\n    raise AssertionError('leaked')\n";
    let second = verifier.verify(probe, "").await.unwrap();
    assert_eq!(second.outcome, Outcome::Passed);
}

#[tokio::test]
async fn test_identical_inputs_yield_identical_classification() {
    if !python_available() {
        return;
    }
    let verifier = verifier_with_timeout(5);
    let candidate = "def mean(xs):\n    return sum(xs) / len(xs)\n";
    let tests = "mean([])\n";

    let first = verifier.verify(candidate, tests).await.unwrap();
    let second = verifier.verify(candidate, tests).await.unwrap();

    assert_eq!(first.outcome, second.outcome);
    assert_eq!(first.exception_kind, second.exception_kind);
    assert_eq!(first.outcome, Outcome::ExecutionError);
    assert_eq!(first.exception_kind.as_deref(), Some("ZeroDivisionError"));
}

#[tokio::test]
async fn test_missing_interpreter_is_an_error_not_a_verdict() {
    let verifier = Verifier::new(
        VerifierConfig::new().with_python_bin("no-such-interpreter-anywhere"),
    );
    let result = verifier.verify("x = 1\n", "").await;

    assert!(matches!(result, Err(VerifierError::Spawn { .. })));
}

struct ScriptedProvider {
    reply: String,
    fail: bool,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    fn replying(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    fn failing() -> Self {
        Self {
            reply: String::new(),
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn generate(
        &self,
        _request: GenerationRequest,
    ) -> Result<GenerationResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(LlmError::RequestFailed("scripted transport failure".to_string()));
        }
        Ok(GenerationResponse {
            id: "scripted".to_string(),
            model: "scripted".to_string(),
            choices: vec![Choice {
                index: 0,
                message: Message::assistant(self.reply.clone()),
                finish_reason: Some("stop".to_string()),
            }],
            usage: None,
        })
    }
}

#[tokio::test]
async fn test_batch_run_fixes_task_with_good_reply() {
    if !python_available() {
        return;
    }
    let task = mock_tasks().remove(0);
    let reply = format!("```python\n{}```", task.fixed_code);
    let provider = Arc::new(ScriptedProvider::replying(reply));
    let artifacts = TempDir::new().unwrap();
    let config = RunnerConfig::new()
        .with_budget(3)
        .with_model("scripted")
        .with_artifacts_dir(artifacts.path());

    let summary = run_repairs(vec![task], config, provider.clone()).await;

    assert_eq!(summary.total, 1);
    assert_eq!(summary.fixed, 1);
    assert_eq!(summary.results[0].status, TaskStatus::Fixed);
    assert_eq!(summary.results[0].final_outcome, Some(Outcome::Passed));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_batch_run_records_fallback_on_transport_failure() {
    if !python_available() {
        return;
    }
    let task = mock_tasks().remove(0);
    let buggy = task.buggy_code.clone();
    let provider = Arc::new(ScriptedProvider::failing());
    let artifacts = TempDir::new().unwrap();
    let config = RunnerConfig::new()
        .with_budget(3)
        .with_model("scripted")
        .with_artifacts_dir(artifacts.path());

    let summary = run_repairs(vec![task], config, provider).await;

    assert_eq!(summary.total, 1);
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.results[0].status, TaskStatus::Error);
    assert_eq!(summary.results[0].fixed_code, buggy);
    assert!(summary.results[0]
        .error
        .as_deref()
        .unwrap()
        .contains("scripted transport failure"));
}
