//! Sandboxed execution verifier.
//!
//! Takes a candidate source plus a test source, runs them as one combined
//! program in a fresh interpreter subprocess under a wall-clock deadline,
//! and classifies the result into a structured [`Verdict`]. The combined
//! program is parsed before execution, so syntactically invalid candidates
//! never execute a single statement.
//!
//! Failure modes of the code under test always come back as verdicts.
//! [`VerifierError`] is reserved for environment faults (scratch directory
//! cannot be created, interpreter missing) that are not the candidate's
//! fault.

mod python;
mod traceback;
mod verdict;

use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;
use thiserror::Error;
use tracing::debug;

use python::run_bounded;
pub use verdict::{Outcome, Verdict};

/// Parse-only pre-check executed before the combined program.
///
/// Reports `lineno<TAB>message` on stderr and exits nonzero when the source
/// does not compile; lineno 0 marks parse failures without a usable line.
const PARSE_CHECK: &str = r#"import ast, sys
try:
    with open(sys.argv[1], encoding="utf-8") as handle:
        source = handle.read()
    ast.parse(source)
except SyntaxError as err:
    sys.stderr.write("%d\t%s\n" % (err.lineno or 0, err.msg or "invalid syntax"))
    sys.exit(1)
except Exception as err:
    sys.stderr.write("0\t%s: %s\n" % (type(err).__name__, err))
    sys.exit(1)
"#;

#[derive(Debug, Error)]
pub enum VerifierError {
    #[error("Failed to create scratch directory: {0}")]
    Scratch(std::io::Error),

    #[error("Failed to write program file: {0}")]
    WriteProgram(std::io::Error),

    #[error("Failed to spawn interpreter '{bin}': {source}")]
    Spawn {
        bin: String,
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration for the execution verifier.
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// Wall-clock deadline per verification call, in seconds.
    pub timeout_secs: u64,
    /// Interpreter binary used for the parse check and for execution.
    pub python_bin: String,
    /// Root for per-call scratch directories; system temp dir when unset.
    pub scratch_root: Option<PathBuf>,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 5,
            python_bin: "python3".to_string(),
            scratch_root: None,
        }
    }
}

impl VerifierConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_python_bin(mut self, bin: impl Into<String>) -> Self {
        self.python_bin = bin.into();
        self
    }

    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }
}

/// Executes candidate + tests as one program and classifies the outcome.
///
/// Every call gets a fresh scratch directory and a fresh interpreter
/// process, so no state leaks between calls, even for the same task.
pub struct Verifier {
    config: VerifierConfig,
}

impl Verifier {
    pub fn new(config: VerifierConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Verifies one candidate against one test suite.
    ///
    /// Returns a [`Verdict`] for every possible input; `Err` is reserved for
    /// environment faults.
    pub async fn verify(
        &self,
        candidate_source: &str,
        test_source: &str,
    ) -> Result<Verdict, VerifierError> {
        let combined = compose_program(candidate_source, test_source);
        let scratch = self.create_scratch()?;
        let program_path = scratch.path().join("program.py");
        tokio::fs::write(&program_path, &combined)
            .await
            .map_err(VerifierError::WriteProgram)?;
        let program = program_path.to_string_lossy().to_string();
        let limit = Duration::from_secs(self.config.timeout_secs);

        debug!(
            program_bytes = combined.len(),
            timeout_secs = self.config.timeout_secs,
            "Verifying combined program"
        );

        let parse = run_bounded(
            &self.config.python_bin,
            &["-I", "-c", PARSE_CHECK, &program],
            scratch.path(),
            limit,
        )
        .await?;
        if parse.timed_out {
            return Ok(timed_out_verdict(
                self.config.timeout_secs,
                parse.stdout,
                parse.stderr,
            ));
        }
        match parse.exit_code {
            Some(0) => {}
            Some(_) => return Ok(syntax_verdict(&combined, &parse.stderr)),
            None => {
                return Ok(Verdict::new(
                    Outcome::ExecutionError,
                    "Parse check terminated by signal",
                ))
            }
        }

        let run = run_bounded(
            &self.config.python_bin,
            &["-I", &program],
            scratch.path(),
            limit,
        )
        .await?;
        if run.timed_out {
            return Ok(timed_out_verdict(
                self.config.timeout_secs,
                run.stdout,
                run.stderr,
            ));
        }

        let verdict = match run.exit_code {
            Some(0) => Verdict::new(Outcome::Passed, "All tests passed")
                .with_output(run.stdout, run.stderr),
            Some(code) => classify_failure(&combined, &program, code, run.stdout, run.stderr),
            None => Verdict::new(Outcome::ExecutionError, "Process terminated by signal")
                .with_output(run.stdout, run.stderr),
        };
        Ok(verdict)
    }

    fn create_scratch(&self) -> Result<TempDir, VerifierError> {
        let created = match &self.config.scratch_root {
            Some(root) => {
                std::fs::create_dir_all(root).map_err(VerifierError::Scratch)?;
                tempfile::Builder::new()
                    .prefix("repairbench-")
                    .tempdir_in(root)
            }
            None => tempfile::Builder::new().prefix("repairbench-").tempdir(),
        };
        created.map_err(VerifierError::Scratch)
    }
}

/// Candidate first, one blank line, then the tests, so verdict line numbers
/// match the combined text the repair loop shows to the model.
fn compose_program(candidate: &str, tests: &str) -> String {
    let mut program = String::with_capacity(candidate.len() + tests.len() + 2);
    program.push_str(candidate);
    if !candidate.ends_with('\n') {
        program.push('\n');
    }
    program.push('\n');
    program.push_str(tests);
    if !program.ends_with('\n') {
        program.push('\n');
    }
    program
}

fn timed_out_verdict(timeout_secs: u64, stdout: String, stderr: String) -> Verdict {
    Verdict::new(
        Outcome::TimedOut,
        format!("Code execution exceeded {timeout_secs} seconds"),
    )
    .with_output(stdout, stderr)
}

fn syntax_verdict(combined: &str, checker_stderr: &str) -> Verdict {
    let (line, msg) = parse_checker_report(checker_stderr);
    let message = match line {
        Some(line) => format!("Syntax error at line {line}: {msg}"),
        None => format!("Syntax error: {msg}"),
    };
    let mut verdict = Verdict::new(Outcome::SyntaxError, message);
    if let Some(line) = line {
        verdict = verdict.with_location(line, statement_at(combined, line));
    }
    verdict
}

fn parse_checker_report(stderr: &str) -> (Option<usize>, String) {
    let report = stderr.lines().next().unwrap_or("").trim_end();
    match report.split_once('\t') {
        Some((lineno, msg)) => {
            let lineno = lineno.trim().parse::<usize>().unwrap_or(0);
            let msg = msg.trim().to_string();
            if lineno >= 1 {
                (Some(lineno), msg)
            } else {
                (None, msg)
            }
        }
        None if report.is_empty() => (None, "source did not compile".to_string()),
        None => (None, report.to_string()),
    }
}

fn classify_failure(
    combined: &str,
    program_path: &str,
    exit_code: i32,
    stdout: String,
    stderr: String,
) -> Verdict {
    let location = traceback::innermost_program_frame(&stderr, program_path);
    match traceback::final_exception(&stderr) {
        Some(exc) if exc.kind == "AssertionError" => {
            let message = if exc.detail.is_empty() {
                "Test assertion failed".to_string()
            } else {
                format!("Test assertion failed: {}", exc.detail)
            };
            let mut verdict =
                Verdict::new(Outcome::Failed, message).with_exception_kind("assertion");
            if let Some(line) = location {
                verdict = verdict.with_location(line, statement_at(combined, line));
            }
            verdict.with_output(stdout, stderr)
        }
        Some(exc) => {
            let message = if exc.detail.is_empty() {
                exc.kind.clone()
            } else {
                format!("{}: {}", exc.kind, exc.detail)
            };
            let mut verdict =
                Verdict::new(Outcome::ExecutionError, message).with_exception_kind(exc.kind);
            if let Some(line) = location {
                verdict = verdict.with_location(line, statement_at(combined, line));
            }
            verdict.with_output(stdout, stderr)
        }
        None => Verdict::new(
            Outcome::ExecutionError,
            format!("Process exited with code {exit_code}"),
        )
        .with_output(stdout, stderr),
    }
}

fn statement_at(combined: &str, line: usize) -> Option<String> {
    combined
        .lines()
        .nth(line.checked_sub(1)?)
        .map(|s| s.trim().to_string())
}
