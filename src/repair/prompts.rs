//! Prompt templates for the repair agent.

/// System prompt establishing the repair protocol.
pub const REPAIR_SYSTEM_PROMPT: &str = r#"You are an expert Python debugging agent. You receive a buggy function, its documentation and the test suite it must pass, then repeated verification feedback until the tests pass.

## Rules

1. Always return the COMPLETE corrected source, never a diff or a fragment.
2. Put the corrected source in a single fenced code block tagged `python`.
3. Keep the function name and signature unchanged unless the tests require otherwise.
4. Do not restate or modify the tests.
5. If you believe no further action is needed, respond with exactly `DONE` and nothing else.
"#;

/// Initial task prompt: documentation, buggy source and the tests to pass.
pub fn build_task_prompt(docstring: &str, buggy_code: &str, tests: &str) -> String {
    format!(
        r#"Fix the bug in the following Python function.

## Documentation
{docstring}

## Buggy code
```python
{buggy_code}
```

## Tests it must pass
```python
{tests}
```

Return the complete corrected source in a ```python block."#
    )
}

/// Feedback prompt built from the latest verdict.
///
/// Line numbers refer to the combined program: candidate source, one blank
/// line, then the tests.
pub fn build_feedback_prompt(verdict: &crate::verifier::Verdict) -> String {
    let mut prompt = format!(
        "The current candidate does not pass verification yet.\n\n## Verdict\n- outcome: {}\n- message: {}\n",
        verdict.outcome, verdict.message
    );

    if let Some(line) = verdict.failing_line {
        prompt.push_str(&format!("- failing line {line}"));
        if let Some(statement) = &verdict.failing_statement {
            prompt.push_str(&format!(": `{statement}`"));
        }
        prompt.push('\n');
        prompt.push_str(
            "  (line numbers count the candidate source, one blank line, then the tests)\n",
        );
    }

    if !verdict.stdout.is_empty() {
        prompt.push_str(&format!("\n## Captured stdout\n```\n{}\n```\n", verdict.stdout));
    }
    if !verdict.stderr.is_empty() {
        prompt.push_str(&format!("\n## Captured stderr\n```\n{}\n```\n", verdict.stderr));
    }

    prompt.push_str(
        "\nReturn the complete corrected source in a ```python block, or respond with exactly DONE if no further action is needed.",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verifier::{Outcome, Verdict};

    #[test]
    fn test_system_prompt_states_protocol() {
        assert!(REPAIR_SYSTEM_PROMPT.contains("COMPLETE corrected source"));
        assert!(REPAIR_SYSTEM_PROMPT.contains("`DONE`"));
    }

    #[test]
    fn test_task_prompt_includes_all_parts() {
        let prompt = build_task_prompt("Adds numbers.", "def add(a, b):\n    return a - b", "assert add(1, 2) == 3");

        assert!(prompt.contains("Adds numbers."));
        assert!(prompt.contains("return a - b"));
        assert!(prompt.contains("assert add(1, 2) == 3"));
        assert!(prompt.contains("```python"));
    }

    #[test]
    fn test_feedback_prompt_includes_location() {
        let verdict = Verdict::new(Outcome::Failed, "Test assertion failed")
            .with_location(4, Some("assert add(2, 3) == 5".to_string()))
            .with_exception_kind("assertion");
        let prompt = build_feedback_prompt(&verdict);

        assert!(prompt.contains("outcome: failed"));
        assert!(prompt.contains("failing line 4"));
        assert!(prompt.contains("assert add(2, 3) == 5"));
    }

    #[test]
    fn test_feedback_prompt_omits_empty_streams() {
        let verdict = Verdict::new(Outcome::TimedOut, "Code execution exceeded 5 seconds");
        let prompt = build_feedback_prompt(&verdict);

        assert!(!prompt.contains("Captured stdout"));
        assert!(!prompt.contains("Captured stderr"));
        assert!(prompt.contains("timed_out"));
    }
}
