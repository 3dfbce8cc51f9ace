//! Candidate extraction from model replies.
//!
//! Replies arrive in several shapes: a `python`-tagged fence, an untagged
//! fence, or bare source with no fence at all. Extraction tries each shape
//! in that order and validates that something non-empty came out; a reply
//! matching none of them yields `None` and the caller keeps the previous
//! candidate.

use regex::Regex;

/// Token a model replies with to declare it is finished.
pub const COMPLETION_TOKEN: &str = "DONE";

/// True when the reply is exactly the completion token.
pub fn is_completion_signal(reply: &str) -> bool {
    reply.trim().eq_ignore_ascii_case(COMPLETION_TOKEN)
}

/// Extracts a replacement candidate from a model reply.
pub fn extract_candidate(reply: &str) -> Option<String> {
    if let Some(code) = extract_python_fence(reply) {
        return Some(code);
    }
    if let Some(code) = extract_any_fence(reply) {
        return Some(code);
    }
    let trimmed = reply.trim();
    if looks_like_python(trimmed) {
        return Some(format!("{trimmed}\n"));
    }
    None
}

fn extract_python_fence(reply: &str) -> Option<String> {
    let re = Regex::new(r"(?s)```python\s*(.*?)\s*```")
        .expect("Invalid regex for python fences");
    normalize(re.captures(reply)?.get(1)?.as_str())
}

fn extract_any_fence(reply: &str) -> Option<String> {
    let re = Regex::new(r"(?s)```[a-zA-Z0-9_+.-]*[ \t]*\n(.*?)```")
        .expect("Invalid regex for generic fences");
    normalize(re.captures(reply)?.get(1)?.as_str())
}

fn normalize(code: &str) -> Option<String> {
    let code = code.trim();
    if code.is_empty() {
        None
    } else {
        Some(format!("{code}\n"))
    }
}

fn looks_like_python(text: &str) -> bool {
    let first = match text.lines().next() {
        Some(line) => line,
        None => return false,
    };
    first.starts_with("def ")
        || first.starts_with("class ")
        || first.starts_with("import ")
        || first.starts_with("from ")
        || first.starts_with('@')
        || first.starts_with('#')
}
