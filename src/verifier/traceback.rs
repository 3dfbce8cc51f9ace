//! Parsing of interpreter tracebacks captured on stderr.
//!
//! A traceback prints call frames outermost first, so the failure site is
//! the last frame belonging to the program under test. Frames pointing into
//! library code or into dynamically compiled snippets are skipped.

use regex::Regex;

const TRACEBACK_HEADER: &str = "Traceback (most recent call last):";

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Frame {
    pub file: String,
    pub line: usize,
}

/// Final exception line of a traceback, split into type and detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ExceptionInfo {
    pub kind: String,
    pub detail: String,
}

pub(crate) fn parse_frames(stderr: &str) -> Vec<Frame> {
    let re = Regex::new(r#"^\s*File "([^"]+)", line (\d+)"#)
        .expect("Invalid regex for traceback frames");

    stderr
        .lines()
        .filter_map(|line| {
            let caps = re.captures(line)?;
            let file = caps.get(1)?.as_str().to_string();
            let line = caps.get(2)?.as_str().parse().ok()?;
            Some(Frame { file, line })
        })
        .collect()
}

/// Innermost frame whose source location is `program_path` itself.
///
/// With chained exceptions the reverse walk starts in the final traceback
/// block, so the reported line is the one of the exception that actually
/// terminated the program.
pub(crate) fn innermost_program_frame(stderr: &str, program_path: &str) -> Option<usize> {
    parse_frames(stderr)
        .into_iter()
        .rev()
        .find(|frame| frame.file == program_path)
        .map(|frame| frame.line)
}

/// Extracts the `Type: detail` line that ends a traceback.
///
/// Only column-zero lines whose dotted head looks like an exception type
/// (final component capitalized) are accepted, which keeps multi-line
/// exception messages from being mistaken for the exception itself.
pub(crate) fn final_exception(stderr: &str) -> Option<ExceptionInfo> {
    let region = match stderr.rfind(TRACEBACK_HEADER) {
        Some(pos) => &stderr[pos..],
        None => stderr,
    };

    region
        .lines()
        .rev()
        .find_map(|line| parse_exception_line(line))
}

fn parse_exception_line(line: &str) -> Option<ExceptionInfo> {
    if line.is_empty() || line.starts_with(char::is_whitespace) {
        return None;
    }

    let (head, detail) = match line.split_once(':') {
        Some((head, rest)) => (head, rest.trim()),
        None => (line.trim_end(), ""),
    };

    if !is_exception_type(head) {
        return None;
    }

    Some(ExceptionInfo {
        kind: head.to_string(),
        detail: detail.to_string(),
    })
}

fn is_exception_type(head: &str) -> bool {
    if head.is_empty() {
        return false;
    }
    let valid_chars = head
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if !valid_chars {
        return false;
    }
    // "ValueError" or dotted "socket.timeout"-style heads; the last
    // component must be capitalized to rule out message continuation lines.
    head.rsplit('.')
        .next()
        .and_then(|name| name.chars().next())
        .map(|c| c.is_ascii_uppercase())
        .unwrap_or(false)
}
