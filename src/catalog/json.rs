//! Response body parsing with path-aware error messages.
//!
//! Catalog payloads are deeply nested (movie detail → director → movies), so a
//! bare serde error like "invalid type: null" is not enough to find the bad
//! field. Errors produced here name the JSON path and show the offending text.

use anyhow::Result;
use serde::de::DeserializeOwned;

/// Width of the excerpt shown around the failing column, in characters.
const EXCERPT_WIDTH: usize = 24;

/// Deserialize `body`, reporting the JSON path, a short reason and an excerpt
/// of the failing line on error.
pub fn parse_json_with_context<T: DeserializeOwned>(body: &str) -> Result<T> {
    let de = &mut serde_json::Deserializer::from_str(body);
    serde_path_to_error::deserialize(de).map_err(|err| {
        let path = err.path().to_string();
        let inner = err.into_inner();
        let (line, column) = (inner.line(), inner.column());
        let reason = summarize(&inner.to_string());

        let location = if path.is_empty() || path == "." {
            String::new()
        } else {
            format!("at `{path}`: ")
        };

        anyhow::anyhow!(
            "{location}{reason} (line {line} col {column})\n{}",
            excerpt(body, line, column)
        )
    })
}

/// Reduce a serde_json message to its reason, e.g.
/// `invalid type: null, expected a string at line 3 column 9` becomes
/// `expected a string, got null`.
fn summarize(message: &str) -> String {
    let reason = match message.rfind(" at line ") {
        Some(idx) => &message[..idx],
        None => message,
    };

    if let Some(rest) = reason.strip_prefix("invalid type: ")
        && let Some((actual, expected)) = rest.split_once(", expected ")
    {
        return format!("expected {expected}, got {actual}");
    }

    reason.to_string()
}

/// Excerpt of `line` (1-based) centered on `column` (1-based), with a caret
/// under the failing character. Works on characters, not bytes, so multibyte
/// titles never split mid-codepoint.
fn excerpt(body: &str, line: usize, column: usize) -> String {
    let target: Vec<char> = body
        .lines()
        .nth(line.saturating_sub(1))
        .unwrap_or("")
        .chars()
        .collect();
    if target.is_empty() {
        return "(empty line)".to_string();
    }

    let error_idx = column.saturating_sub(1).min(target.len() - 1);
    let start = error_idx.saturating_sub(EXCERPT_WIDTH / 2);
    let end = (error_idx + EXCERPT_WIDTH / 2).min(target.len());

    let slice: String = target[start..end].iter().collect();
    let caret = " ".repeat(error_idx - start) + "^";
    format!("...{slice}...\n   {caret}")
}
