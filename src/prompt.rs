//! Prompt assembly for the first attempt and for corrective retries.

use std::fmt::Write;

use crate::{models::GenerationAttempt, schema::Schema};

/// Longest slice of a previous response echoed back in a corrective prompt.
const MAX_ECHOED_OUTPUT: usize = 4000;

/// Format instructions appended to every prompt.
pub fn format_instructions(schema: &Schema) -> String {
    let mut out = String::from(
        "Respond with a single JSON object and nothing else: no prose, no Markdown code fences.\n",
    );
    match schema.title() {
        Some(title) => {
            let _ = writeln!(out, "The object describes a {title} and must have these fields:");
        }
        None => out.push_str("The object must have these fields:\n"),
    }
    let _ = write!(out, "{schema}");
    out.push_str("Fields not listed above are allowed but not needed.");
    out
}

/// Prompt for the first attempt.
pub fn initial_prompt(instruction: &str, schema: &Schema) -> String {
    format!(
        "{}\n\n{}",
        instruction.trim(),
        format_instructions(schema)
    )
}

/// Prompt for a retry after `failed` produced output that did not validate.
///
/// Echoes the previous output and lists every violation so the model can fix
/// them all in one go.
pub fn corrective_prompt(instruction: &str, schema: &Schema, failed: &GenerationAttempt) -> String {
    let mut out = initial_prompt(instruction, schema);
    out.push_str("\n\nYour previous response was:\n");
    let previous = failed.raw_output.as_deref().unwrap_or_default();
    out.push_str(truncate(previous, MAX_ECHOED_OUTPUT));
    out.push_str("\n\nIt did not satisfy the required format:\n");
    for violation in failed.violations() {
        let _ = writeln!(out, "- {violation}");
    }
    out.push_str("Return a corrected JSON object that fixes every problem listed above.");
    out
}

fn truncate(text: &str, max_len: usize) -> &str {
    if text.len() <= max_len {
        return text;
    }
    let mut end = max_len;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
