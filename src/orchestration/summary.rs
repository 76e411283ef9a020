//! Caller-visible text summary of a finished batch.

use std::fmt::Write;

use super::truncate::preview_lines;
use super::types::{AgentStatus, SingleResult};

/// Lines of output shown per task.
const PREVIEW_LINES: usize = 5;

/// Render the summary returned as the orchestration call's content.
///
/// `skipped` counts tasks removed by the self-recursion guard.
pub fn summarize(results: &[SingleResult], skipped: usize) -> String {
    let total = results.len();
    let succeeded = results.iter().filter(|r| r.succeeded()).count();

    let mut out = format!("{succeeded}/{total} succeeded");
    if skipped > 0 {
        let _ = write!(
            out,
            " ({skipped} skipped: an agent cannot spawn itself)"
        );
    }
    out.push('\n');

    for result in results {
        out.push('\n');
        write_result(&mut out, result);
    }

    if results.iter().any(|r| r.artifacts.is_some()) {
        out.push_str(
            "\nFull outputs are stored per task; fetch one with \
             `fanout output <id>` (add `--lines a:b` for a range).\n",
        );
    }
    out
}

fn write_result(out: &mut String, result: &SingleResult) {
    let status = result.status();
    let _ = write!(out, "[{}] {} ({})", status.as_str(), result.id, result.agent);
    if !result.description.is_empty() {
        let _ = write!(out, ": {}", result.description);
    }
    out.push('\n');

    if status == AgentStatus::Failed || status == AgentStatus::Aborted {
        let detail = if result.stderr.trim().is_empty() {
            result.error.as_deref().unwrap_or_default()
        } else {
            result.stderr.as_str()
        };
        if !detail.trim().is_empty() {
            let _ = writeln!(out, "  error: {}", detail.trim());
        }
    }

    let (lines, remaining) = preview_lines(&result.output, PREVIEW_LINES);
    if lines.is_empty() && status == AgentStatus::Completed {
        out.push_str("  (no output)\n");
    }
    for line in lines {
        let _ = writeln!(out, "  {line}");
    }
    if remaining > 0 {
        let _ = writeln!(out, "  ... {remaining} more lines");
    }

    if result.truncated {
        match &result.output_meta {
            Some(meta) => {
                let _ = writeln!(
                    out,
                    "  (output truncated; full output has {} lines, {} bytes)",
                    meta.line_count, meta.byte_count
                );
            }
            None => out.push_str("  (output truncated)\n"),
        }
    }

    let _ = writeln!(out, "  Output: agent://{}", result.output_id());
}
