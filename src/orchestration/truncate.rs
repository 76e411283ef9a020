//! Output truncation and preview helpers.
//!
//! Truncation never splits a line: the result either is the whole input or
//! ends exactly after a newline that lies within both budgets.

use super::types::OutputMeta;

/// Truncate `output` to at most `max_bytes` bytes and `max_lines` lines.
///
/// Returns the kept text and whether anything was dropped. When the first
/// line alone exceeds the byte budget nothing can be kept whole, so the
/// result is empty and flagged as truncated; the full text survives in the
/// output artifact.
pub fn truncate_output(output: &str, max_bytes: usize, max_lines: usize) -> (String, bool) {
    let line_count = count_lines(output);
    if output.len() <= max_bytes && line_count <= max_lines {
        return (output.to_string(), false);
    }

    let mut cut = 0;
    let mut lines = 0;
    for (pos, byte) in output.bytes().enumerate() {
        if byte != b'\n' {
            continue;
        }
        let end = pos + 1;
        if end > max_bytes || lines >= max_lines {
            break;
        }
        cut = end;
        lines += 1;
    }

    (output[..cut].to_string(), true)
}

/// Number of lines, counting a trailing unterminated fragment as a line.
pub fn count_lines(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    let newlines = text.bytes().filter(|b| *b == b'\n').count();
    if text.ends_with('\n') {
        newlines
    } else {
        newlines + 1
    }
}

pub fn output_meta(text: &str) -> OutputMeta {
    OutputMeta {
        line_count: count_lines(text),
        byte_count: text.len(),
    }
}

/// Last `n` non-empty lines of `text`, oldest first.
pub fn tail_lines(text: &str, n: usize) -> Vec<String> {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].iter().map(|l| l.to_string()).collect()
}

/// First `n` lines of `text` plus how many more there were.
pub fn preview_lines(text: &str, n: usize) -> (Vec<&str>, usize) {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return (Vec::new(), 0);
    }
    let all: Vec<&str> = trimmed.lines().collect();
    let shown = all.len().min(n);
    (all[..shown].to_vec(), all.len() - shown)
}

/// Shorten a single-line preview to `max_chars` characters, appending "...".
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    let mut chars = s.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn small_output_is_untouched() {
        assert_eq!(truncate_output("a\nb", 100, 100), ("a\nb".to_string(), false));
    }

    #[test]
    fn cuts_at_last_newline_within_byte_budget() {
        let (out, truncated) = truncate_output("aaaa\nbbbb\ncccc\n", 12, 100);
        assert!(truncated);
        assert_eq!(out, "aaaa\nbbbb\n");
    }

    #[test]
    fn cuts_at_line_budget() {
        let (out, truncated) = truncate_output("1\n2\n3\n4\n", 1000, 2);
        assert!(truncated);
        assert_eq!(out, "1\n2\n");
    }

    #[test]
    fn oversized_first_line_keeps_nothing() {
        let (out, truncated) = truncate_output("abcdefghij", 4, 10);
        assert!(truncated);
        assert_eq!(out, "");
    }

    #[test]
    fn multibyte_text_is_cut_on_line_boundary() {
        let text = "héllo\nwörld\nçava\n";
        let (out, truncated) = truncate_output(text, 10, 10);
        assert!(truncated);
        assert_eq!(out, "héllo\n");
    }

    #[test]
    fn count_lines_handles_trailing_fragment() {
        assert_eq!(count_lines(""), 0);
        assert_eq!(count_lines("a"), 1);
        assert_eq!(count_lines("a\n"), 1);
        assert_eq!(count_lines("a\nb"), 2);
    }

    #[test]
    fn tail_lines_skips_blank_lines() {
        let tail = tail_lines("one\n\ntwo\nthree\n", 2);
        assert_eq!(tail, vec!["two".to_string(), "three".to_string()]);
    }

    #[test]
    fn preview_reports_remaining_count() {
        let (shown, more) = preview_lines("1\n2\n3\n4\n5\n6\n7", 5);
        assert_eq!(shown.len(), 5);
        assert_eq!(more, 2);
    }

    #[test]
    fn truncate_chars_is_char_safe() {
        assert_eq!(truncate_chars("ééééé", 3), "ééé...");
        assert_eq!(truncate_chars("abc", 3), "abc");
    }

    proptest! {
        #[test]
        fn truncated_output_ends_on_line_boundary(
            text in "[a-zé\n]{0,400}",
            max_bytes in 0usize..300,
            max_lines in 0usize..30,
        ) {
            let (out, truncated) = truncate_output(&text, max_bytes, max_lines);
            if truncated {
                prop_assert!(out.is_empty() || out.ends_with('\n'));
                prop_assert!(out.len() <= max_bytes);
                prop_assert!(count_lines(&out) <= max_lines);
                prop_assert!(text.starts_with(&out));
            } else {
                prop_assert_eq!(out, text);
            }
        }
    }
}
