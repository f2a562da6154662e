//! Quote stripping for inbound email bodies
//!
//! Truncates a reply body at the first quote introduction so only the new
//! content reaches the ticket. This is a line heuristic, not a MIME quote
//! parser; it is documented best-effort and never fails.

use once_cell::sync::Lazy;
use regex::Regex;

static QUOTE_INTRO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^On .* wrote:").expect("valid quote intro regex"));

static SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[-_]{3,}\s*$").expect("valid separator regex"));

/// Strip quoted reply content from a plaintext body.
///
/// Truncates at the first line matching `On .* wrote:`, a line beginning
/// `From:`, or a separator of three or more `-`/`_` characters. Lines
/// beginning with `>` are dropped. The result is trimmed.
pub fn strip_quoted_text(text: &str) -> String {
    let mut kept = Vec::new();

    for line in text.lines() {
        let trimmed = line.trim_start();

        if QUOTE_INTRO.is_match(trimmed)
            || trimmed.starts_with("From:")
            || SEPARATOR.is_match(trimmed)
        {
            break;
        }

        if trimmed.starts_with('>') {
            continue;
        }

        kept.push(line);
    }

    kept.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_on_wrote_intro() {
        let body = "New content\nOn Jan 1 wrote:\n> old content";
        assert_eq!(strip_quoted_text(body), "New content");
    }

    #[test]
    fn test_strips_from_line() {
        let body = "Thanks!\nFrom: Someone <someone@example.com>\nOld message";
        assert_eq!(strip_quoted_text(body), "Thanks!");
    }

    #[test]
    fn test_strips_separator() {
        let body = "Reply here\n-----\nOriginal message below";
        assert_eq!(strip_quoted_text(body), "Reply here");
    }

    #[test]
    fn test_strips_underscore_separator() {
        let body = "Done\n____\nsignature";
        assert_eq!(strip_quoted_text(body), "Done");
    }

    #[test]
    fn test_drops_quoted_lines() {
        let body = "Top\n> quoted\nBottom";
        assert_eq!(strip_quoted_text(body), "Top\nBottom");
    }

    #[test]
    fn test_passthrough_without_quotes() {
        let body = "Just a plain message\nwith two lines";
        assert_eq!(strip_quoted_text(body), body);
    }

    #[test]
    fn test_empty_body() {
        assert_eq!(strip_quoted_text(""), "");
    }

    #[test]
    fn test_all_quoted_yields_empty() {
        assert_eq!(strip_quoted_text("> a\n> b"), "");
    }
}
