//! Post-processing: deterministic cleanup of model-generated text.
//!
//! ## Why is post-processing necessary?
//!
//! Even well-prompted models occasionally add artefacts that are harmless to
//! a reader but get in the way of the assembled document:
//!
//! - wrapping the answer in ` ```markdown ... ``` ` fences despite the prompt
//! - echoing the printed page number or a running footer as its own line
//! - inventing `![figure](image.png)` links for figures that have no file
//! - CRLF line endings and zero-width characters
//!
//! These rules are cheap, pure `&str → String` passes applied in a fixed
//! order: fences first (they wrap everything), then line-level passes, then
//! blank-line collapsing once lines have been removed.
//!
//! [`strip_markdown_fences`] is also applied to rule-extraction answers
//! before they are parsed.

use once_cell::sync::Lazy;
use regex::Regex;

/// Clean one page transcription.
///
/// The result has no leading or trailing blank lines.
pub fn clean_markdown(input: &str) -> String {
    let s = strip_markdown_fences(input);
    let s = normalise_line_endings(&s);
    let s = remove_invisible_chars(&s);
    let s = trim_trailing_whitespace(&s);
    let s = drop_page_number_lines(&s);
    let s = remove_hallucinated_images(&s);
    collapse_blank_lines(&s).trim().to_string()
}

// ── Outer fences ─────────────────────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)^```(?:markdown|md|text|txt)?[ \t]*\r?\n(.*?)\r?\n```\s*$").unwrap()
});

/// Remove a single code fence wrapping the whole answer, if present.
pub fn strip_markdown_fences(input: &str) -> String {
    match RE_OUTER_FENCES.captures(input.trim()) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

// ── Line endings and invisible characters ────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Page numbers ─────────────────────────────────────────────────────────

/// `Page 3`, `Page 3 of 12`, `- 3 -`, `3`, `3/12`
static RE_PAGE_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:page\s+\d+(?:\s+of\s+\d+)?|-\s*\d+\s*-|\d+(?:\s*/\s*\d+)?)\s*$")
        .unwrap()
});

/// Drop a bare page number when it is the first or last non-blank line.
///
/// Numbers in the middle of a page are left alone: they may be content.
fn drop_page_number_lines(input: &str) -> String {
    let mut lines: Vec<&str> = input.lines().collect();

    if let Some(last) = lines.iter().rposition(|l| !l.trim().is_empty()) {
        if RE_PAGE_NUMBER.is_match(lines[last]) {
            lines.remove(last);
        }
    }
    if let Some(first) = lines.iter().position(|l| !l.trim().is_empty()) {
        if RE_PAGE_NUMBER.is_match(lines[first]) {
            lines.remove(first);
        }
    }

    lines.join("\n")
}

// ── Hallucinated images ──────────────────────────────────────────────────
//
// A page image has no addressable sub-images, so any `![alt](url)` whose url
// is not an absolute http(s) link was made up. Keep the alt text as an
// italic caption so the description is not lost.

static RE_IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[([^\]]*)\]\(([^)]*)\)").unwrap());

const PLACEHOLDER_HOSTS: &[&str] = &[
    "example.com",
    "placeholder.com",
    "dummyimage.com",
    "placehold.it",
];

fn is_real_image_url(url: &str) -> bool {
    let u = url.trim();
    (u.starts_with("http://") || u.starts_with("https://"))
        && !PLACEHOLDER_HOSTS.iter().any(|h| u.contains(h))
}

fn remove_hallucinated_images(input: &str) -> String {
    RE_IMAGE
        .replace_all(input, |caps: &regex::Captures<'_>| {
            let alt = caps[1].trim();
            if is_real_image_url(&caps[2]) {
                caps[0].to_string()
            } else if alt.is_empty() {
                String::new()
            } else {
                format!("*{}*", alt)
            }
        })
        .into_owned()
}

// ── Blank lines ──────────────────────────────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fences_with_and_without_language() {
        assert_eq!(strip_markdown_fences("```markdown\n# Hi\nthere\n```"), "# Hi\nthere");
        assert_eq!(strip_markdown_fences("```\nplain\n```\n"), "plain");
        assert_eq!(strip_markdown_fences("no fences"), "no fences");
    }

    #[test]
    fn inner_fences_are_kept() {
        let input = "Intro\n```\ncode\n```\nOutro";
        assert_eq!(strip_markdown_fences(input), input);
    }

    #[test]
    fn trailing_page_number_is_dropped() {
        let out = clean_markdown("### Safety\n\nWear gloves.\n\nPage 4 of 12\n");
        assert_eq!(out, "### Safety\n\nWear gloves.");
    }

    #[test]
    fn leading_dash_number_is_dropped() {
        assert_eq!(clean_markdown("- 7 -\n\nBody text"), "Body text");
    }

    #[test]
    fn numbers_inside_the_page_are_kept() {
        let input = "Steps:\n\n3\n\nfollow up";
        assert_eq!(clean_markdown(input), input);
    }

    #[test]
    fn fake_image_becomes_caption() {
        let out = clean_markdown("See ![Figure 2: wiring](figure2.png) below");
        assert_eq!(out, "See *Figure 2: wiring* below");
        let keep = "![logo](https://cdn.acme.org/logo.png)";
        assert_eq!(clean_markdown(keep), keep);
    }

    #[test]
    fn whitespace_and_invisible_chars() {
        let out = clean_markdown("a\u{200B}b  \r\n\r\n\r\n\r\nc\t\r\n");
        assert_eq!(out, "ab\n\nc");
    }

    #[test]
    fn fenced_answer_is_fully_cleaned() {
        let out = clean_markdown("```markdown\n### Rules\n\n1. No smoking\n\n12\n```");
        assert_eq!(out, "### Rules\n\n1. No smoking");
    }
}
