//! Strict parser for the rule listing returned by the model.
//!
//! The prompts in [`crate::prompts`] ask for exactly this layout:
//!
//! ```text
//! DOCUMENT SUMMARY:
//! <free text>
//!
//! EXTRACTED RULES:
//! [Page 3] Rule: <text>
//! [Page 4-5] Constraint: <text>
//! [Page 6] INCOMPLETE: <what continues past the window>
//!
//! CROSS-PAGE OBSERVATIONS:
//! <one observation per line>
//!
//! NOTES:
//! <free text>
//! ```
//!
//! Cosmetic noise is tolerated (an outer code fence, `#`/`**` around
//! headings, list markers before rule lines, a number after the label).
//! Anything structural is a [`ParseError`]: text before the first heading,
//! a missing SUMMARY or RULES section, a rule line that does not follow the
//! grammar, or a page reference outside the window that was sent.
//! Headings are only recognised in layout order; anything heading-shaped
//! out of order is kept as text of the current section.

use crate::error::ParseError;
use crate::pipeline::postprocess::strip_markdown_fences;
use crate::prompts::{SECTION_RULES, SECTION_SUMMARY};
use crate::rules::types::{PageRef, RuleCategory, RuleExtractionResult, RuleRecord};
use once_cell::sync::Lazy;
use regex::Regex;

static RE_HEADING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*#{0,6}\s*(?:\*\*)?\s*(document\s+summary|extracted\s+rules|cross[- ]page\s+observations|notes)\s*(?:\*\*)?\s*(?::(?:\s*\*\*)?(.*))?$",
    )
    .unwrap()
});

static RE_RULE_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(?:[-*•]|\d+[.)])?\s*\[\s*pages?\s+(\d+)\s*(?:[-–]\s*(\d+))?\s*\]\s*(?:\*\*)?\s*([a-z]+)(?:\s*#?\d+)?\s*(?:\*\*)?\s*:\s*(?:\*\*)?\s*(\S.*?)\s*$",
    )
    .unwrap()
});

/// A line that starts like a rule line (`[...]`) but whose bracket is not a
/// valid page reference.
static RE_BRACKETED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:[-*•]|\d+[.)])?\s*\[[^\]]*\]").unwrap());

static RE_LIST_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s+").unwrap());

static RE_NONE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(?:[-*•]\s*)?(?:none\.?|n/a\.?)\s*$").unwrap());

const INCOMPLETE_LABEL: &str = "incomplete";

/// Declaration order is the order the layout requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Section {
    Summary,
    Rules,
    Observations,
    Notes,
}

impl Section {
    fn from_heading(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        if lower.starts_with("document") {
            Section::Summary
        } else if lower.starts_with("extracted") {
            Section::Rules
        } else if lower.starts_with("cross") {
            Section::Observations
        } else {
            Section::Notes
        }
    }
}

/// Numbered lines collected under one heading.
#[derive(Default)]
struct SectionBody<'a> {
    seen: bool,
    lines: Vec<(usize, &'a str)>,
}

impl<'a> SectionBody<'a> {
    fn non_blank(&self) -> impl Iterator<Item = (usize, &'a str)> + '_ {
        self.lines
            .iter()
            .copied()
            .filter(|(_, l)| !l.trim().is_empty())
    }

    fn is_none_marker(&self) -> bool {
        let mut it = self.non_blank();
        match (it.next(), it.next()) {
            (None, _) => true,
            (Some((_, l)), None) => RE_NONE.is_match(l),
            _ => false,
        }
    }

    fn text(&self) -> String {
        if self.is_none_marker() {
            return String::new();
        }
        self.lines
            .iter()
            .map(|(_, l)| *l)
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string()
    }
}

/// Parse a model answer for the window `[start, end]`.
pub fn parse_extraction(
    raw: &str,
    start: usize,
    end: usize,
) -> Result<RuleExtractionResult, ParseError> {
    let text = strip_markdown_fences(&raw.replace("\r\n", "\n"));

    let mut summary = SectionBody::default();
    let mut rules = SectionBody::default();
    let mut observations = SectionBody::default();
    let mut notes = SectionBody::default();
    let mut current: Option<Section> = None;

    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;

        if let Some(caps) = RE_HEADING
            .captures(line)
            .filter(|caps| opens_section(caps, current))
        {
            let section = Section::from_heading(&caps[1]);
            let body = match section {
                Section::Summary => &mut summary,
                Section::Rules => &mut rules,
                Section::Observations => &mut observations,
                Section::Notes => &mut notes,
            };
            body.seen = true;
            if let Some(rest) = caps.get(2) {
                let rest = rest.as_str().trim();
                if !rest.is_empty() {
                    body.lines.push((line_no, rest));
                }
            }
            current = Some(section);
            continue;
        }

        match current {
            None if line.trim().is_empty() => {}
            None => {
                return Err(ParseError::UnexpectedText {
                    line: line_no,
                    text: line.trim().to_string(),
                })
            }
            Some(Section::Summary) => summary.lines.push((line_no, line)),
            Some(Section::Rules) => rules.lines.push((line_no, line)),
            Some(Section::Observations) => observations.lines.push((line_no, line)),
            Some(Section::Notes) => notes.lines.push((line_no, line)),
        }
    }

    for (body, name) in [(&summary, SECTION_SUMMARY), (&rules, SECTION_RULES)] {
        if !body.seen {
            return Err(ParseError::MissingSection {
                section: name.to_string(),
            });
        }
    }

    let mut result = RuleExtractionResult {
        summary: summary.text(),
        ..Default::default()
    };

    if !rules.is_none_marker() {
        for (line_no, line) in rules.non_blank() {
            match parse_rule_line(line_no, line, start, end)? {
                RuleLine::Rule(record) => result.rules.push(record),
                RuleLine::Incomplete(observation) => result.observations.push(observation),
            }
        }
    }

    if !observations.is_none_marker() {
        result.observations.extend(
            observations
                .non_blank()
                .map(|(_, l)| RE_LIST_MARKER.replace(l, "").trim().to_string()),
        );
    }

    result.notes = notes.text();
    Ok(result)
}

/// Whether a heading-shaped line starts a new section.
///
/// Sections only move forward, so a repeated or earlier heading is body
/// text. Once inside a section, a mixed-case heading followed by text on
/// the same line (`Notes: see page 4`) is prose, not a heading.
fn opens_section(caps: &regex::Captures<'_>, current: Option<Section>) -> bool {
    let section = Section::from_heading(&caps[1]);
    let Some(current) = current else {
        return true;
    };
    if section <= current {
        return false;
    }
    let inline = caps.get(2).is_some_and(|m| !m.as_str().trim().is_empty());
    !inline || !caps[1].chars().any(char::is_lowercase)
}

enum RuleLine {
    Rule(RuleRecord),
    Incomplete(String),
}

fn parse_rule_line(
    line_no: usize,
    line: &str,
    start: usize,
    end: usize,
) -> Result<RuleLine, ParseError> {
    let Some(caps) = RE_RULE_LINE.captures(line) else {
        return Err(if RE_BRACKETED.is_match(line) {
            ParseError::InvalidPageRef {
                line: line_no,
                text: line.trim().to_string(),
            }
        } else {
            ParseError::MalformedRuleLine {
                line: line_no,
                text: line.trim().to_string(),
            }
        });
    };

    let invalid_ref = || ParseError::InvalidPageRef {
        line: line_no,
        text: line.trim().to_string(),
    };
    let first: usize = caps[1].parse().map_err(|_| invalid_ref())?;
    let last: usize = match caps.get(2) {
        Some(m) => m.as_str().parse().map_err(|_| invalid_ref())?,
        None => first,
    };
    let page_ref = PageRef::range(first, last).ok_or_else(invalid_ref)?;

    if !page_ref.within(start, end) {
        return Err(ParseError::PageOutOfWindow {
            line: line_no,
            reference: page_ref.to_string(),
            start,
            end,
        });
    }

    let label = &caps[3];
    let text = caps[4].trim_end_matches("**").trim().to_string();

    if label.eq_ignore_ascii_case(INCOMPLETE_LABEL) {
        return Ok(RuleLine::Incomplete(format!("{page_ref} (incomplete): {text}")));
    }

    let category = RuleCategory::from_label(label).ok_or_else(|| ParseError::MalformedRuleLine {
        line: line_no,
        text: line.trim().to_string(),
    })?;

    Ok(RuleLine::Rule(
        RuleRecord::new(page_ref, text).with_category(category),
    ))
}
