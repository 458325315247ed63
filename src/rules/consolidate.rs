//! Merge per-window results into one report, and serialize it.
//!
//! ## Merge policy
//!
//! Consecutive windows share `overlap` pages, so a rule printed on a shared
//! page is extracted twice. Two rules are the same rule when their texts
//! match after lower-casing, collapsing whitespace and dropping a trailing
//! `.` or `;`. The merged record keeps the first-seen text, takes the first
//! category any copy carried, and cites the smallest page range covering
//! every copy. Rules are then ordered by first page, ties in first-seen
//! order.
//!
//! Summaries are labelled with their window's page span and joined.
//! Observations and notes are narrative, so they are concatenated as-is.
//! A failed window contributes nothing except a note naming the failure.
//!
//! A single window is passed through untouched.

use crate::output::WindowOutcome;
use crate::prompts::{SECTION_NOTES, SECTION_OBSERVATIONS, SECTION_RULES, SECTION_SUMMARY};
use crate::rules::types::{ConsolidatedReport, RuleRecord};
use std::collections::HashMap;
use std::fmt::Write as _;

const BANNER_WIDTH: usize = 70;
const EMPTY_SECTION: &str = "None.";

/// Build the final report from window outcomes in window order.
pub fn consolidate(outcomes: &[WindowOutcome]) -> ConsolidatedReport {
    if let [only] = outcomes {
        // Passed through without merging, only put in page order.
        let mut rules = only.result.rules.clone();
        rules.sort_by_key(|r| r.page_ref.start);
        return ConsolidatedReport {
            summary: only.result.summary.clone(),
            rules,
            observations: only.result.observations.clone(),
            notes: window_notes(only),
        };
    }

    let mut report = ConsolidatedReport::default();

    report.summary = outcomes
        .iter()
        .filter(|o| !o.result.summary.is_empty())
        .map(|o| {
            format!(
                "Pages {}-{}: {}",
                o.window.start, o.window.end, o.result.summary
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    report.rules = merge_rules(outcomes.iter().flat_map(|o| o.result.rules.iter()));

    for o in outcomes {
        report.observations.extend(o.result.observations.iter().cloned());
        report.notes.extend(window_notes(o));
    }

    report
}

/// Collapse duplicate rules and order the survivors by first page.
pub fn merge_rules<'a>(rules: impl IntoIterator<Item = &'a RuleRecord>) -> Vec<RuleRecord> {
    let mut merged: Vec<RuleRecord> = Vec::new();
    let mut by_key: HashMap<String, usize> = HashMap::new();

    for rule in rules {
        match by_key.get(&duplicate_key(&rule.text)) {
            Some(&i) => {
                let existing = &mut merged[i];
                existing.page_ref = existing.page_ref.cover(&rule.page_ref);
                if existing.category.is_none() {
                    existing.category = rule.category;
                }
            }
            None => {
                by_key.insert(duplicate_key(&rule.text), merged.len());
                merged.push(rule.clone());
            }
        }
    }

    // `sort_by_key` is stable, so ties keep first-seen order.
    merged.sort_by_key(|r| r.page_ref.start);
    merged
}

/// Normalised rule text used to detect duplicates.
pub fn duplicate_key(text: &str) -> String {
    let collapsed = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    collapsed
        .trim_end_matches(['.', ';'])
        .trim_end()
        .to_string()
}

fn window_notes(outcome: &WindowOutcome) -> Vec<String> {
    let mut notes = Vec::new();
    if !outcome.result.notes.is_empty() {
        notes.push(outcome.result.notes.clone());
    }
    if let Some(err) = &outcome.error {
        let w = &outcome.window;
        notes.push(format!(
            "Window {} (pages {}-{}) failed: {}",
            w.number(),
            w.start,
            w.end,
            err
        ));
    }
    notes
}

impl ConsolidatedReport {
    /// The four-section text layout.
    pub fn to_text(&self) -> String {
        let mut out = String::new();

        section(&mut out, SECTION_SUMMARY, &self.summary);

        let rules = self
            .rules
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n");
        section(&mut out, SECTION_RULES, &rules);

        section(&mut out, SECTION_OBSERVATIONS, &self.observations.join("\n"));
        section(&mut out, SECTION_NOTES, &self.notes.join("\n\n"));

        out.truncate(out.trim_end().len());
        out.push('\n');
        out
    }
}

fn section(out: &mut String, heading: &str, body: &str) {
    let body = body.trim();
    let body = if body.is_empty() { EMPTY_SECTION } else { body };
    let _ = write!(out, "{heading}:\n{body}\n\n");
}

/// The rules report file: a banner naming the input, then the report.
pub fn render_report(
    source: &str,
    total_pages: usize,
    strategy: &str,
    report: &ConsolidatedReport,
) -> String {
    let rule = "=".repeat(BANNER_WIDTH);
    format!(
        "{rule}\nRULE EXTRACTION RESULTS\nSource Markdown: {source}\nTotal Pages: {total_pages}\nStrategy: {strategy}\n{rule}\n\n{}",
        report.to_text()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WindowError;
    use crate::output::TokenUsage;
    use crate::rules::types::{PageRef, RuleCategory, RuleExtractionResult};
    use crate::rules::window::Window;

    fn window(index: usize, start: usize, end: usize, overlap: usize) -> Window {
        Window {
            index,
            start,
            end,
            overlap,
        }
    }

    fn outcome(w: Window, summary: &str, rules: Vec<RuleRecord>) -> WindowOutcome {
        WindowOutcome {
            window: w,
            result: RuleExtractionResult {
                summary: summary.to_string(),
                rules,
                observations: vec![],
                notes: String::new(),
            },
            error: None,
            usage: TokenUsage::default(),
            retries: 0,
            duration_ms: 0,
        }
    }

    fn rule(start: usize, end: usize, text: &str) -> RuleRecord {
        RuleRecord::new(PageRef::range(start, end).unwrap(), text)
    }

    #[test]
    fn overlap_duplicate_collapses_to_one_record() {
        let a = outcome(
            window(0, 1, 10, 0),
            "First part.",
            vec![rule(2, 2, "Badge in."), rule(9, 9, "Lock the gate.")],
        );
        let b = outcome(
            window(1, 9, 18, 2),
            "Second part.",
            vec![rule(9, 10, "lock the  gate"), rule(15, 15, "Log visitors.")],
        );
        let report = consolidate(&[a, b]);

        assert_eq!(report.rules.len(), 3);
        let gate = &report.rules[1];
        assert_eq!(gate.text, "Lock the gate.");
        assert_eq!(gate.page_ref, PageRef::range(9, 10).unwrap());
        assert_eq!(
            report.summary,
            "Pages 1-10: First part.\n\nPages 9-18: Second part."
        );
    }

    #[test]
    fn identical_rule_on_same_page_is_kept_once() {
        let a = outcome(window(0, 1, 10, 0), "", vec![rule(9, 9, "Wear boots.")]);
        let b = outcome(window(1, 9, 18, 2), "", vec![rule(9, 9, "Wear boots.")]);
        let report = consolidate(&[a, b]);
        assert_eq!(report.rules, vec![rule(9, 9, "Wear boots.")]);
    }

    #[test]
    fn no_duplicates_means_no_change() {
        let pool = vec![
            rule(12, 12, "C"),
            rule(1, 1, "A"),
            rule(5, 6, "B"),
            rule(5, 5, "B2"),
        ];
        let merged = merge_rules(&pool);
        assert_eq!(merged.len(), pool.len());
        for r in &pool {
            assert!(merged.contains(r));
        }
        // Second pass is a no-op.
        assert_eq!(merge_rules(&merged), merged);
        // Ordered by first page, ties first-seen.
        assert_eq!(
            merged.iter().map(|r| r.text.as_str()).collect::<Vec<_>>(),
            vec!["A", "B", "B2", "C"]
        );
    }

    #[test]
    fn first_category_wins() {
        let pool = vec![
            rule(3, 3, "Keep exits clear."),
            rule(4, 4, "keep exits clear").with_category(RuleCategory::Constraint),
            rule(4, 4, "Keep exits clear;").with_category(RuleCategory::Guideline),
        ];
        let merged = merge_rules(&pool);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].category, Some(RuleCategory::Constraint));
        assert_eq!(merged[0].page_ref, PageRef::range(3, 4).unwrap());
    }

    #[test]
    fn single_window_passes_through() {
        let mut only = outcome(
            window(0, 1, 1, 0),
            "One page.",
            vec![rule(1, 1, "Z rule"), rule(1, 1, "z rule.")],
        );
        only.result.observations = vec!["obs".into()];
        only.result.notes = "note".into();
        let report = consolidate(std::slice::from_ref(&only));
        assert_eq!(report.summary, "One page.");
        assert_eq!(report.rules, only.result.rules);
        assert_eq!(report.observations, vec!["obs".to_string()]);
        assert_eq!(report.notes, vec!["note".to_string()]);
    }

    #[test]
    fn single_window_rules_are_put_in_page_order() {
        let only = outcome(
            window(0, 1, 5, 0),
            "Five pages.",
            vec![
                rule(4, 4, "Later rule."),
                rule(2, 3, "Earlier rule."),
                rule(4, 4, "later rule"),
            ],
        );
        let report = consolidate(std::slice::from_ref(&only));
        let starts: Vec<usize> = report.rules.iter().map(|r| r.page_ref.start).collect();
        assert_eq!(starts, vec![2, 4, 4]);
        assert_eq!(report.rules[1].text, "Later rule.");
        assert_eq!(report.rules[2].text, "later rule");
    }

    #[test]
    fn failed_window_adds_note_only() {
        let ok = outcome(window(0, 1, 10, 0), "Fine.", vec![rule(1, 1, "A")]);
        let failed = WindowOutcome::failed(
            window(1, 9, 18, 2),
            WindowError::Timeout { secs: 180 },
            0,
        );
        let report = consolidate(&[ok, failed]);
        assert_eq!(report.rules.len(), 1);
        assert_eq!(report.summary, "Pages 1-10: Fine.");
        assert_eq!(
            report.notes,
            vec!["Window 2 (pages 9-18) failed: extraction call timed out after 180s".to_string()]
        );
    }

    #[test]
    fn observations_are_concatenated_not_deduplicated() {
        let mut a = outcome(window(0, 1, 10, 0), "", vec![]);
        a.result.observations = vec!["same".into()];
        let mut b = outcome(window(1, 9, 18, 2), "", vec![]);
        b.result.observations = vec!["same".into()];
        let report = consolidate(&[a, b]);
        assert_eq!(report.observations, vec!["same", "same"]);
    }

    #[test]
    fn text_layout() {
        let report = ConsolidatedReport {
            summary: "A manual.".into(),
            rules: vec![rule(3, 3, "Wear gloves."), rule(4, 6, "No food.")],
            observations: vec![],
            notes: vec!["n1".into()],
        };
        assert_eq!(
            report.to_text(),
            "DOCUMENT SUMMARY:\nA manual.\n\n\
             EXTRACTED RULES:\n[Page 3] Rule: Wear gloves.\n[Page 4-6] Rule: No food.\n\n\
             CROSS-PAGE OBSERVATIONS:\nNone.\n\n\
             NOTES:\nn1\n"
        );
    }

    #[test]
    fn report_banner() {
        let text = render_report(
            "out/doc.md",
            25,
            "sliding-window (3 windows)",
            &ConsolidatedReport::default(),
        );
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "=".repeat(70));
        assert_eq!(lines[1], "RULE EXTRACTION RESULTS");
        assert_eq!(lines[2], "Source Markdown: out/doc.md");
        assert_eq!(lines[3], "Total Pages: 25");
        assert_eq!(lines[4], "Strategy: sliding-window (3 windows)");
        assert_eq!(lines[5], "=".repeat(70));
        assert_eq!(lines[7], "DOCUMENT SUMMARY:");
        assert_eq!(lines[8], "None.");
    }
}
