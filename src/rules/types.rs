//! Rule records and the per-window / consolidated result shapes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single page or an inclusive page range, 1-indexed.
///
/// Invariant: `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageRef {
    pub start: usize,
    pub end: usize,
}

impl PageRef {
    pub fn single(page: usize) -> Self {
        Self {
            start: page,
            end: page,
        }
    }

    /// Build a range; returns `None` when `start > end` or either is zero.
    pub fn range(start: usize, end: usize) -> Option<Self> {
        if start == 0 || start > end {
            None
        } else {
            Some(Self { start, end })
        }
    }

    pub fn is_single(&self) -> bool {
        self.start == self.end
    }

    /// The smallest reference covering both `self` and `other`.
    pub fn cover(&self, other: &PageRef) -> PageRef {
        PageRef {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// True when every page of `self` lies within `[start, end]`.
    pub fn within(&self, start: usize, end: usize) -> bool {
        self.start >= start && self.end <= end
    }
}

impl fmt::Display for PageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single() {
            write!(f, "Page {}", self.start)
        } else {
            write!(f, "Page {}-{}", self.start, self.end)
        }
    }
}

/// What kind of directive a rule is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleCategory {
    Rule,
    Guideline,
    Constraint,
    Instruction,
}

impl RuleCategory {
    /// Map a rule-line label (case-insensitive) to a category.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.to_ascii_lowercase().as_str() {
            "rule" => Some(Self::Rule),
            "guideline" => Some(Self::Guideline),
            "constraint" | "requirement" => Some(Self::Constraint),
            "instruction" => Some(Self::Instruction),
            _ => None,
        }
    }
}

impl fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Rule => "rule",
            Self::Guideline => "guideline",
            Self::Constraint => "constraint",
            Self::Instruction => "instruction",
        };
        f.write_str(s)
    }
}

/// One extracted rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleRecord {
    pub page_ref: PageRef,
    pub text: String,
    pub category: Option<RuleCategory>,
}

impl RuleRecord {
    pub fn new(page_ref: PageRef, text: impl Into<String>) -> Self {
        Self {
            page_ref,
            text: text.into(),
            category: None,
        }
    }

    pub fn with_category(mut self, category: RuleCategory) -> Self {
        self.category = Some(category);
        self
    }
}

impl fmt::Display for RuleRecord {
    /// `[Page p] Rule: <text>` / `[Page p1-p2] Rule: <text>`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] Rule: {}", self.page_ref, self.text)
    }
}

/// What one extraction call produced for one window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleExtractionResult {
    pub summary: String,
    pub rules: Vec<RuleRecord>,
    pub observations: Vec<String>,
    pub notes: String,
}

impl RuleExtractionResult {
    pub fn is_empty(&self) -> bool {
        self.summary.is_empty()
            && self.rules.is_empty()
            && self.observations.is_empty()
            && self.notes.is_empty()
    }
}

/// The final, deduplicated result of a rule-extraction run.
///
/// Built once by [`crate::rules::consolidate::consolidate`] and serialised
/// with [`ConsolidatedReport::to_text`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolidatedReport {
    pub summary: String,
    /// Ordered by first page reference.
    pub rules: Vec<RuleRecord>,
    pub observations: Vec<String>,
    pub notes: Vec<String>,
}
