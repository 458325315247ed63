//! The assembled Markdown document shared by both stages.
//!
//! Stage 1 writes it, stage 2 reads it back. The layout is:
//!
//! ```text
//! # report.pdf
//! **Pages:** 3 | **Date:** 2026-01-31 14:05:09
//!
//! ---
//!
//! ## Page 1
//!
//! <text>
//!
//! ---
//!
//! ## Page 2
//!
//! [Extraction failed: Page 2: extraction call timed out after 120s]
//!
//! ---
//! ```
//!
//! ## Why `## Page k` headings are the source of truth
//!
//! The header's page count is a claim made by whoever wrote the file. The
//! chunker needs the real count, so [`AssembledDocument::parse`] counts the
//! `## Page k` headings and insists they run 1..N without gaps. Failed pages
//! keep their heading and carry a placeholder body, which is what keeps the
//! count intact when transcription fails. Page text that happens to contain
//! an identical heading line is demoted to `### Page k` on assembly, and
//! text that reads like a placeholder gets a leading `\` so it is not taken
//! for a failure when read back. Windows line endings are accepted.

use crate::error::Pdf2RulesError;
use crate::output::PageResult;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::warn;

const MISSING_PLACEHOLDER: &str = "[Missing]";
const FAILED_PREFIX: &str = "[Extraction failed: ";

static RE_PAGE_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^## Page (\d+)[ \t]*$").unwrap());

static RE_TITLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^# (.+?)[ \t]*$").unwrap());

static RE_META: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\*\*Pages:\*\*\s*(\d+)\s*\|\s*\*\*Date:\*\*\s*(.*?)[ \t]*$").unwrap()
});

/// Timestamp format used in the document header.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Current local time in [`DATE_FORMAT`].
pub fn timestamp_now() -> String {
    chrono::Local::now().format(DATE_FORMAT).to_string()
}

/// Metadata written above the first page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentHeader {
    pub source_name: String,
    /// Page count claimed by the header. Informational only.
    pub declared_pages: Option<usize>,
    pub generated_at: String,
}

impl DocumentHeader {
    pub fn new(source_name: impl Into<String>, pages: usize) -> Self {
        Self {
            source_name: source_name.into(),
            declared_pages: Some(pages),
            generated_at: timestamp_now(),
        }
    }

    pub fn with_timestamp(mut self, generated_at: impl Into<String>) -> Self {
        self.generated_at = generated_at.into();
        self
    }
}

/// How a page's body came to be.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PageStatus {
    Extracted,
    Failed { reason: String },
    /// No result at all was produced for this page.
    Missing,
}

/// One `## Page k` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentPage {
    pub page_num: usize,
    /// Section body as written, placeholders included.
    pub text: String,
    pub status: PageStatus,
}

impl DocumentPage {
    pub fn extracted(page_num: usize, text: impl Into<String>) -> Self {
        Self {
            page_num,
            text: text.into(),
            status: PageStatus::Extracted,
        }
    }

    pub fn failed(page_num: usize, reason: impl Into<String>) -> Self {
        let reason = single_line(&reason.into());
        Self {
            page_num,
            text: format!("{FAILED_PREFIX}{reason}]"),
            status: PageStatus::Failed { reason },
        }
    }

    pub fn missing(page_num: usize) -> Self {
        Self {
            page_num,
            text: MISSING_PLACEHOLDER.to_string(),
            status: PageStatus::Missing,
        }
    }

    pub fn is_extracted(&self) -> bool {
        self.status == PageStatus::Extracted
    }

    /// Recover the status from a section body read back from disk.
    fn from_body(page_num: usize, body: &str) -> Self {
        if body == MISSING_PLACEHOLDER {
            return Self::missing(page_num);
        }
        if let Some(reason) = body
            .strip_prefix(FAILED_PREFIX)
            .and_then(|rest| rest.strip_suffix(']'))
        {
            if !reason.contains('\n') {
                return Self::failed(page_num, reason);
            }
        }
        Self::extracted(page_num, body)
    }
}

/// An ordered, gap-free sequence of page sections plus header metadata.
///
/// Invariant: `pages[i].page_num == i + 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssembledDocument {
    pub header: DocumentHeader,
    pub pages: Vec<DocumentPage>,
}

impl AssembledDocument {
    /// Build a document of `total_pages` sections from stage-1 results.
    ///
    /// `results` may arrive in any order; pages without a result become
    /// `[Missing]`, failed pages become `[Extraction failed: …]`.
    pub fn assemble(header: DocumentHeader, total_pages: usize, results: &[PageResult]) -> Self {
        let mut slots: Vec<Option<&PageResult>> = vec![None; total_pages];
        for r in results {
            match r.page_num.checked_sub(1).and_then(|i| slots.get_mut(i)) {
                Some(slot) => *slot = Some(r),
                None => warn!(
                    "Dropping result for page {} outside 1-{}",
                    r.page_num, total_pages
                ),
            }
        }

        let pages = slots
            .into_iter()
            .enumerate()
            .map(|(i, slot)| {
                let page_num = i + 1;
                match slot {
                    None => DocumentPage::missing(page_num),
                    Some(PageResult {
                        error: Some(e), ..
                    }) => DocumentPage::failed(page_num, e.to_string()),
                    Some(r) => DocumentPage::extracted(page_num, sanitize_page_text(&r.markdown)),
                }
            })
            .collect();

        Self { header, pages }
    }

    /// True page count, from the sections.
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn failed_pages(&self) -> impl Iterator<Item = &DocumentPage> {
        self.pages.iter().filter(|p| !p.is_extracted())
    }

    /// Serialize to the on-disk Markdown layout.
    pub fn to_markdown(&self) -> String {
        let declared = self.header.declared_pages.unwrap_or(self.pages.len());
        let mut out = format!(
            "# {}\n**Pages:** {} | **Date:** {}\n\n---\n\n",
            self.header.source_name, declared, self.header.generated_at
        );
        for page in &self.pages {
            out.push_str(&format!("## Page {}\n\n{}\n\n---\n\n", page.page_num, page.text));
        }
        out
    }

    /// Parse a Markdown document written by [`Self::to_markdown`].
    ///
    /// `source_name` names the input in errors and stands in for the title
    /// when the header has none.
    ///
    /// # Errors
    /// - [`Pdf2RulesError::EmptyDocument`] when there are no page sections.
    /// - [`Pdf2RulesError::MalformedDocument`] when the sections are not
    ///   numbered 1..N in order.
    pub fn parse(source_name: &str, markdown: &str) -> Result<Self, Pdf2RulesError> {
        let markdown = markdown.replace("\r\n", "\n");
        let markdown = markdown.as_str();
        let headings: Vec<(usize, usize, usize)> = RE_PAGE_HEADING
            .captures_iter(markdown)
            .filter_map(|c| {
                let m = c.get(0)?;
                let n = c[1].parse::<usize>().ok()?;
                Some((n, m.start(), m.end()))
            })
            .collect();

        if headings.is_empty() {
            return Err(Pdf2RulesError::EmptyDocument {
                source_name: source_name.to_string(),
            });
        }

        let mut pages = Vec::with_capacity(headings.len());
        for (i, &(page_num, _, body_start)) in headings.iter().enumerate() {
            let expected = i + 1;
            if page_num != expected {
                return Err(Pdf2RulesError::MalformedDocument {
                    source_name: source_name.to_string(),
                    detail: format!("expected '## Page {expected}', found '## Page {page_num}'"),
                });
            }
            let body_end = headings
                .get(i + 1)
                .map(|&(_, start, _)| start)
                .unwrap_or(markdown.len());
            pages.push(DocumentPage::from_body(
                page_num,
                section_body(&markdown[body_start..body_end]),
            ));
        }

        let preamble = &markdown[..headings[0].1];
        let header = parse_header(source_name, preamble);
        if let Some(declared) = header.declared_pages {
            if declared != pages.len() {
                warn!(
                    "'{}' declares {} pages but has {} page sections; using {}",
                    source_name,
                    declared,
                    pages.len(),
                    pages.len()
                );
            }
        }

        Ok(Self { header, pages })
    }
}

fn parse_header(source_name: &str, preamble: &str) -> DocumentHeader {
    let title = RE_TITLE
        .captures(preamble)
        .map(|c| c[1].to_string())
        .unwrap_or_else(|| source_name.to_string());
    let (declared_pages, generated_at) = match RE_META.captures(preamble) {
        Some(c) => (c[1].parse().ok(), c[2].to_string()),
        None => (None, String::new()),
    };
    DocumentHeader {
        source_name: title,
        declared_pages,
        generated_at,
    }
}

/// Strip surrounding blank lines and the trailing `---` separator.
fn section_body(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed
        .strip_suffix("---")
        .map(str::trim_end)
        .unwrap_or(trimmed)
}

/// Demote lines that would be mistaken for section headings, and escape a
/// body that would read back as a placeholder.
pub fn sanitize_page_text(text: &str) -> String {
    let text = RE_PAGE_HEADING.replace_all(text.trim(), "### Page $1");
    if text == MISSING_PLACEHOLDER || text.starts_with(FAILED_PREFIX) {
        return format!("\\{text}");
    }
    text.into_owned()
}

fn single_line(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
