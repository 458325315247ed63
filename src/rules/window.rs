//! Document chunking: split an assembled document into page windows.
//!
//! Short documents (at most `threshold` pages) go to the model in one piece.
//! Longer ones are cut into windows of `window_size` pages where consecutive
//! windows share `overlap` pages:
//!
//! ```text
//! N = 25, S = 10, O = 2
//!
//! window 1  [ 1 ........ 10]
//! window 2          [ 9 ........ 18]
//! window 3                  [17 ....... 25]
//!                     ^^ overlap ^^
//! ```
//!
//! Window *k* (0-based) starts at `1 + k·(S−O)`. Planning stops at the first
//! window that reaches page N, so every page is the *new* (non-overlap)
//! content of exactly one window, and a rule crossing a boundary appears in
//! full in at least one window.

use crate::config::{ExtractionConfig, ExtractionStrategy};
use crate::document::AssembledDocument;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;

/// A contiguous span of pages `[start, end]` sent in one extraction call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    /// 0-based position in the plan.
    pub index: usize,
    /// First page, 1-indexed.
    pub start: usize,
    /// Last page, inclusive.
    pub end: usize,
    /// Pages shared with the previous window (0 for the first).
    pub overlap: usize,
}

impl Window {
    /// 1-indexed window number, for logs and reports.
    pub fn number(&self) -> usize {
        self.index + 1
    }

    pub fn page_count(&self) -> usize {
        self.end + 1 - self.start
    }

    pub fn pages(&self) -> RangeInclusive<usize> {
        self.start..=self.end
    }

    /// First page not already covered by the previous window.
    pub fn new_start(&self) -> usize {
        self.start + self.overlap
    }

    /// The pages this window contributes beyond the overlap.
    pub fn new_pages(&self) -> RangeInclusive<usize> {
        self.new_start()..=self.end
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "window {} (pages {}-{})", self.number(), self.start, self.end)
    }
}

/// The strategy actually chosen for a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlannedStrategy {
    SinglePass,
    SlidingWindow,
}

/// The windows for one document, in page order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowPlan {
    pub total_pages: usize,
    pub strategy: PlannedStrategy,
    pub windows: Vec<Window>,
}

impl fmt::Display for WindowPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.strategy {
            PlannedStrategy::SinglePass => f.write_str("single-pass"),
            PlannedStrategy::SlidingWindow => {
                write!(f, "sliding-window ({} windows)", self.windows.len())
            }
        }
    }
}

/// Choose a strategy for `total_pages` and lay out its windows.
///
/// With [`ExtractionStrategy::Auto`] the choice is a pure function of
/// `total_pages` and `config.threshold`.
pub fn plan_windows(total_pages: usize, config: &ExtractionConfig) -> WindowPlan {
    let strategy = match config.strategy {
        ExtractionStrategy::SinglePass => PlannedStrategy::SinglePass,
        ExtractionStrategy::SlidingWindow => PlannedStrategy::SlidingWindow,
        ExtractionStrategy::Auto if total_pages <= config.threshold => PlannedStrategy::SinglePass,
        ExtractionStrategy::Auto => PlannedStrategy::SlidingWindow,
    };

    let windows = match strategy {
        PlannedStrategy::SinglePass => single_window(total_pages),
        PlannedStrategy::SlidingWindow => {
            sliding_windows(total_pages, config.window_size, config.overlap)
        }
    };

    WindowPlan {
        total_pages,
        strategy,
        windows,
    }
}

fn single_window(total_pages: usize) -> Vec<Window> {
    if total_pages == 0 {
        return Vec::new();
    }
    vec![Window {
        index: 0,
        start: 1,
        end: total_pages,
        overlap: 0,
    }]
}

/// Overlapping windows of `size` pages sharing `overlap` pages.
///
/// `overlap` is capped at `size - 1` so the windows always advance.
pub fn sliding_windows(total_pages: usize, size: usize, overlap: usize) -> Vec<Window> {
    let size = size.max(1);
    let overlap = overlap.min(size - 1);
    let step = size - overlap;

    let mut windows = Vec::new();
    let mut start = 1;
    while start <= total_pages {
        let end = (start + size - 1).min(total_pages);
        windows.push(Window {
            index: windows.len(),
            start,
            end,
            overlap: if windows.is_empty() { 0 } else { overlap },
        });
        if end == total_pages {
            break;
        }
        start += step;
    }
    windows
}

/// The text sent to the model for `window`: each page under its own
/// `## Page k` heading.
pub fn render_window(document: &AssembledDocument, window: &Window) -> String {
    document
        .pages
        .iter()
        .filter(|p| window.pages().contains(&p.page_num))
        .map(|p| format!("## Page {}\n\n{}\n", p.page_num, p.text))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocumentHeader, DocumentPage};

    fn spans(windows: &[Window]) -> Vec<(usize, usize)> {
        windows.iter().map(|w| (w.start, w.end)).collect()
    }

    fn config(threshold: usize, size: usize, overlap: usize) -> ExtractionConfig {
        ExtractionConfig::builder()
            .threshold(threshold)
            .window_size(size)
            .overlap(overlap)
            .build()
            .unwrap()
    }

    #[test]
    fn twenty_five_pages_make_three_windows() {
        let plan = plan_windows(25, &config(10, 10, 2));
        assert_eq!(plan.strategy, PlannedStrategy::SlidingWindow);
        assert_eq!(spans(&plan.windows), vec![(1, 10), (9, 18), (17, 25)]);
        assert_eq!(
            plan.windows.iter().map(|w| w.overlap).collect::<Vec<_>>(),
            vec![0, 2, 2]
        );
        assert_eq!(plan.to_string(), "sliding-window (3 windows)");
    }

    #[test]
    fn at_threshold_is_single_pass() {
        let plan = plan_windows(10, &config(10, 10, 2));
        assert_eq!(plan.strategy, PlannedStrategy::SinglePass);
        assert_eq!(spans(&plan.windows), vec![(1, 10)]);
        assert_eq!(plan.windows[0].overlap, 0);
    }

    #[test]
    fn one_page_is_single_pass() {
        let plan = plan_windows(1, &ExtractionConfig::default());
        assert_eq!(spans(&plan.windows), vec![(1, 1)]);
        assert_eq!(plan.to_string(), "single-pass");
    }

    #[test]
    fn forced_single_pass_ignores_threshold() {
        let mut cfg = config(10, 10, 2);
        cfg.strategy = ExtractionStrategy::SinglePass;
        let plan = plan_windows(40, &cfg);
        assert_eq!(spans(&plan.windows), vec![(1, 40)]);
    }

    #[test]
    fn forced_sliding_window_on_short_document() {
        let mut cfg = config(10, 3, 1);
        cfg.strategy = ExtractionStrategy::SlidingWindow;
        let plan = plan_windows(6, &cfg);
        assert_eq!(plan.strategy, PlannedStrategy::SlidingWindow);
        assert_eq!(spans(&plan.windows), vec![(1, 3), (3, 5), (5, 6)]);
    }

    #[test]
    fn short_last_window_is_kept() {
        // 11 pages, step 8: the last window only holds pages 9-11.
        let windows = sliding_windows(11, 10, 2);
        assert_eq!(spans(&windows), vec![(1, 10), (9, 11)]);
        assert_eq!(windows[1].new_pages(), 11..=11);
    }

    #[test]
    fn empty_document_has_no_windows() {
        assert!(sliding_windows(0, 10, 2).is_empty());
        assert!(plan_windows(0, &ExtractionConfig::default()).windows.is_empty());
    }

    #[test]
    fn new_pages_partition_the_document() {
        for n in 1..=40 {
            for size in 1..=12 {
                for overlap in 0..size {
                    let windows = sliding_windows(n, size, overlap);
                    assert!(!windows.is_empty());
                    assert_eq!(windows[0].start, 1, "n={n} s={size} o={overlap}");
                    assert_eq!(windows.last().unwrap().end, n, "n={n} s={size} o={overlap}");

                    let mut seen = vec![0usize; n + 1];
                    for (i, w) in windows.iter().enumerate() {
                        assert!(w.start <= w.end);
                        assert!(w.page_count() <= size);
                        assert!(!w.new_pages().is_empty(), "empty new pages in {w}");
                        if i > 0 {
                            let prev = &windows[i - 1];
                            assert_eq!(prev.end + 1 - w.start, w.overlap);
                            assert_eq!(w.overlap, overlap);
                        }
                        for p in w.new_pages() {
                            seen[p] += 1;
                        }
                    }
                    assert!(
                        seen[1..].iter().all(|&c| c == 1),
                        "n={n} s={size} o={overlap}: {seen:?}"
                    );
                }
            }
        }
    }

    #[test]
    fn render_window_selects_pages() {
        let doc = AssembledDocument {
            header: DocumentHeader::new("doc.pdf", 3),
            pages: (1..=3)
                .map(|i| DocumentPage::extracted(i, format!("text {i}")))
                .collect(),
        };
        let w = Window {
            index: 1,
            start: 2,
            end: 3,
            overlap: 1,
        };
        let text = render_window(&doc, &w);
        assert!(!text.contains("## Page 1\n"));
        assert!(text.starts_with("## Page 2\n\ntext 2\n"));
        assert!(text.contains("## Page 3\n\ntext 3\n"));
    }
}
