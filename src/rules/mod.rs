//! Stage 2: rule extraction from an assembled Markdown document.
//!
//! ## Data Flow
//!
//! ```text
//! AssembledDocument ──▶ window ──▶ extract ──▶ parse ──▶ consolidate
//!                       (plan)     (model)    (strict)   (dedupe + merge)
//! ```
//!
//! 1. [`window`]      — choose single-pass or sliding-window and lay out
//!    the page windows
//! 2. [`extract`]     — one model call per window, bounded concurrency
//! 3. [`parse`]       — turn each answer into a [`types::RuleExtractionResult`]
//! 4. [`consolidate`] — merge window results into one report

pub mod consolidate;
pub mod extract;
pub mod parse;
pub mod types;
pub mod window;
