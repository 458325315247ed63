//! Stage-1 pipeline steps for PDF-to-Markdown transcription.
//!
//! Each submodule implements exactly one transformation step, so each can
//! be tested on its own.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ llm ──▶ postprocess
//! (path)    (pdfium)   (base64)   (VLM)   (cleanup)
//! ```
//!
//! 1. [`input`]  — check the PDF path and read stage-2 Markdown input
//! 2. [`render`] — rasterise every page; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 3. [`encode`] — PNG/JPEG-encode and base64-wrap each page image
//! 4. [`llm`]    — the worker pool and the vision call, the only step with
//!    network I/O
//! 5. [`postprocess`] — deterministic cleanup of model quirks
//!
//! Assembly of the per-page results lives in [`crate::document`].

pub mod encode;
pub mod input;
pub mod llm;
pub mod postprocess;
pub mod render;
