//! Deterministic stand-ins for the hosted models.

#![allow(dead_code)]

use edgequake_pdf2rules::rules::parse::parse_extraction;
use edgequake_pdf2rules::{
    PageError, PageImage, PageTranscriber, RenderedDocument, RuleModel, TokenUsage,
    Transcription, WindowError, WindowExtraction, WindowRequest,
};
use image::DynamicImage;

/// Transcribes page `k` as whatever `script(k)` returns; `None` is a
/// failed call.
pub struct ScriptedTranscriber<F>(pub F);

impl<F> PageTranscriber for ScriptedTranscriber<F>
where
    F: Fn(usize) -> Option<String> + Send + Sync,
{
    async fn transcribe(&self, page: &PageImage) -> Result<Transcription, PageError> {
        match (self.0)(page.page_num) {
            Some(markdown) => Ok(Transcription {
                markdown,
                usage: TokenUsage {
                    input_tokens: 1000,
                    output_tokens: 100,
                },
                retries: 0,
            }),
            None => Err(PageError::ExtractionFailed {
                page: page.page_num,
                retries: 0,
                detail: "HTTP 503 Service Unavailable".into(),
            }),
        }
    }
}

/// Answers each window with `script(request)`, parsed the same way a real
/// model answer is.
pub struct ScriptedModel<F>(pub F);

impl<F> ScriptedModel<F>
where
    F: Fn(&WindowRequest<'_>) -> String + Send + Sync,
{
    /// Pins the closure signature; use for closures, not fn items.
    pub fn new(script: F) -> Self {
        Self(script)
    }
}

impl<F> RuleModel for ScriptedModel<F>
where
    F: Fn(&WindowRequest<'_>) -> String + Send + Sync,
{
    async fn extract_rules(
        &self,
        request: &WindowRequest<'_>,
    ) -> Result<WindowExtraction, WindowError> {
        let raw = (self.0)(request);
        let w = request.window;
        Ok(WindowExtraction {
            result: parse_extraction(&raw, w.start, w.end)?,
            usage: TokenUsage {
                input_tokens: request.text.len(),
                output_tokens: raw.len(),
            },
            retries: 0,
        })
    }
}

/// `n` blank rendered pages.
pub fn rendered(n: usize) -> RenderedDocument {
    RenderedDocument {
        page_count: n,
        pages: (1..=n)
            .map(|page_num| {
                Ok(PageImage {
                    page_num,
                    dpi: 150,
                    image: DynamicImage::new_rgb8(4, 4),
                })
            })
            .collect(),
    }
}

/// A stage-1 Markdown artifact with `n` pages of `body(k)`.
pub fn markdown(n: usize, body: impl Fn(usize) -> String) -> String {
    let mut md = format!(
        "# manual.pdf\n**Pages:** {n} | **Date:** 2024-05-01 09:30:00\n\n---\n\n"
    );
    for k in 1..=n {
        md.push_str(&format!("## Page {k}\n\n{}\n\n---\n\n", body(k)));
    }
    md
}

/// A well-formed answer listing one rule per page the window shows.
pub fn rule_per_page(request: &WindowRequest<'_>) -> String {
    let w = request.window;
    let rules: String = w
        .pages()
        .map(|p| format!("[Page {p}] Rule: Keep record {p}.\n"))
        .collect();
    format!(
        "DOCUMENT SUMMARY:\nPages {} to {} of the manual.\n\n\
         EXTRACTED RULES:\n{rules}\n\
         CROSS-PAGE OBSERVATIONS:\nNone\n\n\
         NOTES:\nNone\n",
        w.start, w.end
    )
}
