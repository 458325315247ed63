//! Model instructions for both pipeline stages.
//!
//! Every prompt lives here so prompt changes never touch retry, parsing or
//! consolidation code, and so tests can check that the layout the prompts
//! request matches what [`crate::rules::parse`] accepts.
//!
//! Callers can override the transcription prompt via
//! [`crate::config::ConversionConfig::system_prompt`].

/// Default system prompt for transcribing one page image to Markdown.
pub const TRANSCRIBE_SYSTEM_PROMPT: &str = r#"You are an expert document transcriber. Extract all text from the page image in Markdown format. Be concise but complete.

Follow these rules precisely:

1. TEXT PRESERVATION
   - Preserve ALL text content completely and accurately
   - Maintain the reading order as a human would read the page
   - Keep numbered clauses, article numbers and list numbering exactly as printed

2. STRUCTURE
   - Use ### and #### for headings found on the page
   - Use - for unordered lists and 1. 2. 3. for ordered lists
   - Convert tables to GFM pipe format

3. WHAT TO IGNORE
   - Page numbers, running headers and footers
   - Decorative borders and lines that carry no content meaning

4. OUTPUT FORMAT
   - Output ONLY the Markdown content
   - Do NOT wrap in ```markdown fences
   - Do NOT add commentary or explanations
   - Do NOT add "Page X" headings or markers"#;

/// The user-turn text sent with each page image.
pub const TRANSCRIBE_USER_PROMPT: &str = "Extract content:";

/// The four section headings the rule listing must use, in order.
pub const SECTION_SUMMARY: &str = "DOCUMENT SUMMARY";
pub const SECTION_RULES: &str = "EXTRACTED RULES";
pub const SECTION_OBSERVATIONS: &str = "CROSS-PAGE OBSERVATIONS";
pub const SECTION_NOTES: &str = "NOTES";

/// Output layout shared by the single-pass and window prompts.
const OUTPUT_LAYOUT: &str = r#"Output format (use these four headings exactly, in this order, and nothing before the first one):

DOCUMENT SUMMARY:
<2-4 sentence overview>

EXTRACTED RULES:
[Page X] Rule: <complete rule description>
[Page Y-Z] Constraint: <rule spanning pages Y to Z>
[Page X] Guideline: <another rule>
[Page X] Instruction: <another rule>
[Page X] INCOMPLETE: <description of content that continues beyond the given pages>

CROSS-PAGE OBSERVATIONS:
<one observation per line about content that continues across pages>

NOTES:
<additional context or observations>

Rules for the EXTRACTED RULES section:
- One rule per line, each line starting with its page reference in square brackets
- The label after the page reference is one of: Rule, Guideline, Constraint, Instruction
- Only reference page numbers that appear in the text you were given
- Write "None." if there are no rules"#;

/// System prompt for analysing a complete short document in one call.
pub fn single_pass_system_prompt() -> String {
    format!(
        "You are an expert document analyst specializing in extracting rules, guidelines, and constraints.\n\n\
Your task:\n\
1. Analyze the complete markdown document provided\n\
2. Identify ALL rules, guidelines, constraints, instructions, or requirements\n\
3. Track which pages contain each rule\n\
4. If a rule spans multiple pages, note the page range\n\
5. Preserve the complete context of each rule\n\n\
{OUTPUT_LAYOUT}"
    )
}

/// System prompt for analysing one window of a longer document.
pub fn window_system_prompt() -> String {
    format!(
        "You are analyzing a section of a larger document, specializing in extracting rules, guidelines, and constraints.\n\n\
Extract:\n\
1. All rules, guidelines, and constraints in these pages\n\
2. Note if any rule appears incomplete (continues from previous or to next pages)\n\
3. Include page numbers for each rule\n\n\
{OUTPUT_LAYOUT}"
    )
}

/// User message for a single-pass call.
pub fn single_pass_user_message(total_pages: usize, document: &str) -> String {
    format!(
        "Analyze this {total_pages}-page document and extract all rules:\n\n{document}"
    )
}

/// User message for a window call.
///
/// `new_start` is the first page not already shown in the previous window,
/// which is where the model should focus.
pub fn window_user_message(
    start: usize,
    end: usize,
    new_start: usize,
    total_pages: usize,
    window_text: &str,
) -> String {
    let focus = if new_start == start {
        String::new()
    } else {
        format!(
            " Pages {start}-{} repeat the end of the previous section for context; focus on pages {new_start}-{end}.",
            new_start - 1
        )
    };
    format!(
        "Analyzing pages {start}-{end} of a {total_pages}-page document.{focus}\n\n{window_text}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompts_name_every_section() {
        for prompt in [single_pass_system_prompt(), window_system_prompt()] {
            for heading in [
                SECTION_SUMMARY,
                SECTION_RULES,
                SECTION_OBSERVATIONS,
                SECTION_NOTES,
            ] {
                assert!(prompt.contains(&format!("{heading}:")), "missing {heading}");
            }
        }
    }

    #[test]
    fn first_window_has_no_focus_hint() {
        let msg = window_user_message(1, 10, 1, 25, "## Page 1\n\nx");
        assert!(msg.starts_with("Analyzing pages 1-10 of a 25-page document."));
        assert!(!msg.contains("focus"));
    }

    #[test]
    fn later_window_points_at_new_pages() {
        let msg = window_user_message(9, 18, 11, 25, "text");
        assert!(msg.contains("Pages 9-10 repeat"), "got: {msg}");
        assert!(msg.contains("focus on pages 11-18"), "got: {msg}");
    }

    #[test]
    fn transcription_prompt_forbids_page_markers() {
        assert!(TRANSCRIBE_SYSTEM_PROMPT.contains("Do NOT add \"Page X\""));
    }
}
