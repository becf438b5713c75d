//! Prompt templates for generation, repair, and edit calls.
//!
//! Every system prompt pins the model to the file-block output format that
//! [`crate::core::codec`] parses. The format instructions are repeated
//! verbatim in each prompt rather than shared, so a template can be tuned
//! without rippling through the others.

use crate::models::{FileSet, GenerationJob, ValidationReport};

/// Output format contract, included in every system prompt.
const FORMAT_RULES: &str = r#"OUTPUT FORMAT, follow exactly:
- Start every file with a marker line, then its full content:
<!-- FILE: path/to/file.ext -->
<complete file content>
- Emit complete files only. Never truncate, never use placeholders like
  "rest of the file unchanged".
- No prose, no commentary, no markdown fences around the blocks.
- Paths are relative, forward slashes, no leading slash."#;

/// System prompt for static website generation.
pub const SYSTEM_PROMPT_WEBSITE: &str = r#"You are a senior front-end developer. You build complete, self-contained static websites from a short brief.

Requirements:
- The site must include index.html as its entry page.
- Use semantic HTML5, a separate stylesheet, and vanilla JavaScript only when the brief calls for behavior.
- Every asset you reference (stylesheets, scripts, images you generate inline as SVG) must be emitted as its own file.
- The site must render correctly opened directly from disk: relative paths only, no CDN links, no build step.
- Write all user-visible text in the requested language."#;

/// System prompt for PHP site generation.
pub const SYSTEM_PROMPT_PHP: &str = r#"You are a senior PHP developer. You build small, complete PHP websites from a short brief.

Requirements:
- The site must include index.php as its entry page.
- Plain PHP only: no framework, no Composer dependencies, no database unless the brief demands one.
- Every stylesheet, script, and include you reference must be emitted as its own file.
- Escape all user-controlled output. Forms must handle their own submission.
- Write all user-visible text in the requested language."#;

fn system_prompt_for(job: &GenerationJob) -> String {
    let base = match job.output_kind {
        crate::models::OutputKind::Website => SYSTEM_PROMPT_WEBSITE,
        crate::models::OutputKind::Php => SYSTEM_PROMPT_PHP,
    };
    format!("{}\n\n{}", base, FORMAT_RULES)
}

/// System and user prompt for the initial generation call.
pub fn generation_prompt(job: &GenerationJob) -> (String, String) {
    let mut user = String::new();
    if let Some(name) = &job.site_name {
        user.push_str(&format!("Site name: {}\n", name));
    }
    user.push_str(&format!("Language: {}\n", job.language));
    if let Some(hint) = &job.layout_hint {
        user.push_str(&format!("Layout: {}\n", hint));
    }
    user.push_str(&format!("\nBrief:\n{}\n", job.prompt));
    (system_prompt_for(job), user)
}

/// System and user prompt for a repair round. Carries the current files and
/// the validation findings; asks for corrected files only.
pub fn repair_prompt(job: &GenerationJob, files: &FileSet, report: &ValidationReport) -> (String, String) {
    let user = format!(
        "The site below was generated for this brief:\n{}\n\n\
         Current files:\n{}\n\
         Validation found these problems:\n{}\n\
         Fix every problem and return the complete corrected file set in the \
         same block format.",
        job.prompt,
        super::codec::render_file_blocks(files),
        report.summary(),
    );
    (system_prompt_for(job), user)
}

/// System and user prompt for an edit of a completed job's output.
pub fn edit_prompt(
    job: &GenerationJob,
    files: &FileSet,
    instruction: &str,
    scope_hints: &[String],
) -> (String, String) {
    let mut user = format!(
        "Here is an existing site:\n{}\n\
         Apply this change:\n{}\n",
        super::codec::render_file_blocks(files),
        instruction,
    );
    if !scope_hints.is_empty() {
        user.push_str(&format!(
            "Limit the change to these files: {}\n",
            scope_hints.join(", ")
        ));
    }
    user.push_str(
        "\nRe-emit ONLY the files that change, as complete files in the block \
         format. Do not re-emit unchanged files. Do not redesign anything \
         the change does not touch.",
    );
    (system_prompt_for(job), user)
}
