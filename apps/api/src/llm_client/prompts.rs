// Shared prompt fragments.
// Each module that needs LLM calls defines its own prompts.rs alongside it;
// this file only holds the cross-cutting pieces.

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Plain-text output rules shared by every free-text artifact.
pub const PLAIN_TEXT_RULES: &str = "\
    STRICT FORMATTING RULES:\n\
    1. NO Markdown (no **, no ##, no bullet points *). Write in clean, plain text paragraphs only.\n\
    2. NO Placeholders (no [Insert Name], no [Date]).\n\
    3. Do not include a subject line.";

/// Tone used when the caller does not pick one.
pub const DEFAULT_TONE: &str = "Professional";

/// Substitute `{name}` placeholders in one left-to-right pass.
///
/// Inserted values are never rescanned, so a value that itself contains
/// `{job_description}` or `{source}` lands in the prompt verbatim. Braces that
/// do not name a known placeholder are copied through unchanged.
pub fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let filled = tail.find('}').and_then(|close| {
            let name = &tail[1..close];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, close + 1))
        });
        match filled {
            Some((value, consumed)) => {
                out.push_str(value);
                rest = &tail[consumed..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
