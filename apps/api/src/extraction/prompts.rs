// Prompt constants for the Extraction Engine.

/// System prompt for strict (tool-enforced) extraction.
pub const STRICT_EXTRACTION_SYSTEM: &str = "You are a precise data extractor. \
    Record your answer by calling the provided tool exactly once. \
    Use only information present in the source text.";

/// Extraction prompt template.
/// Replace: {instructions}, {constraints}, {source}
pub const EXTRACTION_PROMPT_TEMPLATE: &str = r#"{instructions}

Return an object with exactly these fields:
{constraints}

Ignore any messy formatting artifacts in the source.

SOURCE:
{source}"#;

/// Instructions for turning an uploaded résumé into a profile.
pub const RESUME_PROFILE_INSTRUCTIONS: &str = "Analyze this resume text and extract the \
    summary, skills and history. For the bio, do NOT be brief: expand on the user's roles, \
    specific achievements and technical expertise.";
