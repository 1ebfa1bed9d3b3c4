// All LLM prompt constants for the Generation module.
// Reuses cross-cutting fragments from llm_client::prompts.

/// System prompt for proposals and cover letters (plain streamed text).
pub const COPYWRITER_SYSTEM: &str = "You are an expert freelance copywriter. \
    You write professional, concise, and high-converting proposals and letters.";

/// Proposal prompt template.
/// Replace: {rules}, {tone}, {profile}, {job_description}
pub const PROPOSAL_PROMPT_TEMPLATE: &str = r#"{rules}
4. Sign off simply with "Sincerely," followed by the candidate's name, or a generic title like "A Dedicated Professional" if the name is unknown.

STRATEGY:
- If the Job Description is short, INFER the needs and write a confident pitch.
- Focus on the CLIENT'S problems, not just your skills.

TONE: {tone}
{profile}
JOB DESCRIPTION:
{job_description}"#;

/// Cover letter prompt template.
/// Replace: {rules}, {job_title}, {company_name}, {candidate_name}, {resume_context}, {job_description}
pub const COVER_LETTER_PROMPT_TEMPLATE: &str = r#"Write a formal and persuasive cover letter for the position of {job_title} at {company_name}.

CANDIDATE NAME: {candidate_name}
CANDIDATE RESUME/PROFILE: {resume_context}

JOB DESCRIPTION: {job_description}

INSTRUCTIONS:
- Tone: Professional, Confident, Concise (max 300 words).
- Structure:
  1. Introduction (state excitement and the specific role).
  2. The hook (connect the candidate's specific skills from the resume to challenges in the job description).
  3. Conclusion (call to action, request an interview).
- Return ONLY the body paragraphs.
- Focus on adding value.

{rules}"#;

/// Persona for cold outreach emails.
pub const COLD_EMAIL_PERSONA: &str = "You are an expert Career Coach and Outreach Specialist. \
    Write a concise, high-impact cold email to a hiring manager or recruiter.";

/// Instructions for cold outreach emails. The job context is the extraction source.
pub const COLD_EMAIL_INSTRUCTIONS: &str = "Write a cold email for the role below. \
    The subject line must be catchy but professional. \
    The body must stay under 150 words and focus on the value proposition and why the sender is a great fit.";

/// Persona for résumé tailoring.
pub const TAILOR_PERSONA: &str = "You are an expert Resume Strategist and ATS Optimizer. \
    Your goal is to tailor the user's resume to align with the provided job description.";

/// Instructions for résumé tailoring. The stored résumé is passed as context.
pub const TAILOR_INSTRUCTIONS: &str = "Rewrite the user's resume (given as CONTEXT) for the job description below. \
    Optimize the summary to highlight skills relevant to this job. \
    Rewrite experience highlights to emphasize achievements relevant to the job's keywords. \
    Keep the same roles, companies and education; never invent history.";

/// Used when a profile has no display name.
pub const ANONYMOUS_CANDIDATE: &str = "Candidate";

/// Used when an application has no job description.
pub const MISSING_JOB_DESCRIPTION: &str = "No job description provided.";

/// Used when a profile has neither a résumé profile nor a bio.
pub const MISSING_RESUME: &str = "No resume provided.";
