use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperienceEntry {
    pub role: String,
    pub company: String,
    pub dates: String,
    pub highlights: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EducationEntry {
    pub institution: String,
    pub degree: String,
    pub dates: String,
}

/// Profile extracted from an uploaded résumé (`RESUME_PROFILE`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResumeProfile {
    pub bio: String,
    pub skills: String,
    pub seniority: String,
    pub experience: Vec<ExperienceEntry>,
    pub education: Vec<EducationEntry>,
}

/// Cold outreach email (`COLD_EMAIL`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColdEmail {
    pub subject: String,
    pub body: String,
}

/// Résumé tailored to one job (`TAILORED_RESUME`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TailoredResume {
    pub summary: String,
    pub skills: String,
    pub experience: Vec<ExperienceEntry>,
    pub education: Vec<EducationEntry>,
}
