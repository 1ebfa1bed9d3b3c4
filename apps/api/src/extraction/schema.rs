//! Static extraction schemas and the conformance check applied to model output.
//!
//! A schema is a flat list of fields. `Records` fields hold an ordered list of objects
//! whose own fields are `Text` or `Choice`. Conformance always produces exactly the
//! schema's field set: unknown keys are dropped and absent optional fields get empty
//! defaults, so nothing downstream ever sees a null.

use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    Text,
    /// One of a fixed set of strings. Matching is case-insensitive; output is canonical.
    Choice(&'static [&'static str]),
    /// Ordered list of structured records.
    Records(&'static [FieldSpec]),
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    /// Natural-language constraint shown to the model.
    pub instruction: &'static str,
}

#[derive(Debug)]
pub struct ExtractionSchema {
    pub name: &'static str,
    pub description: &'static str,
    pub fields: &'static [FieldSpec],
}

/// How much repair conformance may attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leniency {
    /// Shape was mechanically enforced; any deviation is a violation.
    Exact,
    /// Freeform text: a list of strings where text is expected is joined with ", ".
    Repair,
}

/// Where and how model output failed to conform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub path: String,
    pub problem: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.problem)
    }
}

impl ExtractionSchema {
    /// JSON Schema for the forced tool call.
    pub fn to_json_schema(&self) -> Value {
        object_schema(self.fields)
    }

    /// One line per field, embedded in extraction prompts.
    pub fn prompt_constraints(&self) -> String {
        let mut lines = Vec::new();
        describe_fields(self.fields, "", &mut lines);
        lines.join("\n")
    }

    /// Checks `value` against the schema and returns the normalized object.
    pub fn conform(&self, value: Value, leniency: Leniency) -> Result<Map<String, Value>, Violation> {
        match value {
            Value::Object(map) => conform_object(self.fields, map, "$", leniency),
            other => Err(Violation {
                path: "$".to_string(),
                problem: format!("expected an object, got {}", kind_of(&other)),
            }),
        }
    }
}

fn object_schema(fields: &[FieldSpec]) -> Value {
    let mut properties = Map::new();
    for field in fields {
        let mut prop = match field.kind {
            FieldKind::Text => json!({ "type": "string" }),
            FieldKind::Choice(options) => json!({ "type": "string", "enum": options }),
            FieldKind::Records(nested) => json!({ "type": "array", "items": object_schema(nested) }),
        };
        prop["description"] = Value::String(field.instruction.to_string());
        properties.insert(field.name.to_string(), prop);
    }
    let required: Vec<&str> = fields.iter().filter(|f| f.required).map(|f| f.name).collect();
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

fn describe_fields(fields: &[FieldSpec], indent: &str, lines: &mut Vec<String>) {
    for field in fields {
        let kind = match field.kind {
            FieldKind::Text => "string".to_string(),
            FieldKind::Choice(options) => format!("one of: {}", options.join(" | ")),
            FieldKind::Records(_) => "array of objects".to_string(),
        };
        let presence = if field.required { "required" } else { "optional" };
        lines.push(format!(
            "{indent}- \"{}\" ({kind}, {presence}): {}",
            field.name, field.instruction
        ));
        if let FieldKind::Records(nested) = field.kind {
            describe_fields(nested, &format!("{indent}    "), lines);
        }
    }
}

fn conform_object(
    fields: &[FieldSpec],
    mut input: Map<String, Value>,
    path: &str,
    leniency: Leniency,
) -> Result<Map<String, Value>, Violation> {
    let mut out = Map::new();
    for field in fields {
        let field_path = format!("{path}.{}", field.name);
        let value = match input.remove(field.name) {
            None | Some(Value::Null) if field.required => {
                return Err(Violation {
                    path: field_path,
                    problem: "required field is missing".to_string(),
                })
            }
            None | Some(Value::Null) => default_for(field.kind),
            Some(value) => conform_field(field, value, &field_path, leniency)?,
        };
        out.insert(field.name.to_string(), value);
    }
    Ok(out)
}

fn conform_field(
    field: &FieldSpec,
    value: Value,
    path: &str,
    leniency: Leniency,
) -> Result<Value, Violation> {
    let violation = |problem: String| Violation {
        path: path.to_string(),
        problem,
    };

    match (field.kind, value) {
        (FieldKind::Text, Value::String(s)) => Ok(Value::String(s.trim().to_string())),
        (FieldKind::Text, Value::Array(items)) if leniency == Leniency::Repair => {
            let parts: Option<Vec<String>> = items
                .iter()
                .map(|v| v.as_str().map(|s| s.trim().to_string()))
                .collect();
            parts
                .map(|p| Value::String(p.join(", ")))
                .ok_or_else(|| violation("expected a string, got a mixed array".to_string()))
        }
        (FieldKind::Choice(options), Value::String(s)) => options
            .iter()
            .find(|o| o.eq_ignore_ascii_case(s.trim()))
            .map(|o| Value::String(o.to_string()))
            .ok_or_else(|| violation(format!("'{s}' is not one of {}", options.join(", ")))),
        (FieldKind::Records(nested), Value::Array(items)) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| match item {
                Value::Object(map) => {
                    conform_object(nested, map, &format!("{path}[{i}]"), leniency).map(Value::Object)
                }
                other => Err(Violation {
                    path: format!("{path}[{i}]"),
                    problem: format!("expected an object, got {}", kind_of(&other)),
                }),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        (kind, other) => Err(violation(format!(
            "expected {}, got {}",
            expected_of(kind),
            kind_of(&other)
        ))),
    }
}

fn default_for(kind: FieldKind) -> Value {
    match kind {
        FieldKind::Text | FieldKind::Choice(_) => Value::String(String::new()),
        FieldKind::Records(_) => Value::Array(Vec::new()),
    }
}

fn expected_of(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Text | FieldKind::Choice(_) => "a string",
        FieldKind::Records(_) => "an array of objects",
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Schemas
// ────────────────────────────────────────────────────────────────────────────

pub const SENIORITY_LEVELS: &[&str] = &["junior", "mid", "senior", "lead", "unknown"];

const EXPERIENCE_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "role",
        kind: FieldKind::Text,
        required: true,
        instruction: "Job title held.",
    },
    FieldSpec {
        name: "company",
        kind: FieldKind::Text,
        required: true,
        instruction: "Employer or client name.",
    },
    FieldSpec {
        name: "dates",
        kind: FieldKind::Text,
        required: false,
        instruction: "Date range as written, e.g. 'Jan 2021 - Present'.",
    },
    FieldSpec {
        name: "highlights",
        kind: FieldKind::Text,
        required: false,
        instruction: "Key achievements as newline-separated sentences, no bullet characters.",
    },
];

const EDUCATION_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: "institution",
        kind: FieldKind::Text,
        required: true,
        instruction: "School or university name.",
    },
    FieldSpec {
        name: "degree",
        kind: FieldKind::Text,
        required: false,
        instruction: "Degree and field of study.",
    },
    FieldSpec {
        name: "dates",
        kind: FieldKind::Text,
        required: false,
        instruction: "Date range as written.",
    },
];

/// Profile extracted from an uploaded résumé.
pub static RESUME_PROFILE: ExtractionSchema = ExtractionSchema {
    name: "resume_profile",
    description: "Structured professional profile extracted from a résumé.",
    fields: &[
        FieldSpec {
            name: "bio",
            kind: FieldKind::Text,
            required: true,
            instruction: "A detailed first-person professional summary, 150-200 words. \
                Expand on roles, specific achievements and technical expertise. \
                Confident and expert tone.",
        },
        FieldSpec {
            name: "skills",
            kind: FieldKind::Text,
            required: true,
            instruction: "The top 10 hard technical skills as a single comma-separated string.",
        },
        FieldSpec {
            name: "seniority",
            kind: FieldKind::Choice(SENIORITY_LEVELS),
            required: false,
            instruction: "Overall career level.",
        },
        FieldSpec {
            name: "experience",
            kind: FieldKind::Records(EXPERIENCE_FIELDS),
            required: false,
            instruction: "Work history, most recent first.",
        },
        FieldSpec {
            name: "education",
            kind: FieldKind::Records(EDUCATION_FIELDS),
            required: false,
            instruction: "Education history, most recent first.",
        },
    ],
};

/// Cold outreach email to a hiring manager.
pub static COLD_EMAIL: ExtractionSchema = ExtractionSchema {
    name: "cold_email",
    description: "A short cold email with a subject line.",
    fields: &[
        FieldSpec {
            name: "subject",
            kind: FieldKind::Text,
            required: true,
            instruction: "Catchy but professional subject line.",
        },
        FieldSpec {
            name: "body",
            kind: FieldKind::Text,
            required: true,
            instruction: "Email body under 150 words focused on the value proposition and fit.",
        },
    ],
};

/// Résumé rewritten for one job description.
pub static TAILORED_RESUME: ExtractionSchema = ExtractionSchema {
    name: "tailored_resume",
    description: "The user's résumé rewritten to align with a job description.",
    fields: &[
        FieldSpec {
            name: "summary",
            kind: FieldKind::Text,
            required: true,
            instruction: "Professional summary rewritten to highlight skills relevant to this job.",
        },
        FieldSpec {
            name: "skills",
            kind: FieldKind::Text,
            required: true,
            instruction: "Comma-separated skills, most relevant to the job first.",
        },
        FieldSpec {
            name: "experience",
            kind: FieldKind::Records(EXPERIENCE_FIELDS),
            required: false,
            instruction: "Same roles as the input résumé, highlights rewritten toward the job's keywords. \
                Never invent roles.",
        },
        FieldSpec {
            name: "education",
            kind: FieldKind::Records(EDUCATION_FIELDS),
            required: false,
            instruction: "Copied from the input résumé unchanged.",
        },
    ],
};
