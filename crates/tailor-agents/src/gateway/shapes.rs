//! The closed set of response shapes the pipeline asks the model for.
//!
//! Every gateway call declares exactly one `OutputShape`. The shape decides
//! the JSON Schema sent with the request and the Rust type the answer is
//! decoded into. Bump `SHAPE_VERSION` whenever a struct below changes.
//!
//! | Shape                    | Produced for                                  |
//! |--------------------------|-----------------------------------------------|
//! | `ConceptSpecs`           | concept extraction                            |
//! | `Text`                   | overview, subsections, rewrites, critiques    |
//! | `Sections`               | section extraction                            |
//! | `Outline`                | concept outlining                             |
//! | `Evaluations`            | rubric feedback and terminal scoring          |
//! | `CompetitiveEvaluations` | rubric feedback with a summary for the rival  |
//! | `Verdict`                | pairwise comparison                           |

use std::fmt;

use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Version tag sent as part of every schema name.
pub const SHAPE_VERSION: u32 = 1;

/// Lowest and highest rubric score the judge may hand out.
pub const MIN_SCORE: i64 = 1;
pub const MAX_SCORE: i64 = 3;

/// Tag identifying which response structure a request expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputShape {
    ConceptSpecs,
    Text,
    Sections,
    Outline,
    Evaluations,
    CompetitiveEvaluations,
    Verdict,
}

impl OutputShape {
    pub fn name(self) -> &'static str {
        match self {
            Self::ConceptSpecs => "concept_specs",
            Self::Text => "text",
            Self::Sections => "sections",
            Self::Outline => "outline",
            Self::Evaluations => "evaluations",
            Self::CompetitiveEvaluations => "competitive_evaluations",
            Self::Verdict => "verdict",
        }
    }

    /// Versioned schema name, e.g. `verdict_v1`.
    pub fn schema_name(self) -> String {
        format!("{}_v{}", self.name(), SHAPE_VERSION)
    }

    /// Strict JSON Schema for this shape.
    pub fn schema(self) -> Value {
        match self {
            Self::ConceptSpecs => strict_schema::<ConceptSpecs>(),
            Self::Text => strict_schema::<TextBlock>(),
            Self::Sections => strict_schema::<SectionList>(),
            Self::Outline => strict_schema::<ConceptOutline>(),
            Self::Evaluations => strict_schema::<Evaluations>(),
            Self::CompetitiveEvaluations => strict_schema::<CompetitiveEvaluations>(),
            Self::Verdict => strict_schema::<Verdict>(),
        }
    }
}

impl fmt::Display for OutputShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A Rust type that one `OutputShape` decodes into.
pub trait ResponseShape: DeserializeOwned + JsonSchema + Send {
    const SHAPE: OutputShape;

    /// Content rules the JSON Schema cannot express.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

// ── Shapes ───────────────────────────────────────────────────────────────────

/// Detected source-code language and the concepts a chapter teaches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ConceptSpecs {
    /// Programming language used by the chapter, or empty when none.
    pub language: String,
    pub concepts: Vec<String>,
}

impl ResponseShape for ConceptSpecs {
    const SHAPE: OutputShape = OutputShape::ConceptSpecs;
}

/// A single block of markdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TextBlock {
    pub text: String,
}

impl ResponseShape for TextBlock {
    const SHAPE: OutputShape = OutputShape::Text;
}

/// Mutually exclusive sections covering a whole chapter, in reading order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SectionList {
    pub sections: Vec<String>,
}

impl ResponseShape for SectionList {
    const SHAPE: OutputShape = OutputShape::Sections;
}

/// How one concept is taught: the ordered sub-structure used for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OutlineEntry {
    pub concept: String,
    pub layout: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ConceptOutline {
    pub outline: Vec<OutlineEntry>,
}

impl ResponseShape for ConceptOutline {
    const SHAPE: OutputShape = OutputShape::Outline;
}

/// One rubric category as scored by the judge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Evaluation {
    pub category: String,
    pub score: i64,
    pub explanation: String,
}

impl Evaluation {
    /// Markdown block appended to a personalizer's feedback or score text.
    pub fn to_markdown(&self) -> String {
        format!(
            "# Evaluation category: {}\n\nScore: {}/{MAX_SCORE}\n\nFeedback: {}\n\n",
            self.category, self.score, self.explanation
        )
    }
}

fn validate_scores(evals: &[Evaluation]) -> Result<(), String> {
    if evals.is_empty() {
        return Err("no evaluation categories returned".to_string());
    }
    for eval in evals {
        if !(MIN_SCORE..=MAX_SCORE).contains(&eval.score) {
            return Err(format!(
                "score {} for `{}` outside {MIN_SCORE}..={MAX_SCORE}",
                eval.score, eval.category
            ));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Evaluations {
    pub evals: Vec<Evaluation>,
}

impl ResponseShape for Evaluations {
    const SHAPE: OutputShape = OutputShape::Evaluations;

    fn validate(&self) -> Result<(), String> {
        validate_scores(&self.evals)
    }
}

/// Rubric evaluations plus a narrative summary meant for the competitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CompetitiveEvaluations {
    pub evals: Vec<Evaluation>,
    pub summary: String,
}

impl ResponseShape for CompetitiveEvaluations {
    const SHAPE: OutputShape = OutputShape::CompetitiveEvaluations;

    fn validate(&self) -> Result<(), String> {
        validate_scores(&self.evals)
    }
}

/// Raw pairwise verdict; `choice` is resolved against names by the judge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Verdict {
    pub choice: String,
    pub explanation: String,
}

impl ResponseShape for Verdict {
    const SHAPE: OutputShape = OutputShape::Verdict;

    fn validate(&self) -> Result<(), String> {
        if self.choice.trim().is_empty() {
            return Err("empty choice".to_string());
        }
        Ok(())
    }
}

// ── Schema generation ────────────────────────────────────────────────────────

/// Generate the schema for `T` in the strict structured-output dialect:
/// subschemas inlined, every object closed, every property required.
pub fn strict_schema<T: JsonSchema>() -> Value {
    let generator = SchemaSettings::draft07()
        .with(|s| s.inline_subschemas = true)
        .into_generator();
    let root = generator.into_root_schema_for::<T>();
    let mut value = serde_json::to_value(root).unwrap_or(Value::Null);
    if let Value::Object(map) = &mut value {
        map.remove("$schema");
        map.remove("definitions");
    }
    close_objects(&mut value);
    value
}

/// Keywords whose values are data, not subschemas.
const DATA_KEYWORDS: &[&str] = &["enum", "const", "default", "examples", "required"];

/// Normalize one schema node and every subschema below it.
///
/// `title` and `format` annotations are dropped from schema nodes only; the
/// entries of a `properties` map are field names and are never touched.
fn close_objects(value: &mut Value) {
    match value {
        Value::Object(node) => {
            node.remove("format");
            node.remove("title");
            let required = match node.get_mut("properties") {
                Some(Value::Object(props)) => {
                    props.values_mut().for_each(close_objects);
                    Some(props.keys().map(|k| Value::String(k.clone())).collect())
                }
                _ => None,
            };
            if let Some(required) = required {
                node.insert("required".to_string(), Value::Array(required));
                node.insert("additionalProperties".to_string(), Value::Bool(false));
            }
            for (key, child) in node.iter_mut() {
                if key != "properties" && !DATA_KEYWORDS.contains(&key.as_str()) {
                    close_objects(child);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(close_objects),
        _ => {}
    }
}
