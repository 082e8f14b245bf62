//! Shared fixtures: an in-process gateway that answers every shape with
//! deterministic content derived from the request.

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tailor_agents::artifacts::ArtifactStore;
use tailor_agents::config::GenerationSettings;
use tailor_agents::context::RunContext;
use tailor_agents::errors::GatewayError;
use tailor_agents::gateway::shapes::OutputShape;
use tailor_agents::gateway::{GatewayRequest, LlmGateway};
use tailor_agents::prompts;

pub const INTEREST: &str = "cooking";

pub const CHAPTER: &str = "\
# Loops and Recursion

## Recursion

A function that calls itself.

```java
int fact(int n) { return n <= 1 ? 1 : n * fact(n - 1); }
```

## Iteration

Repeating work with a loop.";

/// What the scripted model writes for a whole-chapter rewrite.
pub const MONOLITHIC_DRAFT: &str = "\
# Loops, Simmered

## Recursion

A recipe that calls itself.

## Iteration

Stirring until the sauce thickens.";

/// Gateway stand-in that records every request and answers by shape.
pub struct ScriptedGateway {
    pub concepts: Vec<String>,
    pub language: String,
    pub outline: Vec<(String, Vec<String>)>,
    pub choice: String,
    pub fail_on: Option<OutputShape>,
    requests: Mutex<Vec<GatewayRequest>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self {
            concepts: vec!["Recursion".into(), "Iteration".into()],
            language: "Java".into(),
            outline: vec![(
                "Recursion".into(),
                vec!["base case".into(), "recursive step".into()],
            )],
            choice: "A".into(),
            fail_on: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_language(mut self, language: &str) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_choice(mut self, choice: &str) -> Self {
        self.choice = choice.into();
        self
    }

    pub fn failing_on(mut self, shape: OutputShape) -> Self {
        self.fail_on = Some(shape);
        self
    }

    pub fn requests(&self) -> Vec<GatewayRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, shape: OutputShape) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.shape == shape)
            .count()
    }

    fn text_for(&self, request: &GatewayRequest) -> String {
        let user = request.user.as_str();
        let system = request.system.as_str();
        if user.starts_with("[The Start of Old ") {
            return format!("{} (refined)", old_unit(user));
        }
        if system == prompts::CREATE_OVERVIEW {
            return "# Cooking Up Control Flow\n\nAn overview.".into();
        }
        if system.contains("through an analogy") {
            return format!("Think of {} like a recipe.", concept_of(user));
        }
        if user.starts_with("CS concept to teach: ") {
            return format!("## {}\n\nExplained with kitchen metaphors.", concept_of(user));
        }
        if system.contains("university student") {
            return "The recursion section lost me.".into();
        }
        if system.contains("Compare the modified chapter") {
            return "The base case is never stated.".into();
        }
        if system.contains("provided section of a CS textbook chapter") {
            return format!("{user} (personalized)");
        }
        MONOLITHIC_DRAFT.into()
    }

    fn answer(&self, request: &GatewayRequest) -> Value {
        match request.shape {
            OutputShape::ConceptSpecs => json!({
                "language": self.language,
                "concepts": self.concepts,
            }),
            OutputShape::Outline => {
                let outline: Vec<Value> = self
                    .outline
                    .iter()
                    .map(|(concept, layout)| json!({"concept": concept, "layout": layout}))
                    .collect();
                json!({ "outline": outline })
            }
            OutputShape::Text => json!({ "text": self.text_for(request) }),
            OutputShape::Sections => json!({ "sections": split_h2(&request.user) }),
            OutputShape::Evaluations => json!({ "evals": rubric() }),
            OutputShape::CompetitiveEvaluations => json!({
                "evals": rubric(),
                "summary": format!("Summary of a draft starting with {}", first_line(&request.user, "[The Start of Modified Chapter]")),
            }),
            OutputShape::Verdict => json!({
                "choice": self.choice,
                "explanation": "Clearer progression.",
            }),
        }
    }
}

#[async_trait]
impl LlmGateway for ScriptedGateway {
    async fn complete(&self, request: &GatewayRequest) -> Result<Value, GatewayError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail_on == Some(request.shape) {
            return Err(GatewayError::Status {
                status: 500,
                body: "scripted failure".into(),
            });
        }
        Ok(self.answer(request))
    }
}

fn rubric() -> Value {
    let evals: Vec<Value> = prompts::rubric_categories(INTEREST)
        .iter()
        .map(|c| json!({"category": c, "score": 2, "explanation": "Adequate."}))
        .collect();
    Value::Array(evals)
}

fn concept_of(user: &str) -> &str {
    user.trim_start_matches("CS concept to teach: ")
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
}

fn old_unit(user: &str) -> &str {
    let body_start = user.find('\n').map(|i| i + 1).unwrap_or(0);
    let body_end = user.find("\n[The End of Old").unwrap_or(user.len());
    &user[body_start..body_end]
}

fn first_line<'a>(user: &'a str, after: &str) -> &'a str {
    user.split(after)
        .nth(1)
        .and_then(|rest| rest.trim_start().lines().next())
        .unwrap_or_default()
}

/// Split markdown into sections, one per `## ` header plus any preamble.
pub fn split_h2(text: &str) -> Vec<String> {
    let mut sections = Vec::new();
    let mut current = String::new();
    for line in text.lines() {
        if line.starts_with("## ") && !current.trim().is_empty() {
            sections.push(current.trim().to_string());
            current.clear();
        }
        current.push_str(line);
        current.push('\n');
    }
    if !current.trim().is_empty() {
        sections.push(current.trim().to_string());
    }
    sections
}

pub fn settings(max_concurrency: usize) -> GenerationSettings {
    GenerationSettings {
        extraction_temperature: 0.0,
        max_concurrency,
    }
}

pub fn context(gateway: &Arc<ScriptedGateway>, root: &Path) -> Arc<RunContext> {
    context_with(gateway, root, CHAPTER, 1)
}

pub fn context_with(
    gateway: &Arc<ScriptedGateway>,
    root: &Path,
    reference: &str,
    max_concurrency: usize,
) -> Arc<RunContext> {
    let shared: Arc<dyn LlmGateway> = gateway.clone();
    RunContext::new(
        shared,
        ArtifactStore::new(root),
        reference,
        INTEREST,
        settings(max_concurrency),
    )
    .unwrap()
}
