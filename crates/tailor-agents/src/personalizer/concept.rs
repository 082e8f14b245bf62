//! Concept-by-concept personalizer.
//!
//! Decomposes the chapter into its technical concepts, optionally outlines
//! how each is taught, then writes one personalized subsection per concept
//! behind an overview chunk at index 0.

use std::sync::Arc;

use async_trait::async_trait;

use super::stage::{ConceptStage, StageMachine, TransitionRecord};
use super::{join_chunks, JudgeInbox, Personalizer, PersonalizerKind};
use crate::artifacts::ArtifactKind;
use crate::context::RunContext;
use crate::errors::TailorError;
use crate::gateway::shapes::{ConceptOutline, ConceptSpecs, OutlineEntry, TextBlock};
use crate::gateway::{generate, generate_texts, Prompt, Role};
use crate::prompts;

/// Introductory analogy text for one concept, free of headers and code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConceptAnalogy {
    pub concept: String,
    pub text: String,
}

pub struct ConceptPersonalizer {
    name: String,
    ctx: Arc<RunContext>,
    stage: StageMachine<ConceptStage>,
    language: Option<String>,
    concepts: Vec<String>,
    outline: Vec<OutlineEntry>,
    overview: Option<String>,
    analogies: Option<Vec<ConceptAnalogy>>,
    draft_chunks: Vec<String>,
    draft: Option<String>,
    final_chunks: Vec<String>,
    final_draft: Option<String>,
    inbox: JudgeInbox,
}

impl ConceptPersonalizer {
    pub fn new(name: impl Into<String>, ctx: Arc<RunContext>) -> Self {
        Self {
            name: name.into(),
            ctx,
            stage: StageMachine::new(),
            language: None,
            concepts: Vec::new(),
            outline: Vec::new(),
            overview: None,
            analogies: None,
            draft_chunks: Vec::new(),
            draft: None,
            final_chunks: Vec::new(),
            final_draft: None,
            inbox: JudgeInbox::default(),
        }
    }

    pub fn stage(&self) -> ConceptStage {
        self.stage.current()
    }

    /// Source-code language detected in the chapter, if any.
    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn concepts(&self) -> &[String] {
        &self.concepts
    }

    pub fn outline(&self) -> &[OutlineEntry] {
        &self.outline
    }

    pub fn overview(&self) -> Option<&str> {
        self.overview.as_deref()
    }

    /// `None` until `create_analogies` has run.
    pub fn analogies(&self) -> Option<&[ConceptAnalogy]> {
        self.analogies.as_deref()
    }

    pub fn draft_chunks(&self) -> &[String] {
        &self.draft_chunks
    }

    pub fn final_chunks(&self) -> &[String] {
        &self.final_chunks
    }

    fn prompt(&self, system: impl Into<String>, user: impl Into<String>) -> Prompt {
        Prompt::new(Role::Personalizer, system, user)
    }

    /// Detect the chapter's concepts and source language.
    pub async fn extract_concepts(&mut self) -> Result<(), TailorError> {
        self.stage
            .require(&[ConceptStage::Fresh], &self.name, "extract_concepts")?;
        let reference = self.ctx.require_reference()?;
        tracing::info!(personalizer = %self.name, "Extracting concepts");

        let prompt = self
            .prompt(prompts::EXTRACT_CONCEPTS, reference)
            .with_temperature(self.ctx.settings.extraction_temperature);
        let specs: ConceptSpecs = generate(self.ctx.gateway(), prompt).await?;

        let language = specs.language.trim();
        let language = (!language.is_empty()).then(|| language.to_string());
        let concepts: Vec<String> = specs
            .concepts
            .into_iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();

        self.ctx.store.write_scoped(
            &self.name,
            ArtifactKind::Specs,
            &render_specs(language.as_deref(), &concepts),
        )?;
        self.language = language;
        self.concepts = concepts;
        self.stage.advance(
            ConceptStage::Extracted,
            Some(&format!("{} concepts", self.concepts.len())),
        )?;
        tracing::info!(
            personalizer = %self.name,
            concepts = self.concepts.len(),
            language = self.language.as_deref().unwrap_or("none"),
            "Concepts extracted"
        );
        Ok(())
    }

    /// Map each concept to the layout used to teach it.
    ///
    /// Replaces `concepts` with the concepts that survived outlining, in the
    /// model's order. Concepts the model could not locate are dropped, as are
    /// entries naming a concept that was never extracted.
    pub async fn write_outline(&mut self) -> Result<(), TailorError> {
        self.stage
            .require(&[ConceptStage::Extracted], &self.name, "write_outline")?;
        tracing::info!(personalizer = %self.name, "Writing outline");

        let prompt = self.prompt(
            prompts::WRITE_OUTLINE,
            prompts::outline_payload(&self.ctx.reference_text, &self.concepts),
        );
        let outline: ConceptOutline = generate(self.ctx.gateway(), prompt).await?;

        let mut kept = Vec::with_capacity(outline.outline.len());
        for entry in outline.outline {
            let known = self
                .concepts
                .iter()
                .find(|c| c.eq_ignore_ascii_case(entry.concept.trim()));
            match known {
                Some(name) if !kept.iter().any(|e: &OutlineEntry| &e.concept == name) => {
                    kept.push(OutlineEntry {
                        concept: name.clone(),
                        layout: entry.layout,
                    });
                }
                Some(_) => {}
                None => {
                    tracing::warn!(
                        personalizer = %self.name,
                        concept = %entry.concept,
                        "Outline names an unknown concept, skipping"
                    );
                }
            }
        }

        let dropped = self.concepts.len() - kept.len();
        self.ctx
            .store
            .write_scoped(&self.name, ArtifactKind::Outline, &render_outline(&kept))?;
        self.concepts = kept.iter().map(|e| e.concept.clone()).collect();
        self.outline = kept;
        self.stage.advance(
            ConceptStage::Outlined,
            Some(&format!("{} kept, {} dropped", self.concepts.len(), dropped)),
        )?;
        tracing::info!(
            personalizer = %self.name,
            concepts = self.concepts.len(),
            dropped,
            "Outline written"
        );
        Ok(())
    }

    /// Write the chapter overview; it always occupies chunk 0.
    pub async fn create_overview(&mut self) -> Result<(), TailorError> {
        self.stage.require(
            &[
                ConceptStage::Extracted,
                ConceptStage::Outlined,
                ConceptStage::Drafted,
            ],
            &self.name,
            "create_overview",
        )?;
        tracing::info!(personalizer = %self.name, "Creating overview");

        let prompt = self.prompt(
            prompts::CREATE_OVERVIEW,
            prompts::overview_payload(&self.concepts),
        );
        let block: TextBlock = generate(self.ctx.gateway(), prompt).await?;

        if self.stage.current() == ConceptStage::Drafted {
            let mut chunks = self.draft_chunks.clone();
            if self.overview.is_some() {
                chunks[0] = block.text.clone();
            } else {
                chunks.insert(0, block.text.clone());
            }
            self.commit_draft(chunks)?;
        }
        self.overview = Some(block.text);
        Ok(())
    }

    /// One personalized subsection per concept, in concept order.
    ///
    /// With `with_outline`, each call also carries the concept's layout and
    /// the outline must have been written first.
    pub async fn personalize(&mut self, with_outline: bool) -> Result<(), TailorError> {
        let allowed: &[ConceptStage] = if with_outline {
            &[ConceptStage::Outlined]
        } else {
            &[ConceptStage::Extracted, ConceptStage::Outlined]
        };
        self.stage.require(allowed, &self.name, "personalize")?;
        tracing::info!(
            personalizer = %self.name,
            concepts = self.concepts.len(),
            with_outline,
            "Personalizing concept by concept"
        );

        let system = prompts::personalize_concept(&self.ctx.interest, self.language.as_deref());
        let calls: Vec<Prompt> = if with_outline {
            self.outline
                .iter()
                .map(|entry| {
                    self.prompt(
                        system.clone(),
                        prompts::concept_payload(&entry.concept, Some(entry.layout.as_slice())),
                    )
                })
                .collect()
        } else {
            self.concepts
                .iter()
                .map(|concept| self.prompt(system.clone(), prompts::concept_payload(concept, None)))
                .collect()
        };
        if calls.is_empty() {
            tracing::warn!(personalizer = %self.name, "No concepts to personalize");
        }

        let subsections = generate_texts(
            self.ctx.gateway(),
            calls,
            self.ctx.settings.max_concurrency,
        )
        .await?;

        let mut chunks = Vec::with_capacity(subsections.len() + 1);
        chunks.extend(self.overview.iter().cloned());
        chunks.extend(subsections);
        self.commit_draft(chunks)?;
        self.stage.advance(
            ConceptStage::Drafted,
            Some(&format!("{} chunks", self.draft_chunks.len())),
        )?;
        Ok(())
    }

    /// One analogy per concept, kept in concept order.
    pub async fn create_analogies(&mut self) -> Result<(), TailorError> {
        self.stage.require(
            &[
                ConceptStage::Extracted,
                ConceptStage::Outlined,
                ConceptStage::Drafted,
                ConceptStage::Refined,
            ],
            &self.name,
            "create_analogies",
        )?;
        tracing::info!(
            personalizer = %self.name,
            concepts = self.concepts.len(),
            "Creating analogies"
        );

        let system = prompts::create_analogy(&self.ctx.interest);
        let calls: Vec<Prompt> = self
            .concepts
            .iter()
            .map(|concept| self.prompt(system.clone(), prompts::concept_payload(concept, None)))
            .collect();
        let texts = generate_texts(
            self.ctx.gateway(),
            calls,
            self.ctx.settings.max_concurrency,
        )
        .await?;

        let analogies: Vec<ConceptAnalogy> = self
            .concepts
            .iter()
            .cloned()
            .zip(texts)
            .map(|(concept, text)| ConceptAnalogy { concept, text })
            .collect();
        let rendered = analogies
            .iter()
            .map(|a| format!("## {}\n\n{}", a.concept, a.text))
            .collect::<Vec<_>>();
        self.ctx.store.write_scoped(
            &self.name,
            ArtifactKind::DraftAnalogy,
            &join_chunks(&rendered),
        )?;
        self.analogies = Some(analogies);
        Ok(())
    }

    /// Rewrite every non-overview chunk against the judge's feedback.
    ///
    /// Carries the opponent summary when the judge left one. The overview is
    /// copied through untouched, so `final_chunks` matches `draft_chunks` in
    /// length.
    pub async fn refine(&mut self) -> Result<(), TailorError> {
        self.stage
            .require(&[ConceptStage::Drafted], &self.name, "refine")?;
        if self.inbox.feedback().is_empty() {
            return Err(TailorError::missing_stage(
                &self.name,
                "refine",
                format!("{} (no judge feedback)", self.stage.current()),
            ));
        }

        let skip = usize::from(self.overview.is_some());
        tracing::info!(
            personalizer = %self.name,
            chunks = self.draft_chunks.len() - skip,
            with_opponent_summary = self.inbox.opponent_summary().is_some(),
            "Refining draft"
        );

        let system = prompts::refine_subsection(&self.ctx.interest);
        let calls: Vec<Prompt> = self.draft_chunks[skip..]
            .iter()
            .map(|chunk| {
                self.prompt(
                    system.clone(),
                    prompts::refine_payload(
                        "Subsection",
                        chunk,
                        self.inbox.feedback(),
                        self.inbox.opponent_summary(),
                    ),
                )
            })
            .collect();
        let refined = generate_texts(
            self.ctx.gateway(),
            calls,
            self.ctx.settings.max_concurrency,
        )
        .await?;

        let mut chunks = Vec::with_capacity(self.draft_chunks.len());
        chunks.extend(self.draft_chunks[..skip].iter().cloned());
        chunks.extend(refined);
        let final_draft = join_chunks(&chunks);
        self.ctx
            .store
            .write_scoped(&self.name, ArtifactKind::FinalDraft, &final_draft)?;
        self.final_chunks = chunks;
        self.final_draft = Some(final_draft);
        self.stage.advance(ConceptStage::Refined, None)?;
        Ok(())
    }

    /// Persist `chunks` as the draft, then adopt them.
    fn commit_draft(&mut self, chunks: Vec<String>) -> Result<(), TailorError> {
        let draft = join_chunks(&chunks);
        self.ctx
            .store
            .write_scoped(&self.name, ArtifactKind::Draft, &draft)?;
        self.draft_chunks = chunks;
        self.draft = Some(draft);
        Ok(())
    }
}

fn render_specs(language: Option<&str>, concepts: &[String]) -> String {
    let mut out = format!("Language: {}\nConcepts:\n", language.unwrap_or("none"));
    for concept in concepts {
        out.push_str(&format!("- {concept}\n"));
    }
    out
}

fn render_outline(outline: &[OutlineEntry]) -> String {
    outline
        .iter()
        .map(|entry| {
            let steps = entry
                .layout
                .iter()
                .map(|s| format!("- {s}"))
                .collect::<Vec<_>>()
                .join("\n");
            format!("## {}\n\n{}", entry.concept, steps)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[async_trait]
impl Personalizer for ConceptPersonalizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> PersonalizerKind {
        PersonalizerKind::Concept
    }

    fn stage_label(&self) -> String {
        self.stage.current().to_string()
    }

    fn transitions(&self) -> &[TransitionRecord] {
        self.stage.transitions()
    }

    fn draft(&self) -> Option<&str> {
        self.draft.as_deref()
    }

    fn final_draft(&self) -> Option<&str> {
        self.final_draft.as_deref()
    }

    fn inbox(&self) -> &JudgeInbox {
        &self.inbox
    }

    fn inbox_mut(&mut self) -> &mut JudgeInbox {
        &mut self.inbox
    }

    async fn decompose(&mut self) -> Result<(), TailorError> {
        self.extract_concepts().await
    }

    async fn draft_all(&mut self) -> Result<(), TailorError> {
        let outlined = self.stage.current() == ConceptStage::Outlined;
        self.personalize(outlined).await
    }

    async fn refine_all(&mut self) -> Result<(), TailorError> {
        self.refine().await
    }

    fn finalize(&mut self) -> Result<(), TailorError> {
        self.stage.require(
            &[ConceptStage::Drafted, ConceptStage::Refined],
            &self.name,
            "finalize",
        )?;
        let refined = self.stage.current() == ConceptStage::Refined;
        if !refined {
            self.final_chunks = self.draft_chunks.clone();
            self.final_draft = self.draft.clone();
        }
        let text = self.final_draft.clone().unwrap_or_default();
        self.ctx
            .store
            .write_scoped(&self.name, ArtifactKind::FinalDraft, &text)?;
        self.stage.advance(
            ConceptStage::Finalized,
            Some(if refined { "refined" } else { "unrefined draft" }),
        )?;
        tracing::info!(personalizer = %self.name, chars = text.len(), "Finalized");
        Ok(())
    }
}
