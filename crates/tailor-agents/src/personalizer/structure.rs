//! Chapter/section personalizer.
//!
//! Rewrites either the whole chapter in one call or one section at a time,
//! preserving the original layout. Sections can come from the reference
//! (before drafting) or from the draft itself (after a monolithic draft),
//! which is what lets concept analogies be spliced in later.

use std::sync::Arc;

use async_trait::async_trait;

use super::concept::{ConceptAnalogy, ConceptPersonalizer};
use super::stage::{StageMachine, StructureStage, TransitionRecord};
use super::{join_chunks, JudgeInbox, Personalizer, PersonalizerKind, CHUNK_SEPARATOR};
use crate::artifacts::ArtifactKind;
use crate::context::RunContext;
use crate::errors::{GatewayError, TailorError};
use crate::gateway::shapes::{OutputShape, SectionList, TextBlock};
use crate::gateway::{generate, generate_texts, Prompt, Role};
use crate::prompts;

use StructureStage::*;

/// Stages in which a draft exists and can still be revised or committed.
const DRAFTED_STAGES: &[StructureStage] = &[Drafted, Segmented, Analogized, Revised];

/// Which feedback channel a persona revision reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Persona {
    Student,
    Expert,
}

impl Persona {
    fn label(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Expert => "expert",
        }
    }

    fn heading(self) -> &'static str {
        match self {
            Self::Student => "Student",
            Self::Expert => "Expert",
        }
    }
}

pub struct StructurePersonalizer {
    name: String,
    ctx: Arc<RunContext>,
    stage: StageMachine<StructureStage>,
    sections: Vec<String>,
    /// Current per-unit text: one entry per section, or the whole chapter
    /// when the draft is monolithic. Revisions rewrite these in place.
    units: Vec<String>,
    monolithic: bool,
    draft: Option<String>,
    revision: Option<String>,
    final_draft: Option<String>,
    inbox: JudgeInbox,
}

impl StructurePersonalizer {
    pub fn new(name: impl Into<String>, ctx: Arc<RunContext>) -> Self {
        Self {
            name: name.into(),
            ctx,
            stage: StageMachine::new(),
            sections: Vec::new(),
            units: Vec::new(),
            monolithic: false,
            draft: None,
            revision: None,
            final_draft: None,
            inbox: JudgeInbox::default(),
        }
    }

    pub fn stage(&self) -> StructureStage {
        self.stage.current()
    }

    pub fn sections(&self) -> &[String] {
        &self.sections
    }

    pub fn units(&self) -> &[String] {
        &self.units
    }

    pub fn is_monolithic(&self) -> bool {
        self.monolithic
    }

    /// Latest refinement output, if any refinement has run.
    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }

    fn prompt(&self, system: impl Into<String>, user: impl Into<String>) -> Prompt {
        Prompt::new(Role::Personalizer, system, user)
    }

    /// Split into mutually exclusive sections.
    ///
    /// Before drafting this splits the reference chapter, so `personalize`
    /// works section by section. After a draft exists it splits the draft
    /// itself, leaving the draft text unchanged.
    pub async fn extract_sections(&mut self) -> Result<(), TailorError> {
        self.stage
            .require(&[Fresh, Drafted], &self.name, "extract_sections")?;
        let segmenting_draft = self.stage.current() == Drafted;
        let source = match (segmenting_draft, self.draft.as_deref()) {
            (true, Some(draft)) => draft.to_string(),
            _ => self.ctx.require_reference()?.to_string(),
        };
        tracing::info!(
            personalizer = %self.name,
            source = if segmenting_draft { "draft" } else { "reference" },
            "Extracting sections"
        );

        let prompt = self
            .prompt(prompts::EXTRACT_SECTIONS, source)
            .with_temperature(self.ctx.settings.extraction_temperature);
        let list: SectionList = generate(self.ctx.gateway(), prompt).await?;
        let sections: Vec<String> = list
            .sections
            .into_iter()
            .filter(|s| !s.trim().is_empty())
            .collect();
        if sections.is_empty() {
            return Err(GatewayError::schema(OutputShape::Sections, "no sections returned").into());
        }

        self.sections = sections;
        if segmenting_draft {
            self.units = self.sections.clone();
            self.monolithic = false;
            self.stage.advance(
                Segmented,
                Some(&format!("{} sections of draft", self.sections.len())),
            )?;
        } else {
            self.stage.advance(
                Sectioned,
                Some(&format!("{} sections of reference", self.sections.len())),
            )?;
        }
        tracing::info!(
            personalizer = %self.name,
            sections = self.sections.len(),
            "Sections extracted"
        );
        Ok(())
    }

    /// Personalize the chapter, keeping its layout.
    ///
    /// One call for the whole chapter when no sections were extracted,
    /// otherwise one call per section joined in section order.
    pub async fn personalize(&mut self) -> Result<(), TailorError> {
        self.stage
            .require(&[Fresh, Sectioned], &self.name, "personalize")?;

        let monolithic = self.stage.current() == Fresh;
        let units = if monolithic {
            let reference = self.ctx.require_reference()?;
            tracing::info!(personalizer = %self.name, "Personalizing whole chapter");
            let prompt = self.prompt(prompts::personalize_chapter(&self.ctx.interest), reference);
            let block: TextBlock = generate(self.ctx.gateway(), prompt).await?;
            vec![block.text]
        } else {
            tracing::info!(
                personalizer = %self.name,
                sections = self.sections.len(),
                "Personalizing section by section"
            );
            let system = prompts::personalize_section(&self.ctx.interest);
            let calls: Vec<Prompt> = self
                .sections
                .iter()
                .map(|section| self.prompt(system.clone(), section.clone()))
                .collect();
            generate_texts(
                self.ctx.gateway(),
                calls,
                self.ctx.settings.max_concurrency,
            )
            .await?
        };

        let draft = join_chunks(&units);
        self.ctx
            .store
            .write_scoped(&self.name, ArtifactKind::Draft, &draft)?;
        self.units = units;
        self.monolithic = monolithic;
        self.draft = Some(draft);
        self.stage.advance(
            Drafted,
            Some(if monolithic { "monolithic" } else { "per section" }),
        )?;
        Ok(())
    }

    /// Append each of `other`'s analogies after the first section naming its
    /// concept.
    ///
    /// The combined text becomes the draft that feedback is given on.
    pub fn insert_analogies(&mut self, other: &ConceptPersonalizer) -> Result<(), TailorError> {
        self.stage
            .require(&[Drafted, Segmented], &self.name, "insert_analogies")?;
        if self.monolithic {
            return Err(TailorError::missing_stage(
                &self.name,
                "insert_analogies",
                format!("{} (draft not segmented)", self.stage.current()),
            ));
        }
        let analogies = other.analogies().ok_or_else(|| {
            TailorError::missing_stage(other.name(), "insert_analogies", other.stage())
        })?;

        let units = splice_analogies(&self.units, analogies);
        let combined = join_chunks(&units);
        self.ctx
            .store
            .write_scoped(&self.name, ArtifactKind::DraftAnalogy, &combined)?;
        self.units = units;
        self.draft = Some(combined);
        self.stage.advance(
            Analogized,
            Some(&format!("{} analogies offered", analogies.len())),
        )?;
        tracing::info!(
            personalizer = %self.name,
            from = %other.name(),
            "Analogies inserted"
        );
        Ok(())
    }

    /// Minor per-unit edits driven only by the student persona's feedback.
    pub async fn refine_student(&mut self) -> Result<(), TailorError> {
        self.revise_with_persona(Persona::Student).await
    }

    /// Minor per-unit edits driven only by the expert persona's feedback.
    pub async fn refine_expert(&mut self) -> Result<(), TailorError> {
        self.revise_with_persona(Persona::Expert).await
    }

    async fn revise_with_persona(&mut self, persona: Persona) -> Result<(), TailorError> {
        let (operation, feedback, system) = match persona {
            Persona::Student => (
                "refine_student",
                self.inbox.student_feedback(),
                prompts::refine_from_student(&self.ctx.interest),
            ),
            Persona::Expert => (
                "refine_expert",
                self.inbox.expert_feedback(),
                prompts::refine_from_expert(&self.ctx.interest),
            ),
        };
        self.stage.require(DRAFTED_STAGES, &self.name, operation)?;
        if feedback.is_empty() {
            return Err(TailorError::missing_stage(
                &self.name,
                operation,
                format!("{} (no {} feedback)", self.stage.current(), persona.label()),
            ));
        }
        tracing::info!(
            personalizer = %self.name,
            units = self.units.len(),
            persona = persona.label(),
            "Refining draft based on persona feedback"
        );

        let calls: Vec<Prompt> = self
            .units
            .iter()
            .map(|unit| {
                self.prompt(
                    system.clone(),
                    prompts::persona_refine_payload(unit, persona.heading(), feedback),
                )
            })
            .collect();
        let revised = generate_texts(
            self.ctx.gateway(),
            calls,
            self.ctx.settings.max_concurrency,
        )
        .await?;
        self.commit_revision(revised, operation)
    }

    /// Rewrite against the rubric feedback and any opponent summary.
    pub async fn refine(&mut self) -> Result<(), TailorError> {
        self.stage.require(DRAFTED_STAGES, &self.name, "refine")?;
        if self.inbox.feedback().is_empty() {
            return Err(TailorError::missing_stage(
                &self.name,
                "refine",
                format!("{} (no judge feedback)", self.stage.current()),
            ));
        }
        let (system, label) = if self.monolithic {
            (prompts::refine_chapter(&self.ctx.interest), "Chapter")
        } else {
            (prompts::refine_section(&self.ctx.interest), "Section")
        };
        tracing::info!(
            personalizer = %self.name,
            units = self.units.len(),
            with_opponent_summary = self.inbox.opponent_summary().is_some(),
            "Refining draft"
        );

        let calls: Vec<Prompt> = self
            .units
            .iter()
            .map(|unit| {
                self.prompt(
                    system.clone(),
                    prompts::refine_payload(
                        label,
                        unit,
                        self.inbox.feedback(),
                        self.inbox.opponent_summary(),
                    ),
                )
            })
            .collect();
        let revised = generate_texts(
            self.ctx.gateway(),
            calls,
            self.ctx.settings.max_concurrency,
        )
        .await?;
        self.commit_revision(revised, "refine")
    }

    fn commit_revision(&mut self, units: Vec<String>, reason: &str) -> Result<(), TailorError> {
        self.revision = Some(join_chunks(&units));
        self.units = units;
        self.stage.advance(Revised, Some(reason))
    }
}

/// Attach each analogy to the first unit whose text contains its concept name.
///
/// Every unit is kept in order. Matched analogies follow their unit, one
/// blank line apart, in analogy order; analogies whose concept appears in no
/// unit are dropped. Matching is plain case-sensitive substring containment.
pub fn splice_analogies(units: &[String], analogies: &[ConceptAnalogy]) -> Vec<String> {
    let mut spliced: Vec<String> = units.to_vec();
    for analogy in analogies {
        let target = units.iter().position(|u| u.contains(&analogy.concept));
        match target {
            Some(idx) => {
                spliced[idx].push_str(CHUNK_SEPARATOR);
                spliced[idx].push_str(&analogy.text);
            }
            None => {
                tracing::debug!(concept = %analogy.concept, "No section mentions concept, skipping analogy");
            }
        }
    }
    spliced
}

#[async_trait]
impl Personalizer for StructurePersonalizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> PersonalizerKind {
        PersonalizerKind::Structure
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
        self.extract_sections().await
    }

    async fn draft_all(&mut self) -> Result<(), TailorError> {
        self.personalize().await
    }

    async fn refine_all(&mut self) -> Result<(), TailorError> {
        self.refine().await
    }

    fn finalize(&mut self) -> Result<(), TailorError> {
        self.stage.require(DRAFTED_STAGES, &self.name, "finalize")?;
        let text = self
            .revision
            .clone()
            .or_else(|| self.draft.clone())
            .unwrap_or_default();
        self.ctx
            .store
            .write_scoped(&self.name, ArtifactKind::FinalDraft, &text)?;
        let reason = if self.revision.is_some() {
            "latest revision"
        } else {
            "unrefined draft"
        };
        self.final_draft = Some(text);
        self.stage.advance(Finalized, Some(reason))?;
        tracing::info!(personalizer = %self.name, reason, "Finalized");
        Ok(())
    }
}
