//! Personalizers: the role objects that rewrite a chapter for one interest.
//!
//! Two decomposition variants sit behind one [`Personalizer`] interface so
//! the judge and the strategy runner never depend on which one they hold:
//!
//! | Variant                  | Unit of rewriting      | Decomposition call  |
//! |--------------------------|------------------------|---------------------|
//! | [`ConceptPersonalizer`]  | one technical concept  | `extract_concepts`  |
//! | [`StructurePersonalizer`]| whole chapter/section  | `extract_sections`  |
//! | [`Submission`]           | none (imported draft)  | none                |
//!
//! ## Draft contract
//!
//! `draft` is the first-pass output and refinement never overwrites it.
//! Refinement writes a separate revision; `final_draft` is set only by
//! `finalize()` (and, for the concept variant, by `refine()`), and always
//! holds the latest revision or the draft when nothing was refined.
//!
//! Each step writes its artifact before adopting the new state, so a failed
//! write leaves the personalizer as it was.

pub mod concept;
pub mod stage;
pub mod structure;
pub mod submission;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::TailorError;
use stage::TransitionRecord;

pub use concept::{ConceptAnalogy, ConceptPersonalizer};
pub use structure::{splice_analogies, StructurePersonalizer};
pub use submission::Submission;

/// Separator between rewritten units in a joined draft.
pub const CHUNK_SEPARATOR: &str = "\n\n";

/// Join per-unit texts into one chapter, one blank line between units.
pub fn join_chunks(chunks: &[String]) -> String {
    chunks.join(CHUNK_SEPARATOR)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonalizerKind {
    Concept,
    Structure,
    Submission,
}

/// Fields the judge writes into a personalizer.
///
/// This is the only state that crosses from the judge into a personalizer.
/// Every channel except the opponent summary is append-only; the opponent
/// summary is written by the judge while it evaluates the *other*
/// personalizer and is read only by this personalizer's own refinement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JudgeInbox {
    feedback: String,
    student_feedback: String,
    expert_feedback: String,
    opponent_summary: Option<String>,
    score: String,
}

impl JudgeInbox {
    pub fn append_feedback(&mut self, text: &str) {
        self.feedback.push_str(text);
    }

    pub fn append_student_feedback(&mut self, text: &str) {
        append_block(&mut self.student_feedback, text);
    }

    pub fn append_expert_feedback(&mut self, text: &str) {
        append_block(&mut self.expert_feedback, text);
    }

    pub fn set_opponent_summary(&mut self, summary: impl Into<String>) {
        self.opponent_summary = Some(summary.into());
    }

    pub fn append_score(&mut self, text: &str) {
        self.score.push_str(text);
    }

    pub fn feedback(&self) -> &str {
        &self.feedback
    }

    pub fn student_feedback(&self) -> &str {
        &self.student_feedback
    }

    pub fn expert_feedback(&self) -> &str {
        &self.expert_feedback
    }

    pub fn opponent_summary(&self) -> Option<&str> {
        self.opponent_summary.as_deref()
    }

    pub fn score(&self) -> &str {
        &self.score
    }
}

fn append_block(channel: &mut String, text: &str) {
    if !channel.is_empty() {
        channel.push_str(CHUNK_SEPARATOR);
    }
    channel.push_str(text.trim());
}

/// Common contract of every personalizer variant.
#[async_trait]
pub trait Personalizer: Send + Sync {
    /// Label used in prompts, logs, and as the artifact sub-directory.
    fn name(&self) -> &str;

    fn kind(&self) -> PersonalizerKind;

    /// Current stage, rendered for logs and reports.
    fn stage_label(&self) -> String;

    fn transitions(&self) -> &[TransitionRecord];

    /// First-pass personalized chapter, once drafted.
    fn draft(&self) -> Option<&str>;

    /// Committed output, once finalized.
    fn final_draft(&self) -> Option<&str>;

    fn inbox(&self) -> &JudgeInbox;

    fn inbox_mut(&mut self) -> &mut JudgeInbox;

    /// Split the chapter into the variant's units.
    async fn decompose(&mut self) -> Result<(), TailorError>;

    /// Produce the first-pass draft.
    async fn draft_all(&mut self) -> Result<(), TailorError>;

    /// Rewrite the latest text against the judge's rubric feedback.
    async fn refine_all(&mut self) -> Result<(), TailorError>;

    /// Commit the latest text as `final_draft` and persist it.
    fn finalize(&mut self) -> Result<(), TailorError>;
}
