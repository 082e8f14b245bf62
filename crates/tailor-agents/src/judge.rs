//! The judge: rubric feedback, persona critiques, pairwise verdicts, and
//! terminal scores.
//!
//! The judge reads a personalizer's `draft` or `final_draft` and writes only
//! through its [`JudgeInbox`](crate::personalizer::JudgeInbox). Each inbox
//! field is assigned after a complete, validated response; a failed call
//! leaves every personalizer untouched.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::artifacts::ArtifactKind;
use crate::context::RunContext;
use crate::errors::{GatewayError, TailorError};
use crate::gateway::shapes::{
    CompetitiveEvaluations, Evaluation, Evaluations, OutputShape, TextBlock, Verdict,
};
use crate::gateway::{generate, Prompt, Role};
use crate::personalizer::Personalizer;
use crate::prompts;

/// The tie token the comparison prompt asks for.
pub const TIE: &str = "TIE";

/// Outcome of a pairwise comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Winner {
    Personalizer(String),
    Tie,
}

impl Winner {
    /// The personalizer name, or `TIE`.
    pub fn label(&self) -> &str {
        match self {
            Self::Personalizer(name) => name,
            Self::Tie => TIE,
        }
    }
}

impl fmt::Display for Winner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonVerdict {
    pub first: String,
    pub second: String,
    pub winner: Winner,
    pub explanation: String,
}

impl ComparisonVerdict {
    /// `verdict.txt` contents.
    pub fn render(&self) -> String {
        format!(
            "Choice: {}\n\nExplanation:\n{}",
            self.winner.label(),
            self.explanation
        )
    }
}

/// Resolve the model's `choice` against the two names being compared.
///
/// Case-insensitive after trimming whitespace and quotes. Anything that is
/// neither name nor `TIE` is a schema violation.
pub fn parse_choice(choice: &str, first: &str, second: &str) -> Result<Winner, GatewayError> {
    let token = choice.trim().trim_matches(|c| c == '\'' || c == '"').trim();
    if token.eq_ignore_ascii_case(first) {
        Ok(Winner::Personalizer(first.to_string()))
    } else if token.eq_ignore_ascii_case(second) {
        Ok(Winner::Personalizer(second.to_string()))
    } else if token.eq_ignore_ascii_case(TIE) {
        Ok(Winner::Tie)
    } else {
        Err(GatewayError::schema(
            OutputShape::Verdict,
            format!("choice `{choice}` is neither `{first}`, `{second}` nor `{TIE}`"),
        ))
    }
}

fn render_evaluations(evals: &[Evaluation]) -> String {
    evals.iter().map(Evaluation::to_markdown).collect()
}

pub struct Judge {
    ctx: Arc<RunContext>,
    verdict: Option<ComparisonVerdict>,
}

impl Judge {
    pub fn new(ctx: Arc<RunContext>) -> Self {
        Self { ctx, verdict: None }
    }

    /// Verdict of the last comparison, if one ran.
    pub fn verdict(&self) -> Option<&ComparisonVerdict> {
        self.verdict.as_ref()
    }

    fn prompt(&self, system: String, user: String) -> Prompt {
        Prompt::new(Role::Judge, system, user)
    }

    fn require_draft<'a>(
        target: &'a dyn Personalizer,
        operation: &'static str,
    ) -> Result<&'a str, TailorError> {
        target
            .draft()
            .ok_or_else(|| TailorError::missing_stage(target.name(), operation, target.stage_label()))
    }

    fn require_final<'a>(
        target: &'a dyn Personalizer,
        operation: &'static str,
    ) -> Result<&'a str, TailorError> {
        target
            .final_draft()
            .ok_or_else(|| TailorError::missing_stage(target.name(), operation, target.stage_label()))
    }

    /// Score `target`'s draft on the rubric and append the result to its
    /// feedback.
    ///
    /// With a `rival`, the judge also writes a summary of `target`'s draft
    /// into the rival's inbox, never into `target`'s own.
    pub async fn give_feedback(
        &self,
        target: &mut dyn Personalizer,
        rival: Option<&mut dyn Personalizer>,
    ) -> Result<(), TailorError> {
        let draft = Self::require_draft(target, "give_feedback")?;
        let compete = rival.is_some();
        tracing::info!(personalizer = %target.name(), compete, "Judge giving feedback");

        let prompt = self.prompt(
            prompts::rubric_feedback(&self.ctx.interest, compete),
            prompts::evaluation_payload(&self.ctx.reference_text, draft),
        );

        let (feedback, summary) = if compete {
            let res: CompetitiveEvaluations = generate(self.ctx.gateway(), prompt).await?;
            (render_evaluations(&res.evals), Some(res.summary))
        } else {
            let res: Evaluations = generate(self.ctx.gateway(), prompt).await?;
            (render_evaluations(&res.evals), None)
        };

        target.inbox_mut().append_feedback(&feedback);
        if let (Some(rival), Some(summary)) = (rival, summary) {
            rival.inbox_mut().set_opponent_summary(summary.clone());
            self.ctx
                .store
                .write_scoped(rival.name(), ArtifactKind::OpponentSummary, &summary)?;
            tracing::info!(
                from = %target.name(),
                to = %rival.name(),
                "Judge summary handed to rival"
            );
        }
        self.ctx.store.write_scoped(
            target.name(),
            ArtifactKind::Feedback,
            target.inbox().feedback(),
        )?;
        Ok(())
    }

    /// Free-text critique from a student new to the CS content.
    pub async fn give_student_feedback(
        &self,
        target: &mut dyn Personalizer,
    ) -> Result<(), TailorError> {
        let draft = Self::require_draft(target, "give_student_feedback")?;
        tracing::info!(personalizer = %target.name(), "Student persona reviewing draft");
        let prompt = self.prompt(
            prompts::student_feedback(&self.ctx.interest),
            prompts::delimited("Modified Chapter", draft),
        );
        let block: TextBlock = generate(self.ctx.gateway(), prompt).await?;

        target.inbox_mut().append_student_feedback(&block.text);
        self.ctx.store.write_scoped(
            target.name(),
            ArtifactKind::StudentFeedback,
            target.inbox().student_feedback(),
        )?;
        Ok(())
    }

    /// Free-text critique from an expert in both fields, against the reference.
    pub async fn give_expert_feedback(
        &self,
        target: &mut dyn Personalizer,
    ) -> Result<(), TailorError> {
        let draft = Self::require_draft(target, "give_expert_feedback")?;
        tracing::info!(personalizer = %target.name(), "Expert persona reviewing draft");
        let prompt = self.prompt(
            prompts::expert_feedback(&self.ctx.interest),
            prompts::evaluation_payload(&self.ctx.reference_text, draft),
        );
        let block: TextBlock = generate(self.ctx.gateway(), prompt).await?;

        target.inbox_mut().append_expert_feedback(&block.text);
        self.ctx.store.write_scoped(
            target.name(),
            ArtifactKind::ExpertFeedback,
            target.inbox().expert_feedback(),
        )?;
        Ok(())
    }

    /// Pick the final draft that teaches the CS content better, or a tie.
    pub async fn compare(
        &mut self,
        first: &dyn Personalizer,
        second: &dyn Personalizer,
    ) -> Result<&ComparisonVerdict, TailorError> {
        let first_text = Self::require_final(first, "compare")?;
        let second_text = Self::require_final(second, "compare")?;
        tracing::info!(first = %first.name(), second = %second.name(), "Judge comparing final drafts");

        let prompt = self.prompt(
            prompts::compare(&self.ctx.interest, first.name(), second.name()),
            prompts::compare_payload(first.name(), first_text, second.name(), second_text),
        );
        let raw: Verdict = generate(self.ctx.gateway(), prompt).await?;
        let winner = parse_choice(&raw.choice, first.name(), second.name())?;

        let verdict = ComparisonVerdict {
            first: first.name().to_string(),
            second: second.name().to_string(),
            winner,
            explanation: raw.explanation,
        };
        self.ctx
            .store
            .write(None, ArtifactKind::Verdict, &verdict.render())?;
        tracing::info!(winner = %verdict.winner, "Verdict reached");
        Ok(self.verdict.insert(verdict))
    }

    /// Terminal rubric score of `target`'s final draft.
    pub async fn score(&self, target: &mut dyn Personalizer) -> Result<(), TailorError> {
        let final_draft = Self::require_final(target, "score")?;
        tracing::info!(personalizer = %target.name(), "Judge scoring final draft");
        let prompt = self.prompt(
            prompts::rubric_feedback(&self.ctx.interest, false),
            prompts::evaluation_payload(&self.ctx.reference_text, final_draft),
        );
        let res: Evaluations = generate(self.ctx.gateway(), prompt).await?;

        target
            .inbox_mut()
            .append_score(&render_evaluations(&res.evals));
        self.ctx
            .store
            .write_scoped(target.name(), ArtifactKind::Score, target.inbox().score())?;
        Ok(())
    }
}
