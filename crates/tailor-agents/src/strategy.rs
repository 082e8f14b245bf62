//! Named end-to-end strategies.
//!
//! A strategy is a fixed, straight-line sequence of personalizer and judge
//! calls. The only runtime decision is which strategy to run; nothing
//! downstream branches on model output. Any error halts the run and leaves
//! the artifacts of completed stages on disk.
//!
//! Personalizer `A` is always the concept variant and `B` the
//! chapter/section variant.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::artifacts::ArtifactKind;
use crate::context::RunContext;
use crate::errors::TailorError;
use crate::judge::Judge;
use crate::personalizer::{ConceptPersonalizer, Personalizer, StructurePersonalizer, Submission};
use crate::report::{write_run_report, RunRecorder, RunReport};

pub const CONCEPT_NAME: &str = "A";
pub const STRUCTURE_NAME: &str = "B";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum Strategy {
    /// Whole-chapter draft with concept analogies spliced in, refined by
    /// student and expert personas.
    Complete,
    /// Outline-guided concept draft against a per-section draft, both
    /// refined on rubric feedback, then compared and scored.
    NoRecomp,
    /// `complete` without the analogy stages.
    NoAnalogy,
    /// `complete` without judging or refinement.
    NoFeedback,
    /// Concept and whole-chapter drafts that see each other's judge summary.
    Compete,
    /// Whole-chapter draft only.
    ChapterOnly,
    /// Whole-chapter draft refined once on rubric feedback.
    ChapterJudged,
    /// Concept draft only.
    ConceptOnly,
    /// Concept draft refined once on rubric feedback.
    ConceptJudged,
}

impl Strategy {
    pub const ALL: [Strategy; 9] = [
        Self::Complete,
        Self::NoRecomp,
        Self::NoAnalogy,
        Self::NoFeedback,
        Self::Compete,
        Self::ChapterOnly,
        Self::ChapterJudged,
        Self::ConceptOnly,
        Self::ConceptJudged,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::NoRecomp => "no_recomp",
            Self::NoAnalogy => "no_analogy",
            Self::NoFeedback => "no_feedback",
            Self::Compete => "compete",
            Self::ChapterOnly => "chapter_only",
            Self::ChapterJudged => "chapter_judged",
            Self::ConceptOnly => "concept_only",
            Self::ConceptJudged => "concept_judged",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a finished run left its artifacts.
#[derive(Debug)]
pub struct RunOutcome {
    pub run_dir: PathBuf,
    pub report: RunReport,
}

/// The three role objects one strategy run works with.
struct Cast {
    a: ConceptPersonalizer,
    b: StructurePersonalizer,
    judge: Judge,
}

impl Cast {
    fn new(ctx: &Arc<RunContext>) -> Self {
        Self {
            a: ConceptPersonalizer::new(CONCEPT_NAME, Arc::clone(ctx)),
            b: StructurePersonalizer::new(STRUCTURE_NAME, Arc::clone(ctx)),
            judge: Judge::new(Arc::clone(ctx)),
        }
    }
}

/// Run `strategy` on the chapter held by `ctx`.
///
/// Writes `strategy.txt` before the first call and `run.json` after the last.
pub async fn run_strategy(
    strategy: Strategy,
    ctx: Arc<RunContext>,
    chapter: &Path,
) -> Result<RunOutcome, TailorError> {
    ctx.store
        .write(None, ArtifactKind::Strategy, &format!("Strategy: {strategy}"))?;
    tracing::info!(
        %strategy,
        interest = %ctx.interest,
        run_dir = %ctx.store.root().display(),
        "Starting run"
    );

    let mut recorder = RunRecorder::new(
        strategy.name(),
        &ctx.interest,
        vec![chapter.display().to_string()],
    );
    let mut cast = Cast::new(&ctx);

    match strategy {
        Strategy::Complete => complete(&mut cast, true, true).await?,
        Strategy::NoAnalogy => complete(&mut cast, false, true).await?,
        Strategy::NoFeedback => complete(&mut cast, true, false).await?,
        Strategy::NoRecomp => no_recomp(&mut cast).await?,
        Strategy::Compete => compete(&mut cast).await?,
        Strategy::ChapterOnly => self::chapter(&mut cast, false).await?,
        Strategy::ChapterJudged => self::chapter(&mut cast, true).await?,
        Strategy::ConceptOnly => concept(&mut cast, false).await?,
        Strategy::ConceptJudged => concept(&mut cast, true).await?,
    }

    for personalizer in [&cast.a as &dyn Personalizer, &cast.b] {
        if !personalizer.transitions().is_empty() {
            recorder.record(personalizer);
        }
    }
    let report = recorder.finish(cast.judge.verdict());
    write_run_report(&report, &ctx.store)?;
    tracing::info!(
        %strategy,
        elapsed_ms = report.elapsed_ms,
        "Personalization completed! All work is saved in {}",
        ctx.store.root().display()
    );
    Ok(RunOutcome {
        run_dir: ctx.store.root().to_path_buf(),
        report,
    })
}

/// Draft `personalizer`, optionally judge and refine it once, then commit.
///
/// Only the common interface is used, so any variant works here once its
/// variant-specific preparation is done.
pub async fn run_personalizer(
    judge: &Judge,
    personalizer: &mut dyn Personalizer,
    judged: bool,
) -> Result<(), TailorError> {
    personalizer.draft_all().await?;
    if judged {
        judge.give_feedback(personalizer, None).await?;
        personalizer.refine_all().await?;
    }
    personalizer.finalize()
}

/// Refine every personalizer on the feedback it holds, then commit each.
async fn refine_and_finalize(mut cast: [&mut dyn Personalizer; 2]) -> Result<(), TailorError> {
    for personalizer in cast.iter_mut() {
        personalizer.refine_all().await?;
    }
    for personalizer in cast.iter_mut() {
        personalizer.finalize()?;
    }
    Ok(())
}

/// `complete` and its ablations.
async fn complete(cast: &mut Cast, analogies: bool, feedback: bool) -> Result<(), TailorError> {
    let Cast { a, b, judge } = cast;
    if analogies {
        a.decompose().await?;
        a.create_analogies().await?;
    }
    // Drafting from a fresh state is monolithic; decomposing afterwards
    // segments the draft so analogies can be spliced in.
    b.draft_all().await?;
    b.decompose().await?;
    if analogies {
        b.insert_analogies(a)?;
    }
    if feedback {
        judge.give_student_feedback(b).await?;
        judge.give_expert_feedback(b).await?;
        b.refine_student().await?;
        b.refine_expert().await?;
    }
    b.finalize()
}

async fn no_recomp(cast: &mut Cast) -> Result<(), TailorError> {
    let Cast { a, b, judge } = cast;
    a.decompose().await?;
    a.write_outline().await?;
    a.create_overview().await?;
    a.draft_all().await?;
    judge.give_feedback(a, None).await?;

    b.decompose().await?;
    b.draft_all().await?;
    judge.give_feedback(b, None).await?;

    refine_and_finalize([&mut *a, &mut *b]).await?;

    judge.compare(a, b).await?;
    judge.score(a).await?;
    judge.score(b).await
}

async fn compete(cast: &mut Cast) -> Result<(), TailorError> {
    let Cast { a, b, judge } = cast;
    a.decompose().await?;
    a.create_overview().await?;
    a.draft_all().await?;
    judge.give_feedback(a, Some(&mut *b)).await?;

    b.draft_all().await?;
    judge.give_feedback(b, Some(&mut *a)).await?;

    refine_and_finalize([&mut *a, &mut *b]).await?;

    judge.compare(a, b).await?;
    Ok(())
}

async fn chapter(cast: &mut Cast, judged: bool) -> Result<(), TailorError> {
    let Cast { b, judge, .. } = cast;
    run_personalizer(judge, b, judged).await
}

async fn concept(cast: &mut Cast, judged: bool) -> Result<(), TailorError> {
    let Cast { a, judge, .. } = cast;
    a.decompose().await?;
    a.create_overview().await?;
    run_personalizer(judge, a, judged).await
}

/// Compare and score two finished chapters from earlier runs.
///
/// Writes `final_draft_paths.txt` first and `run.json` last.
pub async fn run_eval(
    ctx: Arc<RunContext>,
    first_path: &Path,
    second_path: &Path,
) -> Result<RunOutcome, TailorError> {
    ctx.store.write(
        None,
        ArtifactKind::FinalDraftPaths,
        &format!(
            "{CONCEPT_NAME}: {}\n{STRUCTURE_NAME}: {}",
            first_path.display(),
            second_path.display()
        ),
    )?;
    let mut a = Submission::load(CONCEPT_NAME, first_path)?;
    let mut b = Submission::load(STRUCTURE_NAME, second_path)?;
    let mut judge = Judge::new(Arc::clone(&ctx));
    let mut recorder = RunRecorder::new(
        "eval",
        &ctx.interest,
        vec![
            first_path.display().to_string(),
            second_path.display().to_string(),
        ],
    );

    judge.compare(&a, &b).await?;
    judge.score(&mut a).await?;
    judge.score(&mut b).await?;

    recorder.record(&a);
    recorder.record(&b);
    let report = recorder.finish(judge.verdict());
    write_run_report(&report, &ctx.store)?;
    tracing::info!(
        elapsed_ms = report.elapsed_ms,
        "Evaluation completed! All work is saved in {}",
        ctx.store.root().display()
    );
    Ok(RunOutcome {
        run_dir: ctx.store.root().to_path_buf(),
        report,
    })
}
