//! Judge against real personalizers: rubric feedback, compete-mode summary
//! routing, and pairwise verdicts.

mod common;

use std::fs;
use std::sync::Arc;

use common::{context, ScriptedGateway};
use tailor_agents::errors::TailorError;
use tailor_agents::gateway::shapes::OutputShape;
use tailor_agents::judge::{Judge, Winner};
use tailor_agents::personalizer::{ConceptPersonalizer, Personalizer, StructurePersonalizer};

async fn finished_pair(
    gw: &Arc<ScriptedGateway>,
    root: &std::path::Path,
) -> (ConceptPersonalizer, StructurePersonalizer, Judge) {
    let ctx = context(gw, root);
    let mut a = ConceptPersonalizer::new("A", Arc::clone(&ctx));
    let mut b = StructurePersonalizer::new("B", Arc::clone(&ctx));
    let judge = Judge::new(ctx);

    a.extract_concepts().await.unwrap();
    a.create_overview().await.unwrap();
    a.personalize(false).await.unwrap();
    judge.give_feedback(&mut a, None).await.unwrap();
    b.personalize().await.unwrap();
    judge.give_feedback(&mut b, None).await.unwrap();
    a.refine().await.unwrap();
    b.refine().await.unwrap();
    a.finalize().unwrap();
    b.finalize().unwrap();
    (a, b, judge)
}

#[tokio::test]
async fn verdict_is_one_of_the_compared_names_or_tie() {
    for (choice, expected) in [
        ("A", Winner::Personalizer("A".into())),
        ("b", Winner::Personalizer("B".into())),
        ("TIE", Winner::Tie),
    ] {
        let tmp = tempfile::tempdir().unwrap();
        let gw = Arc::new(ScriptedGateway::new().with_choice(choice));
        let (a, b, mut judge) = finished_pair(&gw, tmp.path()).await;

        let verdict = judge.compare(&a, &b).await.unwrap().clone();
        assert_eq!(verdict.winner, expected);
        assert_eq!(verdict.explanation, "Clearer progression.");

        let text = fs::read_to_string(tmp.path().join("verdict.txt")).unwrap();
        assert_eq!(
            text,
            format!("Choice: {}\n\nExplanation:\nClearer progression.", expected.label())
        );
    }
}

#[tokio::test]
async fn compare_reads_final_drafts_only() {
    let tmp = tempfile::tempdir().unwrap();
    let gw = Arc::new(ScriptedGateway::new());
    let (a, b, mut judge) = finished_pair(&gw, tmp.path()).await;

    judge.compare(&a, &b).await.unwrap();

    let request = gw.requests().pop().unwrap();
    assert_eq!(request.shape, OutputShape::Verdict);
    assert!(request.user.contains(a.final_draft().unwrap()));
    assert!(request.user.contains(b.final_draft().unwrap()));
}

#[tokio::test]
async fn compare_before_finalize_is_rejected_without_a_call() {
    let tmp = tempfile::tempdir().unwrap();
    let gw = Arc::new(ScriptedGateway::new());
    let ctx = context(&gw, tmp.path());
    let mut a = ConceptPersonalizer::new("A", Arc::clone(&ctx));
    let b = StructurePersonalizer::new("B", Arc::clone(&ctx));
    let mut judge = Judge::new(ctx);
    a.extract_concepts().await.unwrap();
    a.personalize(false).await.unwrap();

    let err = judge.compare(&a, &b).await.unwrap_err();
    assert!(matches!(err, TailorError::MissingStage { operation: "compare", .. }));
    assert_eq!(gw.count(OutputShape::Verdict), 0);
    assert!(judge.verdict().is_none());
}

#[tokio::test]
async fn feedback_before_draft_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let gw = Arc::new(ScriptedGateway::new());
    let ctx = context(&gw, tmp.path());
    let mut b = StructurePersonalizer::new("B", Arc::clone(&ctx));
    let judge = Judge::new(ctx);

    assert!(judge.give_feedback(&mut b, None).await.is_err());
    assert!(judge.give_student_feedback(&mut b).await.is_err());
    assert!(gw.requests().is_empty());
}

#[tokio::test]
async fn compete_summaries_cross_over_and_reach_refinement() {
    let tmp = tempfile::tempdir().unwrap();
    let gw = Arc::new(ScriptedGateway::new());
    let ctx = context(&gw, tmp.path());
    let mut a = ConceptPersonalizer::new("A", Arc::clone(&ctx));
    let mut b = StructurePersonalizer::new("B", Arc::clone(&ctx));
    let judge = Judge::new(ctx);

    a.extract_concepts().await.unwrap();
    a.create_overview().await.unwrap();
    a.personalize(false).await.unwrap();
    judge.give_feedback(&mut a, Some(&mut b)).await.unwrap();

    let about_a = "Summary of a draft starting with # Cooking Up Control Flow";
    assert_eq!(b.inbox().opponent_summary(), Some(about_a));
    assert!(a.inbox().opponent_summary().is_none());
    assert!(!a.inbox().feedback().is_empty());
    assert!(b.inbox().feedback().is_empty());

    b.personalize().await.unwrap();
    judge.give_feedback(&mut b, Some(&mut a)).await.unwrap();
    let about_b = "Summary of a draft starting with # Loops, Simmered";
    assert_eq!(a.inbox().opponent_summary(), Some(about_b));
    assert_eq!(b.inbox().opponent_summary(), Some(about_a));

    a.refine().await.unwrap();
    b.refine().await.unwrap();
    let refines: Vec<_> = gw
        .requests()
        .into_iter()
        .filter(|r| r.user.starts_with("[The Start of Old "))
        .collect();
    assert!(refines
        .iter()
        .filter(|r| r.user.starts_with("[The Start of Old Subsection]"))
        .all(|r| r.user.contains(about_b)));
    assert!(refines
        .iter()
        .filter(|r| r.user.starts_with("[The Start of Old Chapter]"))
        .all(|r| r.user.contains(about_a)));

    assert_eq!(
        fs::read_to_string(tmp.path().join("A/opp_summary.md")).unwrap(),
        about_b
    );
    assert_eq!(
        fs::read_to_string(tmp.path().join("B/opp_summary.md")).unwrap(),
        about_a
    );
    assert_eq!(gw.count(OutputShape::CompetitiveEvaluations), 2);
}

#[tokio::test]
async fn scores_are_written_per_personalizer() {
    let tmp = tempfile::tempdir().unwrap();
    let gw = Arc::new(ScriptedGateway::new());
    let (mut a, mut b, judge) = finished_pair(&gw, tmp.path()).await;
    let feedback_before = a.inbox().feedback().to_string();

    judge.score(&mut a).await.unwrap();
    judge.score(&mut b).await.unwrap();

    assert!(a.inbox().score().contains("Score: 2/3"));
    assert_eq!(a.inbox().feedback(), feedback_before);
    assert!(tmp.path().join("A/score.md").exists());
    assert!(tmp.path().join("B/score.md").exists());
}

#[tokio::test]
async fn both_variants_run_the_same_loop_behind_the_trait() {
    let tmp = tempfile::tempdir().unwrap();
    let gw = Arc::new(ScriptedGateway::new());
    let ctx = context(&gw, tmp.path());
    let judge = Judge::new(Arc::clone(&ctx));
    let mut cast: Vec<Box<dyn Personalizer>> = vec![
        Box::new(ConceptPersonalizer::new("A", Arc::clone(&ctx))),
        Box::new(StructurePersonalizer::new("B", ctx)),
    ];

    for p in cast.iter_mut() {
        p.decompose().await.unwrap();
        p.draft_all().await.unwrap();
        judge.give_feedback(p.as_mut(), None).await.unwrap();
        p.refine_all().await.unwrap();
        p.finalize().unwrap();
    }

    for p in &cast {
        assert_eq!(p.stage_label(), "Finalized");
        assert_ne!(p.final_draft(), p.draft());
        assert!(p.final_draft().unwrap().contains("(refined)"));
    }
    assert_eq!(gw.count(OutputShape::Evaluations), 2);
}
