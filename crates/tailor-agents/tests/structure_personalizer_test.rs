//! Chapter/section personalizer: monolithic and per-section drafting,
//! segmentation, analogy splicing, and persona-driven revisions.

mod common;

use std::fs;
use std::sync::Arc;

use common::{context, ScriptedGateway, MONOLITHIC_DRAFT};
use tailor_agents::errors::TailorError;
use tailor_agents::gateway::shapes::OutputShape;
use tailor_agents::judge::Judge;
use tailor_agents::personalizer::stage::StructureStage;
use tailor_agents::personalizer::{
    join_chunks, ConceptPersonalizer, Personalizer, StructurePersonalizer,
};

#[tokio::test]
async fn monolithic_draft_is_segmented_then_gets_analogies() {
    let tmp = tempfile::tempdir().unwrap();
    let gw = Arc::new(ScriptedGateway::new());
    let ctx = context(&gw, tmp.path());
    let mut a = ConceptPersonalizer::new("A", Arc::clone(&ctx));
    let mut b = StructurePersonalizer::new("B", ctx);

    a.extract_concepts().await.unwrap();
    a.create_analogies().await.unwrap();

    b.personalize().await.unwrap();
    assert!(b.is_monolithic());
    assert_eq!(b.draft(), Some(MONOLITHIC_DRAFT));
    assert_eq!(gw.count(OutputShape::Text), 2 + 1);

    b.extract_sections().await.unwrap();
    assert_eq!(b.stage(), StructureStage::Segmented);
    assert!(!b.is_monolithic());
    assert_eq!(b.units().len(), 3);
    // Segmenting leaves the draft text as it was.
    assert_eq!(b.draft(), Some(MONOLITHIC_DRAFT));

    b.insert_analogies(&a).unwrap();
    assert_eq!(b.stage(), StructureStage::Analogized);
    let units = b.units();
    assert_eq!(units[0], "# Loops, Simmered");
    assert_eq!(
        units[1],
        "## Recursion\n\nA recipe that calls itself.\n\nThink of Recursion like a recipe."
    );
    assert_eq!(
        units[2],
        "## Iteration\n\nStirring until the sauce thickens.\n\nThink of Iteration like a recipe."
    );
    assert_eq!(b.draft(), Some(join_chunks(units).as_str()));

    let combined = fs::read_to_string(tmp.path().join("B/draft_analogy.md")).unwrap();
    assert_eq!(Some(combined.as_str()), b.draft());
    let first_pass = fs::read_to_string(tmp.path().join("B/draft.md")).unwrap();
    assert_eq!(first_pass, MONOLITHIC_DRAFT);
}

#[tokio::test]
async fn per_section_drafting_follows_reference_sections() {
    let tmp = tempfile::tempdir().unwrap();
    let gw = Arc::new(ScriptedGateway::new());
    let mut b = StructurePersonalizer::new("B", context(&gw, tmp.path()));

    b.extract_sections().await.unwrap();
    assert_eq!(b.stage(), StructureStage::Sectioned);
    assert_eq!(b.sections().len(), 3);
    assert!(b.sections()[1].starts_with("## Recursion"));
    assert!(b.sections()[1].contains("```java"));

    b.personalize().await.unwrap();
    assert!(!b.is_monolithic());
    assert_eq!(b.units().len(), 3);
    for (section, unit) in b.sections().iter().zip(b.units()) {
        assert_eq!(unit, &format!("{section} (personalized)"));
    }
    assert_eq!(gw.count(OutputShape::Text), 3);
}

#[tokio::test]
async fn sections_extraction_is_greedy() {
    let tmp = tempfile::tempdir().unwrap();
    let gw = Arc::new(ScriptedGateway::new());
    let mut b = StructurePersonalizer::new("B", context(&gw, tmp.path()));

    b.extract_sections().await.unwrap();

    let request = &gw.requests()[0];
    assert_eq!(request.shape, OutputShape::Sections);
    assert_eq!(request.temperature, Some(0.0));
}

#[tokio::test]
async fn insert_before_analogies_exist_names_the_other_personalizer() {
    let tmp = tempfile::tempdir().unwrap();
    let gw = Arc::new(ScriptedGateway::new());
    let ctx = context(&gw, tmp.path());
    let mut a = ConceptPersonalizer::new("A", Arc::clone(&ctx));
    let mut b = StructurePersonalizer::new("B", ctx);
    a.extract_concepts().await.unwrap();
    b.personalize().await.unwrap();
    b.extract_sections().await.unwrap();

    match b.insert_analogies(&a) {
        Err(TailorError::MissingStage { personalizer, .. }) => assert_eq!(personalizer, "A"),
        other => panic!("expected MissingStage, got {other:?}"),
    }
    assert_eq!(b.stage(), StructureStage::Segmented);
}

#[tokio::test]
async fn unsegmented_monolithic_draft_rejects_analogies() {
    let tmp = tempfile::tempdir().unwrap();
    let gw = Arc::new(ScriptedGateway::new());
    let ctx = context(&gw, tmp.path());
    let mut a = ConceptPersonalizer::new("A", Arc::clone(&ctx));
    let mut b = StructurePersonalizer::new("B", ctx);
    a.extract_concepts().await.unwrap();
    a.create_analogies().await.unwrap();
    b.personalize().await.unwrap();

    let err = b.insert_analogies(&a).unwrap_err();
    assert!(err.to_string().contains("draft not segmented"));
    assert_eq!(b.draft(), Some(MONOLITHIC_DRAFT));
}

#[tokio::test]
async fn persona_refine_requires_its_own_feedback() {
    let tmp = tempfile::tempdir().unwrap();
    let gw = Arc::new(ScriptedGateway::new());
    let mut b = StructurePersonalizer::new("B", context(&gw, tmp.path()));
    b.personalize().await.unwrap();
    b.inbox_mut().append_expert_feedback("Expert only.");
    let before = gw.requests().len();

    let err = b.refine_student().await.unwrap_err();
    assert!(matches!(
        err,
        TailorError::MissingStage {
            operation: "refine_student",
            ..
        }
    ));
    assert!(err.to_string().contains("no student feedback"));
    assert!(matches!(
        b.refine().await,
        Err(TailorError::MissingStage { operation: "refine", .. })
    ));
    assert_eq!(gw.requests().len(), before);
}

#[tokio::test]
async fn persona_revisions_stack_and_leave_draft_alone() {
    let tmp = tempfile::tempdir().unwrap();
    let gw = Arc::new(ScriptedGateway::new());
    let ctx = context(&gw, tmp.path());
    let judge = Judge::new(Arc::clone(&ctx));
    let mut b = StructurePersonalizer::new("B", ctx);

    b.personalize().await.unwrap();
    b.extract_sections().await.unwrap();
    judge.give_student_feedback(&mut b).await.unwrap();
    judge.give_expert_feedback(&mut b).await.unwrap();
    assert_eq!(b.inbox().student_feedback(), "The recursion section lost me.");
    assert_eq!(b.inbox().expert_feedback(), "The base case is never stated.");

    b.refine_student().await.unwrap();
    b.refine_expert().await.unwrap();
    assert_eq!(b.stage(), StructureStage::Revised);
    for unit in b.units() {
        assert!(unit.ends_with(" (refined) (refined)"));
    }

    let student_calls: Vec<_> = gw
        .requests()
        .into_iter()
        .filter(|r| r.system.contains("A student gave you feedback"))
        .collect();
    assert_eq!(student_calls.len(), 3);
    assert!(student_calls
        .iter()
        .all(|r| r.user.contains("The recursion section lost me.")
            && !r.user.contains("The base case is never stated.")));

    b.finalize().unwrap();
    assert_eq!(b.final_draft(), b.revision());
    assert_eq!(b.draft(), Some(MONOLITHIC_DRAFT));
    let on_disk = fs::read_to_string(tmp.path().join("B/final_draft.md")).unwrap();
    assert_eq!(Some(on_disk.as_str()), b.final_draft());
}

#[tokio::test]
async fn monolithic_refine_rewrites_the_whole_chapter() {
    let tmp = tempfile::tempdir().unwrap();
    let gw = Arc::new(ScriptedGateway::new());
    let mut b = StructurePersonalizer::new("B", context(&gw, tmp.path()));
    b.personalize().await.unwrap();
    b.inbox_mut().append_feedback("Too few examples.");

    b.refine().await.unwrap();

    let last = gw.requests().pop().unwrap();
    assert!(last.user.starts_with("[The Start of Old Chapter]"));
    assert_eq!(b.revision(), Some(format!("{MONOLITHIC_DRAFT} (refined)").as_str()));
}

#[tokio::test]
async fn finalize_without_refinement_commits_draft() {
    let tmp = tempfile::tempdir().unwrap();
    let gw = Arc::new(ScriptedGateway::new());
    let mut b = StructurePersonalizer::new("B", context(&gw, tmp.path()));

    assert!(matches!(
        b.finalize(),
        Err(TailorError::MissingStage { .. })
    ));
    b.personalize().await.unwrap();
    b.finalize().unwrap();

    assert_eq!(b.final_draft(), Some(MONOLITHIC_DRAFT));
    assert_eq!(b.stage(), StructureStage::Finalized);
    assert!(b.personalize().await.is_err());
}

#[tokio::test]
async fn persona_revisions_label_whose_feedback_they_carry() {
    let tmp = tempfile::tempdir().unwrap();
    let gw = Arc::new(ScriptedGateway::new());
    let mut b = StructurePersonalizer::new("B", context(&gw, tmp.path()));
    b.personalize().await.unwrap();
    b.inbox_mut().append_student_feedback("Slow down.");
    b.inbox_mut().append_expert_feedback("State the base case.");

    b.refine_student().await.unwrap();
    b.refine_expert().await.unwrap();

    let requests = gw.requests();
    let expert = requests.last().unwrap();
    let student = &requests[requests.len() - 2];
    assert!(student.user.contains("[The Start of Student Feedback]\nSlow down.\n"));
    assert!(expert.user.contains("[The Start of Expert Feedback]\nState the base case.\n"));
    assert!(!expert.user.contains("[The Start of Feedback]"));
}

#[tokio::test]
async fn unwritable_draft_leaves_state_untouched() {
    let tmp = tempfile::tempdir().unwrap();
    let gw = Arc::new(ScriptedGateway::new());
    let mut b = StructurePersonalizer::new("B", context(&gw, tmp.path()));
    fs::create_dir_all(tmp.path().join("B/draft.md")).unwrap();

    let err = b.personalize().await.unwrap_err();
    assert!(matches!(err, TailorError::Artifact { .. }));
    assert!(b.units().is_empty());
    assert!(!b.is_monolithic());
    assert_eq!(b.draft(), None);
    assert_eq!(b.stage(), StructureStage::Fresh);
}

#[tokio::test]
async fn failed_section_call_keeps_previous_state() {
    let tmp = tempfile::tempdir().unwrap();
    let gw = Arc::new(ScriptedGateway::new().failing_on(OutputShape::Sections));
    let mut b = StructurePersonalizer::new("B", context(&gw, tmp.path()));

    assert!(b.extract_sections().await.unwrap_err().is_gateway());
    assert_eq!(b.stage(), StructureStage::Fresh);
    assert!(b.sections().is_empty());
}
