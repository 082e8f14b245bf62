//! Structured run report written as `run.json` at the end of every run.
//!
//! Captures what ran and how it ended so a run directory can be traced back
//! to its strategy, prompt wording, and personalizer stage history.

use std::path::PathBuf;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::artifacts::{ArtifactKind, ArtifactStore};
use crate::errors::TailorError;
use crate::gateway::shapes::SHAPE_VERSION;
use crate::judge::ComparisonVerdict;
use crate::personalizer::stage::TransitionRecord;
use crate::personalizer::{Personalizer, PersonalizerKind};
use crate::prompts::PROMPT_VERSION;

/// Current schema version for `run.json`. Bump when fields change.
pub const REPORT_SCHEMA_VERSION: u8 = 1;

/// Stage history of one personalizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonalizerRecord {
    pub name: String,
    pub kind: PersonalizerKind,
    pub final_stage: String,
    pub transitions: Vec<TransitionRecord>,
    pub finalized: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub schema_version: u8,
    pub prompt_version: String,
    pub shape_version: u32,
    pub strategy: String,
    pub interest: String,
    /// Chapter source path, or the two draft paths for an eval run.
    pub inputs: Vec<String>,
    pub personalizers: Vec<PersonalizerRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verdict: Option<ComparisonVerdict>,
    pub elapsed_ms: u64,
}

/// Accumulates a report while a strategy runs.
pub struct RunRecorder {
    strategy: String,
    interest: String,
    inputs: Vec<String>,
    personalizers: Vec<PersonalizerRecord>,
    started: Instant,
}

impl RunRecorder {
    pub fn new(strategy: &str, interest: &str, inputs: Vec<String>) -> Self {
        Self {
            strategy: strategy.to_string(),
            interest: interest.to_string(),
            inputs,
            personalizers: Vec::new(),
            started: Instant::now(),
        }
    }

    /// Snapshot a personalizer's stage history.
    pub fn record(&mut self, personalizer: &dyn Personalizer) {
        self.personalizers.push(PersonalizerRecord {
            name: personalizer.name().to_string(),
            kind: personalizer.kind(),
            final_stage: personalizer.stage_label(),
            transitions: personalizer.transitions().to_vec(),
            finalized: personalizer.final_draft().is_some(),
        });
    }

    pub fn finish(self, verdict: Option<&ComparisonVerdict>) -> RunReport {
        RunReport {
            schema_version: REPORT_SCHEMA_VERSION,
            prompt_version: PROMPT_VERSION.to_string(),
            shape_version: SHAPE_VERSION,
            strategy: self.strategy,
            interest: self.interest,
            inputs: self.inputs,
            personalizers: self.personalizers,
            verdict: verdict.cloned(),
            elapsed_ms: self.started.elapsed().as_millis() as u64,
        }
    }
}

/// Write `run.json` at the root of the run directory.
pub fn write_run_report(report: &RunReport, store: &ArtifactStore) -> Result<PathBuf, TailorError> {
    let json = serde_json::to_string_pretty(report)
        .map_err(|e| TailorError::InvalidInput(format!("run report is not serializable: {e}")))?;
    store.write(None, ArtifactKind::RunReport, &json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::Winner;
    use crate::personalizer::Submission;

    #[test]
    fn report_round_trips_through_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path());
        let mut recorder = RunRecorder::new("eval", "music", vec!["a.md".into(), "b.md".into()]);
        recorder.record(&Submission::new("A", "# A"));
        let verdict = ComparisonVerdict {
            first: "A".into(),
            second: "B".into(),
            winner: Winner::Personalizer("A".into()),
            explanation: "More vivid.".into(),
        };
        let report = recorder.finish(Some(&verdict));

        let path = write_run_report(&report, &store).unwrap();
        assert_eq!(path, tmp.path().join("run.json"));
        let parsed: RunReport =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(parsed.strategy, "eval");
        assert_eq!(parsed.prompt_version, PROMPT_VERSION);
        assert_eq!(parsed.personalizers[0].kind, PersonalizerKind::Submission);
        assert!(parsed.personalizers[0].finalized);
        assert_eq!(parsed.verdict.unwrap().winner, Winner::Personalizer("A".into()));
    }

    #[test]
    fn verdict_is_omitted_when_absent() {
        let report = RunRecorder::new("chapter_only", "music", vec![]).finish(None);
        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("verdict").is_none());
    }
}
