//! Path-addressed persistence of run artifacts.
//!
//! Layout of one run directory:
//!
//! ```text
//! <output>/<course>/<chapter>/<YYYY-MM-DD_HH-MM-SS>/
//!   strategy.txt  verdict.txt  run.json
//!   A/ specs.txt outline.md draft.md final_draft.md feedback.md score.md opp_summary.md
//!   B/ draft.md draft_analogy.md feedback_student.md feedback_expert.md final_draft.md ...
//! ```
//!
//! Every write replaces the whole file with the current in-memory value, so
//! an artifact always reflects the latest completed stage.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use ignore::WalkBuilder;

use crate::errors::TailorError;

/// Timestamp format used for run directory names.
pub const RUN_TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Every file a run may produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Specs,
    Outline,
    Draft,
    DraftAnalogy,
    FinalDraft,
    Feedback,
    StudentFeedback,
    ExpertFeedback,
    Score,
    OpponentSummary,
    Strategy,
    Verdict,
    FinalDraftPaths,
    RunReport,
}

impl ArtifactKind {
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Specs => "specs.txt",
            Self::Outline => "outline.md",
            Self::Draft => "draft.md",
            Self::DraftAnalogy => "draft_analogy.md",
            Self::FinalDraft => "final_draft.md",
            Self::Feedback => "feedback.md",
            Self::StudentFeedback => "feedback_student.md",
            Self::ExpertFeedback => "feedback_expert.md",
            Self::Score => "score.md",
            Self::OpponentSummary => "opp_summary.md",
            Self::Strategy => "strategy.txt",
            Self::Verdict => "verdict.txt",
            Self::FinalDraftPaths => "final_draft_paths.txt",
            Self::RunReport => "run.json",
        }
    }
}

/// Writes artifacts under one run directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of an artifact, scoped to a personalizer when `scope` is set.
    pub fn path_of(&self, scope: Option<&str>, kind: ArtifactKind) -> PathBuf {
        match scope {
            Some(name) => self.root.join(name).join(kind.file_name()),
            None => self.root.join(kind.file_name()),
        }
    }

    /// Write `content`, creating parent directories as needed.
    pub fn write(
        &self,
        scope: Option<&str>,
        kind: ArtifactKind,
        content: &str,
    ) -> Result<PathBuf, TailorError> {
        let path = self.path_of(scope, kind);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| TailorError::artifact(parent, e))?;
        }
        fs::write(&path, content).map_err(|e| TailorError::artifact(&path, e))?;
        tracing::info!(path = %path.display(), "{} saved", kind.file_name());
        Ok(path)
    }

    /// Shorthand for personalizer-scoped writes.
    pub fn write_scoped(
        &self,
        name: &str,
        kind: ArtifactKind,
        content: &str,
    ) -> Result<PathBuf, TailorError> {
        self.write(Some(name), kind, content)
    }
}

/// Derives run directories from inputs and the wall clock.
pub struct RunLayout;

impl RunLayout {
    /// `<output_root>/<course>/<chapter>/<timestamp>`.
    ///
    /// `course` is the chapter file's parent directory name; `chapter` is the
    /// file stem with `.` replaced by `-`.
    pub fn for_chapter(
        output_root: &Path,
        chapter_path: &Path,
        now: DateTime<Local>,
    ) -> Result<PathBuf, TailorError> {
        let course = chapter_path
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "uncategorized".to_string());
        let chapter = chapter_path
            .file_stem()
            .map(|s| s.to_string_lossy().replace('.', "-"))
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                TailorError::InvalidInput(format!(
                    "cannot derive a chapter title from {}",
                    chapter_path.display()
                ))
            })?;
        Ok(output_root
            .join(course)
            .join(chapter)
            .join(now.format(RUN_TIMESTAMP_FORMAT).to_string()))
    }

    /// `<eval_root>/<timestamp>`.
    pub fn for_eval(eval_root: &Path, now: DateTime<Local>) -> PathBuf {
        eval_root.join(now.format(RUN_TIMESTAMP_FORMAT).to_string())
    }
}

/// Read a markdown document, trimming surrounding whitespace.
///
/// An empty document is rejected: nothing downstream can personalize it.
pub fn read_document(path: &Path) -> Result<String, TailorError> {
    let text = fs::read_to_string(path).map_err(|e| TailorError::artifact(path, e))?;
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(TailorError::InvalidInput(format!(
            "{} is empty",
            path.display()
        )));
    }
    Ok(trimmed.to_string())
}

/// All markdown chapters under `root`, sorted, respecting .gitignore.
pub fn chapter_files(root: &Path) -> Vec<PathBuf> {
    let walker = WalkBuilder::new(root).hidden(true).git_ignore(true).build();
    let mut files: Vec<PathBuf> = walker
        .flatten()
        .map(|entry| entry.into_path())
        .filter(|path| path.is_file() && path.extension().and_then(|e| e.to_str()) == Some("md"))
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn fixed_now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 7, 9, 5, 2).unwrap()
    }

    #[test]
    fn chapter_layout_uses_course_chapter_and_timestamp() {
        let dir = RunLayout::for_chapter(
            Path::new("output"),
            Path::new("og-textbooks/berkeley-cs61b/ch2.lists.md"),
            fixed_now(),
        )
        .unwrap();
        assert_eq!(
            dir,
            PathBuf::from("output/berkeley-cs61b/ch2-lists/2024-03-07_09-05-02")
        );
    }

    #[test]
    fn chapter_without_parent_is_uncategorized() {
        let dir =
            RunLayout::for_chapter(Path::new("out"), Path::new("intro.md"), fixed_now()).unwrap();
        assert!(dir.starts_with("out/uncategorized/intro"));
    }

    #[test]
    fn eval_layout_is_timestamped() {
        let dir = RunLayout::for_eval(Path::new("evals"), fixed_now());
        assert_eq!(dir, PathBuf::from("evals/2024-03-07_09-05-02"));
    }

    #[test]
    fn scoped_writes_land_in_personalizer_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path().join("run"));
        let path = store
            .write_scoped("A", ArtifactKind::Draft, "# Draft")
            .unwrap();
        assert_eq!(path, tmp.path().join("run/A/draft.md"));
        assert_eq!(fs::read_to_string(path).unwrap(), "# Draft");

        let verdict = store
            .write(None, ArtifactKind::Verdict, "Choice: TIE")
            .unwrap();
        assert_eq!(verdict, tmp.path().join("run/verdict.txt"));
    }

    #[test]
    fn rewrite_replaces_content() {
        let tmp = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(tmp.path());
        store.write_scoped("B", ArtifactKind::Feedback, "one").unwrap();
        store
            .write_scoped("B", ArtifactKind::Feedback, "one two")
            .unwrap();
        let text = fs::read_to_string(store.path_of(Some("B"), ArtifactKind::Feedback)).unwrap();
        assert_eq!(text, "one two");
    }

    #[test]
    fn empty_document_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("blank.md");
        fs::write(&path, "  \n\n ").unwrap();
        assert!(matches!(
            read_document(&path),
            Err(TailorError::InvalidInput(_))
        ));
    }

    #[test]
    fn chapter_discovery_finds_markdown_only() {
        let tmp = tempfile::tempdir().unwrap();
        let course = tmp.path().join("cs61b");
        fs::create_dir_all(&course).unwrap();
        fs::write(course.join("ch2.md"), "# Two").unwrap();
        fs::write(course.join("ch1.md"), "# One").unwrap();
        fs::write(course.join("notes.txt"), "skip").unwrap();
        fs::write(course.join(".draft.md"), "hidden").unwrap();

        let found = chapter_files(tmp.path());
        assert_eq!(found, vec![course.join("ch1.md"), course.join("ch2.md")]);
    }

    #[test]
    fn document_is_trimmed() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ch.md");
        fs::write(&path, "\n# Title\n\nBody\n\n").unwrap();
        assert_eq!(read_document(&path).unwrap(), "# Title\n\nBody");
    }
}
