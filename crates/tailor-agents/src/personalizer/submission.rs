//! A finished chapter imported from disk, judged without being produced here.

use std::path::Path;

use async_trait::async_trait;

use super::stage::TransitionRecord;
use super::{JudgeInbox, Personalizer, PersonalizerKind};
use crate::artifacts::read_document;
use crate::errors::TailorError;

/// Read-only personalizer whose draft and final draft are the imported text.
///
/// Lets the judge compare and score chapters from earlier runs. Every
/// pipeline operation is rejected.
pub struct Submission {
    name: String,
    text: String,
    inbox: JudgeInbox,
}

impl Submission {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            inbox: JudgeInbox::default(),
        }
    }

    pub fn load(name: impl Into<String>, path: &Path) -> Result<Self, TailorError> {
        Ok(Self::new(name, read_document(path)?))
    }

    fn rejected(&self, operation: &str) -> TailorError {
        TailorError::InvalidInput(format!(
            "{}: `{operation}` is not available on an imported chapter",
            self.name
        ))
    }
}

#[async_trait]
impl Personalizer for Submission {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> PersonalizerKind {
        PersonalizerKind::Submission
    }

    fn stage_label(&self) -> String {
        "Imported".to_string()
    }

    fn transitions(&self) -> &[TransitionRecord] {
        &[]
    }

    fn draft(&self) -> Option<&str> {
        Some(&self.text)
    }

    fn final_draft(&self) -> Option<&str> {
        Some(&self.text)
    }

    fn inbox(&self) -> &JudgeInbox {
        &self.inbox
    }

    fn inbox_mut(&mut self) -> &mut JudgeInbox {
        &mut self.inbox
    }

    async fn decompose(&mut self) -> Result<(), TailorError> {
        Err(self.rejected("decompose"))
    }

    async fn draft_all(&mut self) -> Result<(), TailorError> {
        Err(self.rejected("draft_all"))
    }

    async fn refine_all(&mut self) -> Result<(), TailorError> {
        Err(self.rejected("refine_all"))
    }

    fn finalize(&mut self) -> Result<(), TailorError> {
        Err(self.rejected("finalize"))
    }
}
