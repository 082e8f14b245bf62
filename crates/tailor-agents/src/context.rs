//! Run-wide inputs shared by every personalizer and the judge.

use std::sync::Arc;

use crate::artifacts::ArtifactStore;
use crate::config::GenerationSettings;
use crate::errors::TailorError;
use crate::gateway::LlmGateway;

/// Immutable state of one run.
///
/// Built once per strategy invocation and handed out as `Arc<RunContext>`; the
/// reference text and interest never change after construction.
pub struct RunContext {
    pub gateway: Arc<dyn LlmGateway>,
    pub store: ArtifactStore,
    pub reference_text: String,
    pub interest: String,
    pub settings: GenerationSettings,
}

impl RunContext {
    pub fn new(
        gateway: Arc<dyn LlmGateway>,
        store: ArtifactStore,
        reference_text: impl Into<String>,
        interest: impl Into<String>,
        settings: GenerationSettings,
    ) -> Result<Arc<Self>, TailorError> {
        let reference_text = reference_text.into().trim().to_string();
        let interest = interest.into().trim().to_string();
        if interest.is_empty() {
            return Err(TailorError::InvalidInput("interest must not be empty".into()));
        }
        Ok(Arc::new(Self {
            gateway,
            store,
            reference_text,
            interest,
            settings,
        }))
    }

    pub fn gateway(&self) -> &dyn LlmGateway {
        self.gateway.as_ref()
    }

    /// Reference text, or `InvalidInput` when a decomposition needs it and it is empty.
    pub fn require_reference(&self) -> Result<&str, TailorError> {
        if self.reference_text.is_empty() {
            return Err(TailorError::InvalidInput(
                "reference chapter text is empty".into(),
            ));
        }
        Ok(&self.reference_text)
    }
}
