//! Personalizer stage machines: explicit stages and legal transition guards.
//!
//! Each personalizer variant owns a `StageMachine` over its own stage enum so
//! that:
//! 1. Every operation checks its precondition before any gateway call.
//! 2. Every transition is validated against a fixed table and logged.
//! 3. The run report can replay the exact sequence of stages.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::errors::TailorError;

/// A stage enum driven by a [`StageMachine`].
pub trait Stage: Copy + Eq + fmt::Display + fmt::Debug {
    fn initial() -> Self;

    /// Whether `self → to` is an edge of the stage graph.
    fn can_advance(self, to: Self) -> bool;

    fn is_terminal(self) -> bool;
}

/// Stages of the concept-by-concept personalizer.
///
/// ```text
/// Fresh → Extracted
/// Extracted → Outlined | Drafted
/// Outlined → Drafted
/// Drafted → Refined | Finalized
/// Refined → Finalized
/// ```
///
/// `create_overview` and `create_analogies` need `Extracted` or later and do
/// not move the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConceptStage {
    Fresh,
    Extracted,
    Outlined,
    Drafted,
    Refined,
    Finalized,
}

impl fmt::Display for ConceptStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fresh => write!(f, "Fresh"),
            Self::Extracted => write!(f, "Extracted"),
            Self::Outlined => write!(f, "Outlined"),
            Self::Drafted => write!(f, "Drafted"),
            Self::Refined => write!(f, "Refined"),
            Self::Finalized => write!(f, "Finalized"),
        }
    }
}

impl Stage for ConceptStage {
    fn initial() -> Self {
        Self::Fresh
    }

    fn can_advance(self, to: Self) -> bool {
        use ConceptStage::*;
        matches!(
            (self, to),
            (Fresh, Extracted)
                | (Extracted, Outlined)
                | (Extracted, Drafted)
                | (Outlined, Drafted)
                | (Drafted, Refined)
                | (Drafted, Finalized)
                | (Refined, Finalized)
        )
    }

    fn is_terminal(self) -> bool {
        self == Self::Finalized
    }
}

/// Stages of the chapter/section personalizer.
///
/// ```text
/// Fresh → Sectioned | Drafted
/// Sectioned → Drafted
/// Drafted → Segmented | Revised | Finalized
/// Segmented → Analogized | Revised | Finalized
/// Analogized → Revised | Finalized
/// Revised → Revised | Finalized
/// ```
///
/// `Segmented` means the existing draft was split into sections after the
/// fact; `Sectioned` means the reference was split before drafting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructureStage {
    Fresh,
    Sectioned,
    Drafted,
    Segmented,
    Analogized,
    Revised,
    Finalized,
}

impl fmt::Display for StructureStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fresh => write!(f, "Fresh"),
            Self::Sectioned => write!(f, "Sectioned"),
            Self::Drafted => write!(f, "Drafted"),
            Self::Segmented => write!(f, "Segmented"),
            Self::Analogized => write!(f, "Analogized"),
            Self::Revised => write!(f, "Revised"),
            Self::Finalized => write!(f, "Finalized"),
        }
    }
}

impl Stage for StructureStage {
    fn initial() -> Self {
        Self::Fresh
    }

    fn can_advance(self, to: Self) -> bool {
        use StructureStage::*;
        matches!(
            (self, to),
            (Fresh, Sectioned)
                | (Fresh, Drafted)
                | (Sectioned, Drafted)
                | (Drafted, Segmented)
                | (Drafted, Revised)
                | (Drafted, Finalized)
                | (Segmented, Analogized)
                | (Segmented, Revised)
                | (Segmented, Finalized)
                | (Analogized, Revised)
                | (Analogized, Finalized)
                | (Revised, Revised)
                | (Revised, Finalized)
        )
    }

    fn is_terminal(self) -> bool {
        self == Self::Finalized
    }
}

/// A single recorded stage transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: String,
    pub to: String,
    /// Milliseconds since the machine was created.
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Current stage, legal-edge enforcement, and the transition log.
#[derive(Debug)]
pub struct StageMachine<S: Stage> {
    current: S,
    created_at: Instant,
    transitions: Vec<TransitionRecord>,
}

impl<S: Stage> StageMachine<S> {
    pub fn new() -> Self {
        Self {
            current: S::initial(),
            created_at: Instant::now(),
            transitions: Vec::new(),
        }
    }

    pub fn current(&self) -> S {
        self.current
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    /// Move to `to`, or fail with `IllegalTransition` if the edge is missing.
    pub fn advance(&mut self, to: S, reason: Option<&str>) -> Result<(), TailorError> {
        if !self.current.can_advance(to) {
            return Err(TailorError::IllegalTransition {
                from: self.current.to_string(),
                to: to.to_string(),
            });
        }

        tracing::debug!(from = %self.current, to = %to, "Stage transition");

        self.transitions.push(TransitionRecord {
            from: self.current.to_string(),
            to: to.to_string(),
            elapsed_ms: self.created_at.elapsed().as_millis() as u64,
            reason: reason.map(String::from),
        });
        self.current = to;
        Ok(())
    }

    /// Fail with `MissingStage` unless the current stage is in `allowed`.
    pub fn require(
        &self,
        allowed: &[S],
        personalizer: &str,
        operation: &'static str,
    ) -> Result<(), TailorError> {
        if allowed.contains(&self.current) {
            Ok(())
        } else {
            Err(TailorError::missing_stage(
                personalizer,
                operation,
                self.current,
            ))
        }
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    /// `Fresh → Extracted → Drafted (3 transitions)`.
    pub fn summary(&self) -> String {
        let mut path = vec![S::initial().to_string()];
        path.extend(self.transitions.iter().map(|t| t.to.clone()));
        format!("{} ({} transitions)", path.join(" → "), self.transitions.len())
    }
}

impl<S: Stage> Default for StageMachine<S> {
    fn default() -> Self {
        Self::new()
    }
}
