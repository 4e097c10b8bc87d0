//! Guardrail stage outcomes (spec.md §4.3 Step 6, §9 "GuardrailOverride").

use serde::{Deserialize, Serialize};

use super::ActionSelectionResult;

/// Result of running the guardrail stage on a selected action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GuardrailOutcome {
    /// Action passes unchanged.
    Pass,
    /// Action was overridden. `original_action` is preserved for the retry
    /// path (Step 7) and for the dispatch side channel (Step 9).
    Overridden {
        original_action: Box<ActionSelectionResult>,
        override_reason: String,
    },
}

impl GuardrailOutcome {
    pub fn is_overridden(&self) -> bool {
        matches!(self, Self::Overridden { .. })
    }
}

/// Side channel attached to a dispatched `ActionSelectionResult` so
/// handlers may read guardrail history (spec.md §4.3 Step 9).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuardrailAttachment {
    pub overridden: bool,
    pub original_action: Option<Box<ActionSelectionResult>>,
    pub override_reason: Option<String>,
    /// Set when Step 7's single recursive re-selection was attempted.
    pub retry_attempted: bool,
    /// Set when the retry's result *also* failed guardrails and the
    /// original PONDER override was kept (spec.md §4.3 Step 7).
    pub retry_also_overridden: bool,
}
