//! The closed action set and its tagged parameters (spec.md §3
//! "ActionSelectionResult", §9 "tagged action parameters").

use serde::{Deserialize, Serialize};

use super::memory::MemoryScope;

/// The closed set of actions a thought can resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SelectedAction {
    Observe,
    Speak,
    Tool,
    Reject,
    Ponder,
    Defer,
    Memorize,
    Recall,
    Forget,
    TaskComplete,
}

impl SelectedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Observe => "OBSERVE",
            Self::Speak => "SPEAK",
            Self::Tool => "TOOL",
            Self::Reject => "REJECT",
            Self::Ponder => "PONDER",
            Self::Defer => "DEFER",
            Self::Memorize => "MEMORIZE",
            Self::Recall => "RECALL",
            Self::Forget => "FORGET",
            Self::TaskComplete => "TASK_COMPLETE",
        }
    }

    /// Every variant of the closed set, for startup validation that every
    /// action has a registered handler (§9 redesign note).
    pub const ALL: [SelectedAction; 10] = [
        Self::Observe,
        Self::Speak,
        Self::Tool,
        Self::Reject,
        Self::Ponder,
        Self::Defer,
        Self::Memorize,
        Self::Recall,
        Self::Forget,
        Self::TaskComplete,
    ];

    /// Terminal for the *thought* once dispatched: no follow-up is created.
    pub fn is_follow_up_terminal(&self) -> bool {
        matches!(self, Self::TaskComplete | Self::Reject | Self::Defer | Self::Ponder)
    }
}

/// Tagged variant of action parameters, keyed by `selected_action`.
/// Deserializers dispatch on the tag; handlers must refuse mismatched tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "selected_action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionParameters {
    Observe(ObserveParams),
    Speak(SpeakParams),
    Tool(ToolParams),
    Reject(RejectParams),
    Ponder(PonderParams),
    Defer(DeferParams),
    Memorize(MemorizeParams),
    Recall(RecallParams),
    Forget(ForgetParams),
    TaskComplete,
}

impl ActionParameters {
    pub fn selected_action(&self) -> SelectedAction {
        match self {
            Self::Observe(_) => SelectedAction::Observe,
            Self::Speak(_) => SelectedAction::Speak,
            Self::Tool(_) => SelectedAction::Tool,
            Self::Reject(_) => SelectedAction::Reject,
            Self::Ponder(_) => SelectedAction::Ponder,
            Self::Defer(_) => SelectedAction::Defer,
            Self::Memorize(_) => SelectedAction::Memorize,
            Self::Recall(_) => SelectedAction::Recall,
            Self::Forget(_) => SelectedAction::Forget,
            Self::TaskComplete => SelectedAction::TaskComplete,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObserveParams {
    pub channel_id: String,
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakParams {
    pub content: String,
    #[serde(default)]
    pub channel_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParams {
    pub tool_name: String,
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectParams {
    pub reason: String,
    #[serde(default)]
    pub create_filter: bool,
    #[serde(default)]
    pub filter_pattern: Option<String>,
    #[serde(default)]
    pub filter_priority: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PonderParams {
    pub questions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeferParams {
    pub reason: String,
    #[serde(default)]
    pub context: serde_json::Value,
    #[serde(default)]
    pub defer_until: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemorizeParams {
    pub key: String,
    pub scope: MemoryScope,
    #[serde(default)]
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecallParams {
    pub query: String,
    pub scope: MemoryScope,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForgetParams {
    pub key: String,
    pub scope: MemoryScope,
    pub reason: String,
}

/// The output of the thought-processing pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSelectionResult {
    pub selected_action: SelectedAction,
    pub action_parameters: ActionParameters,
    pub rationale: String,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub raw_llm_response: Option<String>,
}

impl ActionSelectionResult {
    pub fn new(action_parameters: ActionParameters, rationale: impl Into<String>) -> Self {
        Self {
            selected_action: action_parameters.selected_action(),
            action_parameters,
            rationale: rationale.into(),
            confidence: None,
            raw_llm_response: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence.clamp(0.0, 1.0));
        self
    }

    /// Synthesize a DEFER result, used for the pipeline's short-circuit
    /// paths (DMA timeout, critical failure, max ponder rounds).
    pub fn synthetic_defer(reason: impl Into<String>, context: serde_json::Value) -> Self {
        Self::new(
            ActionParameters::Defer(DeferParams {
                reason: reason.into(),
                context,
                defer_until: None,
            }),
            "synthesized by the pipeline",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_actions_have_distinct_str_tags() {
        let mut seen = std::collections::HashSet::new();
        for a in SelectedAction::ALL {
            assert!(seen.insert(a.as_str()));
        }
        assert_eq!(seen.len(), 10);
    }

    #[test]
    fn tagged_params_round_trip_through_json() {
        let result = ActionSelectionResult::new(
            ActionParameters::Speak(SpeakParams {
                content: "hi".into(),
                channel_id: Some("c1".into()),
            }),
            "greet",
        );
        let json = serde_json::to_string(&result).unwrap();
        let back: ActionSelectionResult = serde_json::from_str(&json).unwrap();
        assert_eq!(result, back);
        assert_eq!(back.selected_action, SelectedAction::Speak);
    }

    #[test]
    fn selected_action_matches_tag_in_parameters() {
        let p = ActionParameters::Ponder(PonderParams { questions: vec!["q".into()] });
        assert_eq!(p.selected_action(), SelectedAction::Ponder);
    }

    #[test]
    fn synthetic_defer_is_tagged_defer() {
        let result = ActionSelectionResult::synthetic_defer("DMA timeout", serde_json::json!({"error": "x"}));
        assert_eq!(result.selected_action, SelectedAction::Defer);
    }
}
