//! Agent profile: identity template that parameterizes the pipeline
//! (spec.md §6 "agent_profiles").

use serde::{Deserialize, Serialize};

use super::SelectedAction;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub name: String,
    pub role: Option<String>,
    pub description: Option<String>,
    /// Subset of the action set this profile may select.
    pub permitted_actions: Vec<SelectedAction>,
    /// Name of the DSDMA implementation to use, if any.
    pub dsdma: Option<String>,
    #[serde(default)]
    pub dsdma_kwargs: serde_json::Value,
    #[serde(default)]
    pub csdma_prompt_override: Option<String>,
    #[serde(default)]
    pub aspdma_prompt_override: Option<String>,
}

impl AgentProfile {
    pub fn permits(&self, action: SelectedAction) -> bool {
        self.permitted_actions.contains(&action)
    }
}

impl Default for AgentProfile {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            role: None,
            description: None,
            permitted_actions: SelectedAction::ALL.to_vec(),
            dsdma: None,
            dsdma_kwargs: serde_json::Value::Null,
            csdma_prompt_override: None,
            aspdma_prompt_override: None,
        }
    }
}
