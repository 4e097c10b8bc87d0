//! Default `LlmService` implementation. The spec excludes a concrete LLM
//! provider from scope (SPEC_FULL.md §1 "Out of scope"); this null-object
//! adapter, grounded in the teacher's `NullEmbeddingProvider`, lets the
//! runtime start without one wired and gives the DMA/action-selection
//! contract a deterministic backend for tests.

use async_trait::async_trait;

use crate::domain::ports::llm_service::{LlmError, LlmMessage, LlmService, ResourceUsage, ResponseModel};

/// Returns a fixed, schema-conformant response for each `ResponseModel`
/// without making any external call. Never errors.
#[derive(Debug, Clone, Default)]
pub struct NullLlmService;

impl NullLlmService {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LlmService for NullLlmService {
    async fn call_llm_structured(
        &self,
        _messages: Vec<LlmMessage>,
        response_model: ResponseModel,
        _max_tokens: u32,
        _temperature: f64,
    ) -> Result<(serde_json::Value, ResourceUsage), LlmError> {
        let value = match response_model {
            ResponseModel::Ethical => serde_json::json!({
                "alignment_check": "no ethical concerns detected",
                "decision": "approve",
                "rationale": "NullLlmService has no opinion",
            }),
            ResponseModel::CommonSense => serde_json::json!({
                "plausibility_score": 1.0,
                "flags": [],
                "reasoning": "no implausibility detected",
            }),
            ResponseModel::DomainSpecific => serde_json::json!({
                "domain": "none",
                "score": 1.0,
                "flags": [],
                "reasoning": "no domain concerns detected",
                "recommended_action": null,
            }),
            ResponseModel::ActionSelection => serde_json::json!({
                "selected_action": "PONDER",
                "action_parameters": {
                    "selected_action": "PONDER",
                    "questions": ["no LlmService is wired; unable to select a real action"],
                },
                "rationale": "NullLlmService has no opinion",
                "confidence": 0.0,
            }),
        };
        Ok((value, ResourceUsage::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn action_selection_defaults_to_ponder() {
        let llm = NullLlmService::new();
        let (value, usage) = llm
            .call_llm_structured(vec![LlmMessage::user("x")], ResponseModel::ActionSelection, 10, 0.0)
            .await
            .unwrap();
        assert_eq!(value["selected_action"], "PONDER");
        assert_eq!(usage.cost_usd, 0.0);
    }

    #[tokio::test]
    async fn ethical_review_approves() {
        let llm = NullLlmService::new();
        let (value, _) = llm
            .call_llm_structured(vec![LlmMessage::user("x")], ResponseModel::Ethical, 10, 0.0)
            .await
            .unwrap();
        assert_eq!(value["decision"], "approve");
    }
}
