//! LLM service capability (spec.md §6 "LLM service").

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseModel {
    Ethical,
    CommonSense,
    DomainSpecific,
    ActionSelection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: String,
    pub content: String,
}

impl LlmMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".into(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into() }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub cost_usd: f64,
}

#[derive(Error, Debug, Clone)]
pub enum LlmError {
    #[error("llm request failed: {0}")]
    RequestFailed(String),

    #[error("llm response did not conform to the expected schema: {0}")]
    InvalidResponse(String),

    #[error("llm request timed out")]
    Timeout,
}

/// `call_llm_structured(messages, response_model, max_tokens, temperature)`.
/// The returned JSON value conforms to the schema named by `response_model`;
/// callers deserialize it into the matching DMA result / ActionSelectionResult.
#[async_trait]
pub trait LlmService: Send + Sync {
    async fn call_llm_structured(
        &self,
        messages: Vec<LlmMessage>,
        response_model: ResponseModel,
        max_tokens: u32,
        temperature: f64,
    ) -> Result<(serde_json::Value, ResourceUsage), LlmError>;
}
