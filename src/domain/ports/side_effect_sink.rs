//! Side-effect sinks: communication and tool invocation
//! (spec.md §6 "Side-effect sink").

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum SideEffectError {
    #[error("communication sink error: {0}")]
    Communication(String),

    #[error("tool invocation error: {0}")]
    Tool(String),
}

#[async_trait]
pub trait CommunicationService: Send + Sync {
    /// Sends `content` to `channel_id`, returning the outbound message id
    /// (used by the DEFER handler to key the deferral-report mapping).
    async fn send_message(
        &self,
        channel_id: &str,
        content: &str,
        metadata: Option<serde_json::Value>,
    ) -> Result<String, SideEffectError>;
}

#[async_trait]
pub trait ToolService: Send + Sync {
    async fn run_tool(&self, tool_name: &str, arguments: serde_json::Value) -> Result<serde_json::Value, SideEffectError>;
}
