//! Stdout-backed `CommunicationService`, grounded in the teacher's CLI
//! output helpers (`cli/output.rs`) and standing in for the concrete
//! chat/CLI/HTTP transports spec.md §1 places out of scope.

use async_trait::async_trait;

use crate::domain::ports::side_effect_sink::{CommunicationService, SideEffectError};

/// Writes every outbound message to stdout, tagged with its channel, and
/// returns a freshly minted message id (used by the DEFER handler to key
/// the deferral-report mapping). No network transport; this is the
/// minimum a CLI-mode deployment needs to run the round loop end to end.
#[derive(Debug, Clone, Default)]
pub struct ConsoleCommunicationService;

impl ConsoleCommunicationService {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommunicationService for ConsoleCommunicationService {
    async fn send_message(
        &self,
        channel_id: &str,
        content: &str,
        metadata: Option<serde_json::Value>,
    ) -> Result<String, SideEffectError> {
        let message_id = uuid::Uuid::new_v4().to_string();
        println!("[{channel_id}] {content}");
        if let Some(meta) = metadata {
            tracing::debug!(%channel_id, %message_id, ?meta, "console message metadata");
        }
        Ok(message_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_message_returns_a_message_id() {
        let comms = ConsoleCommunicationService::new();
        let id = comms.send_message("c1", "hello", None).await.unwrap();
        assert!(!id.is_empty());
    }
}
