//! Secrets service capability (spec.md §6 "Secrets service").

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecretReference {
    pub uuid: String,
    pub description: String,
    pub source_message_id: Option<String>,
}

#[derive(Error, Debug, Clone)]
pub enum SecretsServiceError {
    #[error("secrets backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait SecretsService: Send + Sync {
    async fn process_incoming_text(
        &self,
        text: &str,
        context_hint: &str,
        source_message_id: &str,
    ) -> Result<(String, Vec<SecretReference>), SecretsServiceError>;

    async fn list_all_secrets(&self) -> Result<Vec<SecretReference>, SecretsServiceError>;

    fn filter_config_version(&self) -> String;
}
